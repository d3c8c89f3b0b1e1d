//! Kernel command line parsing.
//!
//! Supports key-only switches and key=value pairs with quote handling,
//! and computes the delta between the running command line and the
//! config's shouldExist/shouldNotExist declarations.

use anyhow::Result;

/// A parsed kernel command line.
#[derive(Debug)]
pub(crate) struct Cmdline(String);

impl<T: AsRef<str> + ?Sized> From<&T> for Cmdline {
    fn from(input: &T) -> Self {
        Self(input.as_ref().to_owned())
    }
}

impl Cmdline {
    /// Reads the kernel command line from `/proc/cmdline`.
    pub fn from_proc() -> Result<Self> {
        Ok(Self(std::fs::read_to_string("/proc/cmdline")?))
    }

    /// Iterate over all parameters. Splits on unquoted whitespace;
    /// quoted values may contain spaces.
    pub fn iter(&self) -> impl Iterator<Item = Parameter<'_>> + '_ {
        let mut in_quotes = false;
        self.0
            .split(move |c: char| {
                if c == '"' {
                    in_quotes = !in_quotes;
                }
                !in_quotes && c.is_ascii_whitespace()
            })
            .filter(|s| !s.is_empty())
            .map(Parameter::from)
    }

    /// Whether the whole argument (key and, when given, value) is present.
    pub fn contains(&self, arg: &str) -> bool {
        let wanted = Parameter::from(arg);
        self.iter().any(|p| p == wanted)
    }
}

/// A single kernel command line parameter.
#[derive(Debug, Eq)]
pub(crate) struct Parameter<'a> {
    /// The full original token
    pub parameter: &'a str,
    pub key: &'a str,
    pub value: Option<&'a str>,
}

impl<'a> From<&'a str> for Parameter<'a> {
    /// Splits on the first `=`; strips only the outermost pair of double
    /// quotes from the value.
    fn from(input: &'a str) -> Self {
        match input.split_once('=') {
            None => Self {
                parameter: input,
                key: input,
                value: None,
            },
            Some((key, value)) => {
                let value = value
                    .strip_prefix('"')
                    .unwrap_or(value)
                    .strip_suffix('"')
                    .unwrap_or(value);
                Self {
                    parameter: input,
                    key,
                    value: Some(value),
                }
            }
        }
    }
}

impl PartialEq for Parameter<'_> {
    /// Keys compare with dashes and underscores equivalent, the way the
    /// kernel treats them; values compare exactly.
    fn eq(&self, other: &Self) -> bool {
        let dedash = |c: char| if c == '-' { '_' } else { c };
        self.key.chars().map(dedash).eq(other.key.chars().map(dedash))
            && self.value == other.value
    }
}

/// The changes needed to satisfy a kargs declaration against the running
/// command line.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct KargsDelta {
    pub append: Vec<String>,
    pub delete: Vec<String>,
}

impl KargsDelta {
    pub fn is_empty(&self) -> bool {
        self.append.is_empty() && self.delete.is_empty()
    }

    /// Compare declarations with the current command line.
    pub fn compute(cmdline: &Cmdline, should_exist: &[String], should_not_exist: &[String]) -> Self {
        let append = should_exist
            .iter()
            .filter(|k| !cmdline.contains(k))
            .cloned()
            .collect();
        let delete = should_not_exist
            .iter()
            .filter(|k| cmdline.contains(k))
            .cloned()
            .collect();
        Self { append, delete }
    }
}
