//! The legacy (2.x) schema, parsed for translation only. Unlike the
//! current schema this parser is lenient about unknown fields, matching
//! how these configs were historically consumed.

pub mod types;
pub use types::*;
mod validate;
pub use validate::validate;

use crate::errors::ConfigError;
use crate::report::Report;

/// Parse raw bytes as a legacy 2.x config. Any 2.x minor up to 2.4 is
/// accepted by this one parser.
pub fn parse(raw: &[u8]) -> Result<Config, (Report, ConfigError)> {
    if raw.is_empty() {
        return Err((Report::default(), ConfigError::Empty));
    }
    let cfg: Config = match serde_json::from_slice(raw) {
        Ok(c) => c,
        Err(e) => {
            let mut report = Report::default();
            report.add_fatal(crate::path![], format!("parse error: {e}"));
            return Err((report, ConfigError::Parse(e)));
        }
    };
    let version = semver::Version::parse(&cfg.ignition.version)
        .map_err(|_| (Report::default(), ConfigError::UnknownVersion))?;
    if version.major != 2 || version.minor > 4 {
        return Err((Report::default(), ConfigError::UnknownVersion));
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_versions() {
        for v in ["2.0.0", "2.3.0", "2.4.0"] {
            let raw = format!(r#"{{"ignition": {{"version": "{v}"}}}}"#);
            parse(raw.as_bytes()).unwrap();
        }
        for v in ["2.5.0", "3.0.0", "bogus"] {
            let raw = format!(r#"{{"ignition": {{"version": "{v}"}}}}"#);
            let (_, e) = parse(raw.as_bytes()).unwrap_err();
            assert!(matches!(e, ConfigError::UnknownVersion), "{v}");
        }
    }

    #[test]
    fn test_lenient_unknown_fields() {
        parse(br#"{"ignition": {"version": "2.4.0"}, "mystery": 1}"#).unwrap();
    }
}
