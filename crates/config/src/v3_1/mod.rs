//! The current config schema (3.1.0).

pub mod types;
pub use types::*;
mod translate;
mod validate;
pub(crate) use validate::path_ancestors;
pub use validate::validate;

use crate::errors::ConfigError;
use crate::report::Report;
pub use translate::from_v3_0;

/// The schema version this module accepts and produces.
pub const MAX_VERSION: &str = "3.1.0";

/// Parse raw bytes as an exactly-current-version config. The report
/// carries diagnostics even on success.
pub fn parse(raw: &[u8]) -> Result<(Config, Report), (Report, ConfigError)> {
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
    if version.to_string() != MAX_VERSION {
        return Err((Report::default(), ConfigError::UnknownVersion));
    }
    let report = validate(&cfg);
    if report.is_fatal() {
        let e = ConfigError::Invalid(report.clone());
        return Err((report, e));
    }
    Ok((cfg, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        let (_, e) = parse(b"").unwrap_err();
        assert!(matches!(e, ConfigError::Empty));
    }

    #[test]
    fn test_parse_garbage() {
        let (report, e) = parse(b"{").unwrap_err();
        assert!(matches!(e, ConfigError::Parse(_)));
        assert!(report.is_fatal());
    }

    #[test]
    fn test_parse_wrong_version() {
        let (_, e) = parse(br#"{"ignition": {"version": "2.4.0"}}"#).unwrap_err();
        assert!(matches!(e, ConfigError::UnknownVersion));
    }

    #[test]
    fn test_parse_minimal() {
        let (cfg, report) = parse(br#"{"ignition": {"version": "3.1.0"}}"#).unwrap();
        assert_eq!(cfg.ignition.version, MAX_VERSION);
        assert!(!report.is_fatal());
    }

    #[test]
    fn test_roundtrip_preserves_absence() {
        let raw = br#"{"ignition":{"version":"3.1.0"},"storage":{"files":[{"path":"/etc/hostname","contents":{"source":"data:,myhost"},"mode":420}]}}"#;
        let (cfg, _) = parse(raw).unwrap();
        let ser = serde_json::to_string(&cfg).unwrap();
        let (cfg2, _) = parse(ser.as_bytes()).unwrap();
        assert_eq!(cfg, cfg2);
        // absent fields stay absent in the serialized form
        assert!(!ser.contains("overwrite"));
        assert!(!ser.contains("append"));
    }
}
