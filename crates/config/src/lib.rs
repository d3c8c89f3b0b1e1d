//! Versioned provisioning config schemas.
//!
//! Raw config bytes declare a schema version; this crate parses any
//! supported version and forward-translates it to the latest one, which
//! is the only shape the execution engine consumes. Legacy (2.x)
//! configs additionally need a filesystem-name → mountpoint mapping,
//! see [`translate::v24tov31`].

pub mod errors;
pub mod merge;
pub mod report;
pub mod translate;
pub mod v2_4;
pub mod v3_0;
pub mod v3_1;

pub use errors::{hash_parts, ConfigError, HashError};
pub use merge::{merge, Merge};
pub use report::Report;
pub use v3_1::{Config, MAX_VERSION};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct VersionStubIgnition {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionStub {
    ignition: Option<VersionStubIgnition>,
}

/// Read just the declared version out of raw config bytes.
fn config_version(raw: &[u8]) -> Result<semver::Version, (Report, ConfigError)> {
    if raw.is_empty() {
        return Err((Report::default(), ConfigError::Empty));
    }
    let stub: VersionStub = match serde_json::from_slice(raw) {
        Ok(s) => s,
        Err(e) => {
            let mut report = Report::default();
            report.add_fatal(path![], format!("parse error: {e}"));
            return Err((report, ConfigError::Parse(e)));
        }
    };
    let version = stub
        .ignition
        .and_then(|i| i.version)
        .ok_or((Report::default(), ConfigError::UnknownVersion))?;
    semver::Version::parse(&version)
        .map_err(|_| (Report::default(), ConfigError::UnknownVersion))
}

/// Parse raw bytes that must already be at the current schema version.
pub fn parse(raw: &[u8]) -> Result<(Config, Report), (Report, ConfigError)> {
    v3_1::parse(raw)
}

/// Parse raw bytes at any supported schema version, translating forward
/// until the result is a validated current-schema config.
pub fn parse_compatible(raw: &[u8]) -> Result<(Config, Report), (Report, ConfigError)> {
    let version = config_version(raw)?;
    match (version.major, version.minor) {
        (2, 0..=4) => {
            let legacy = v2_4::parse(raw)?;
            // Without external knowledge of mountpoints only root-backed
            // legacy configs translate; anything else reports which
            // filesystem is unmapped.
            let cfg = translate::v24tov31::translate(legacy, Default::default())
                .map_err(|e| (Report::default(), e))?;
            let report = v3_1::validate(&cfg);
            Ok((cfg, report))
        }
        (3, 0) => {
            let prev = v3_0::parse(raw)?;
            let cfg = v3_1::from_v3_0(prev);
            let report = v3_1::validate(&cfg);
            if report.is_fatal() {
                let e = ConfigError::Invalid(report.clone());
                return Err((report, e));
            }
            Ok((cfg, report))
        }
        (3, 1) => v3_1::parse(raw),
        _ => Err((Report::default(), ConfigError::UnknownVersion)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compatible_empty() {
        let (_, e) = parse_compatible(b"").unwrap_err();
        assert!(matches!(e, ConfigError::Empty));
    }

    #[test]
    fn test_parse_compatible_unknown_versions() {
        for raw in [
            br#"{"ignition": {"version": "4.0.0"}}"#.as_slice(),
            br#"{"ignition": {"version": "1.0.0"}}"#.as_slice(),
            br#"{"ignition": {}}"#.as_slice(),
            br#"{}"#.as_slice(),
        ] {
            let (_, e) = parse_compatible(raw).unwrap_err();
            assert!(matches!(e, ConfigError::UnknownVersion));
        }
    }

    #[test]
    fn test_parse_compatible_chain() {
        // current version passes through
        let (cfg, _) = parse_compatible(br#"{"ignition": {"version": "3.1.0"}}"#).unwrap();
        assert_eq!(cfg.ignition.version, MAX_VERSION);

        // previous version upgrades
        let (cfg, _) = parse_compatible(br#"{"ignition": {"version": "3.0.0"}}"#).unwrap();
        assert_eq!(cfg.ignition.version, MAX_VERSION);

        // legacy translates
        let raw = br#"{
            "ignition": {"version": "2.4.0"},
            "storage": {"files": [{"filesystem": "root", "path": "/x", "contents": {"source": "data:,hi"}}]}
        }"#;
        let (cfg, _) = parse_compatible(raw).unwrap();
        assert_eq!(cfg.ignition.version, MAX_VERSION);
        assert_eq!(cfg.storage.files[0].path, "/x");
    }

    #[test]
    fn test_parse_compatible_legacy_non_root_fails() {
        let raw = br#"{
            "ignition": {"version": "2.4.0"},
            "storage": {"filesystems": [{"name": "data", "mount": {"device": "/dev/sdb1", "format": "ext4"}}]}
        }"#;
        let (_, e) = parse_compatible(raw).unwrap_err();
        assert!(matches!(e, ConfigError::UnmappedFilesystem(_)));
    }
}
