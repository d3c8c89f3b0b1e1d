//! The previous (3.0.0) schema. Input-only: configs at this version are
//! parsed and then upgraded to the current schema.

pub mod types;
pub use types::*;

use crate::errors::ConfigError;
use crate::report::Report;

pub const VERSION: &str = "3.0.0";

/// Parse raw bytes as an exactly-3.0.0 config. Structural validation
/// happens after upgrading to the current schema.
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
    if cfg.ignition.version != VERSION {
        return Err((Report::default(), ConfigError::UnknownVersion));
    }
    Ok(cfg)
}
