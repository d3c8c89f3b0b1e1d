//! Engine state persisted across stage invocations.
//!
//! The state file is plain JSON with a forward-compatible shape: readers
//! ignore fields they do not know, and a missing file is simply the
//! default state (the first stage of a boot starts from nothing).

use std::io::Write;

use anyhow::{Context, Result};
use camino::Utf8Path;
use fn_error_context::context;
use serde::{Deserialize, Serialize};

/// Provenance of one config acquired during the fetch stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedConfig {
    /// Where the config came from (platform name or URL).
    pub source: String,
    /// Whether it was pulled in by a reference from another config
    /// rather than supplied by the platform directly.
    pub referenced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    #[serde(default)]
    pub fetched_configs: Vec<FetchedConfig>,
}

impl State {
    #[context("Loading state from {path}")]
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no state file at {path}, starting fresh");
                return Ok(Self::default());
            }
            Err(e) => return Err(e).context("reading state file"),
        };
        serde_json::from_slice(&raw).context("parsing state file")
    }

    #[context("Saving state to {path}")]
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        let dir = path.parent().unwrap_or(Utf8Path::new("/"));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, self)?;
        tmp.flush()?;
        tmp.persist(path)
            .map_err(|e| anyhow::Error::new(e.error).context("replacing state file"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        let path = Utf8Path::from_path(&path).unwrap();
        assert_eq!(State::load(path).unwrap(), State::default());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        let path = Utf8Path::from_path(&path).unwrap();
        let state = State {
            fetched_configs: vec![FetchedConfig {
                source: "qemu".into(),
                referenced: false,
            }],
        };
        state.save(path).unwrap();
        assert_eq!(State::load(path).unwrap(), state);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        std::fs::write(&path, br#"{"fetchedConfigs": [], "futureField": 7}"#).unwrap();
        let path = Utf8Path::from_path(&path).unwrap();
        State::load(path).unwrap();
    }
}
