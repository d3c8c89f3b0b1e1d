//! Read the config from a local file, mainly for development and tests.

use anyhow::{Context, Result};

use crate::fetcher::Fetcher;

const CONFIG_FILE_VAR: &str = "IGNITION_CONFIG_FILE";
const DEFAULT_CONFIG_PATH: &str = "/etc/ignition.json";

pub(crate) fn fetch_config(_fetcher: &Fetcher) -> Result<Option<Vec<u8>>> {
    let path =
        std::env::var(CONFIG_FILE_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    match std::fs::read(&path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading config file {path}")),
    }
}
