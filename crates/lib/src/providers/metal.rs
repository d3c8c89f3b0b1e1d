//! Bare metal has no metadata channel; the config, if any, arrives via
//! config references compiled into the boot image.

use anyhow::Result;

use crate::fetcher::Fetcher;

pub(crate) fn fetch_config(_fetcher: &Fetcher) -> Result<Option<Vec<u8>>> {
    Ok(None)
}
