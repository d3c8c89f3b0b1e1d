//! The EC2 provider fetches the config from the instance user-data URL
//! of the metadata service.

use anyhow::Result;

use crate::fetcher::{FetchError, FetchOptions, Fetcher};

const USERDATA_URL: &str = "http://169.254.169.254/2009-04-04/user-data";

pub(crate) fn fetch_config(fetcher: &Fetcher) -> Result<Option<Vec<u8>>> {
    match fetcher.fetch_to_buffer(USERDATA_URL, &FetchOptions::default()) {
        Ok(data) => Ok(Some(data)),
        // instances launched without user-data 404 here
        Err(FetchError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
