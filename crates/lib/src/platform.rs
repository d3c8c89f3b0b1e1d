//! Platform providers: where the initial user config comes from.
//!
//! The table of providers is a plain static enumerated here; nothing
//! registers itself at startup. Each provider knows how to fetch the
//! user config from its platform's channel (metadata service, firmware
//! config, config drive, local file) and may know how to report stage
//! results back to the platform.

use anyhow::Result;

use crate::fetcher::Fetcher;
use crate::providers;

type FetchFn = fn(&Fetcher) -> Result<Option<Vec<u8>>>;
type StatusFn = fn(&Fetcher, &str, Option<&anyhow::Error>) -> Result<()>;

pub struct Platform {
    name: &'static str,
    fetch: FetchFn,
    status: Option<StatusFn>,
}

static PLATFORMS: &[Platform] = &[
    Platform {
        name: "ec2",
        fetch: providers::ec2::fetch_config,
        status: None,
    },
    Platform {
        name: "file",
        fetch: providers::file::fetch_config,
        status: None,
    },
    Platform {
        name: "ibmcloud",
        fetch: providers::ibmcloud::fetch_config,
        status: None,
    },
    Platform {
        name: "metal",
        fetch: providers::metal::fetch_config,
        status: None,
    },
    Platform {
        name: "qemu",
        fetch: providers::qemu::fetch_config,
        status: None,
    },
];

impl Platform {
    /// Look up a provider by its platform name.
    pub fn get(name: &str) -> Option<&'static Platform> {
        PLATFORMS.iter().find(|p| p.name == name)
    }

    pub fn names() -> Vec<&'static str> {
        PLATFORMS.iter().map(|p| p.name).collect()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fetch the user config from the platform's source. `None` means the
    /// platform has no config for this boot, which is not an error.
    pub fn fetch_config(&self, fetcher: &Fetcher) -> Result<Option<Vec<u8>>> {
        (self.fetch)(fetcher)
    }

    /// Report a stage result to the platform, where supported. Failures
    /// here are the caller's to log and swallow; they never mask the
    /// stage result itself.
    pub fn post_status(
        &self,
        fetcher: &Fetcher,
        stage: &str,
        err: Option<&anyhow::Error>,
    ) -> Result<()> {
        match self.status {
            Some(f) => f(fetcher, stage, err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(Platform::get("qemu").is_some());
        assert!(Platform::get("no-such-cloud").is_none());
        assert!(Platform::names().contains(&"metal"));
    }

    #[test]
    fn test_names_sorted() {
        let names = Platform::names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
