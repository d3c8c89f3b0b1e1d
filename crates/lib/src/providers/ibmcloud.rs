//! The IBM Cloud provider reads the user data from the cidata
//! config-drive. The drive may take a moment to appear after boot, so
//! discovery polls under a fixed deadline and continues without a config
//! if nothing shows up.

use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use camino::Utf8Path;

use ignition_utils::CommandRunExt;

use crate::fetcher::Fetcher;

const CONFIG_DRIVE_LABEL_PATH: &str = "/dev/disk/by-label/cidata";
const USERDATA_PATH: &str = "user-data";
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn fetch_config(_fetcher: &Fetcher) -> Result<Option<Vec<u8>>> {
    let deadline = Instant::now() + DISCOVERY_TIMEOUT;
    while std::fs::metadata(CONFIG_DRIVE_LABEL_PATH).is_err() {
        if Instant::now() >= deadline {
            tracing::info!("cidata drive was not available in time, continuing without a config");
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(500));
    }
    read_user_data(Utf8Path::new(CONFIG_DRIVE_LABEL_PATH))
}

fn read_user_data(dev: &Utf8Path) -> Result<Option<Vec<u8>>> {
    let mnt = tempfile::tempdir().context("creating config drive mountpoint")?;
    Command::new("mount")
        .args(["-o", "ro"])
        .arg(dev.as_str())
        .arg(mnt.path())
        .log_debug()
        .run_capture_stderr()
        .context("mounting config drive")?;
    let data = std::fs::read(mnt.path().join(USERDATA_PATH));
    let umount = Command::new("umount")
        .arg(mnt.path())
        .run_capture_stderr()
        .context("unmounting config drive");
    let data = match data {
        Ok(data) => Some(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e).context("reading user data from config drive"),
    };
    umount?;
    Ok(data)
}
