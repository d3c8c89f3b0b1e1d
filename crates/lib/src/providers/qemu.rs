//! The QEMU provider reads a local config from the firmware config
//! interface. Platforms without qemu_fw_cfg support should use a
//! config-drive based provider instead.

use std::process::Command;

use anyhow::{Context, Result};

use ignition_utils::CommandRunExt;

use crate::fetcher::Fetcher;

const FIRMWARE_CONFIG_PATHS: &[&str] = &[
    "/sys/firmware/qemu_fw_cfg/by_name/opt/org.flatcar-linux/config/raw",
    "/sys/firmware/qemu_fw_cfg/by_name/opt/com.coreos/config/raw",
];

pub(crate) fn fetch_config(_fetcher: &Fetcher) -> Result<Option<Vec<u8>>> {
    Command::new("modprobe")
        .arg("qemu_fw_cfg")
        .log_debug()
        .run_capture_stderr()
        .context("loading QEMU firmware config module")?;

    for path in FIRMWARE_CONFIG_PATHS {
        match std::fs::read(path) {
            Ok(data) => return Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("QEMU firmware config not found at {path}, ignoring");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading QEMU firmware config {path}"))
            }
        }
    }
    Ok(None)
}
