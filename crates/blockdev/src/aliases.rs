//! Stable aliases for block device nodes.
//!
//! udev may rename or recreate `/dev` entries while a stage is mutating a
//! device. Operations therefore go through a symlink under a private
//! directory which is created once, after the device first appears, and
//! is not touched by udev afterwards.

use std::io::ErrorKind;
use std::os::unix::fs::symlink;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;

/// Directory holding device alias symlinks.
pub const ALIAS_DIR: &str = "/run/ignition/dev_aliases";

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.')
}

/// Percent-encode a device path into a single path component.
fn encode_component(dev: &str) -> String {
    let mut out = String::with_capacity(dev.len());
    for &b in dev.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// The alias path for a device, whether or not it exists yet.
pub fn device_alias(dev: &Utf8Path) -> Utf8PathBuf {
    Utf8Path::new(ALIAS_DIR).join(encode_component(dev.as_str()))
}

/// Create (or refresh) the alias symlink for `dev`, returning the resolved
/// target. The device node must already exist.
#[context("Creating device alias for {dev}")]
pub fn create_device_alias(dev: &Utf8Path) -> Result<Utf8PathBuf> {
    let target = Utf8PathBuf::try_from(
        std::fs::canonicalize(dev).with_context(|| format!("resolving {dev}"))?,
    )?;
    let alias = device_alias(dev);
    std::fs::create_dir_all(ALIAS_DIR)?;
    match symlink(&target, &alias) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            // Idempotent re-creation: point the alias at the fresh target.
            std::fs::remove_file(&alias)?;
            symlink(&target, &alias)?;
        }
        Err(e) => return Err(e).with_context(|| format!("symlinking {alias}")),
    }
    tracing::info!("created device alias for {dev}: {alias} -> {target}");
    Ok(target)
}
