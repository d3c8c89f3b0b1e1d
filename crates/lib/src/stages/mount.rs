//! The mount stage. Mounts every config filesystem that declares a
//! mountpoint under the target root so the files stage can write into
//! them, shallowest mountpoint first.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use fn_error_context::context;

use ignition_config::v3_1::Filesystem;
use ignition_config::Config;
use ignition_utils::join_under_root;

use super::{Stage, StageContext};

pub(crate) struct MountStage;

impl Stage for MountStage {
    fn name(&self) -> &'static str {
        "mount"
    }

    fn run(&self, ctx: &mut StageContext<'_>, config: &Config) -> Result<()> {
        for fs in mount_order(&config.storage.filesystems) {
            mount_filesystem(ctx, fs)?;
        }
        Ok(())
    }
}

/// The filesystems that want mounting, shallowest path first so parents
/// exist before children.
pub(super) fn mount_order(filesystems: &[Filesystem]) -> Vec<&Filesystem> {
    let mut out: Vec<&Filesystem> = filesystems
        .iter()
        .filter(|fs| fs.path.is_some())
        .filter(|fs| !matches!(fs.format.as_deref(), None | Some("swap") | Some("none")))
        .collect();
    out.sort_by_key(|fs| depth(fs.path.as_deref().unwrap_or("")));
    out
}

fn depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

#[context("Mounting {}", fs.device)]
fn mount_filesystem(ctx: &StageContext<'_>, fs: &Filesystem) -> Result<()> {
    let path = fs.path.as_deref().expect("mountable filesystem has a path");
    let format = fs.format.as_deref().expect("mountable filesystem has a format");
    let target = join_under_root(ctx.root, path.into());
    std::fs::create_dir_all(&target)
        .with_context(|| format!("creating mountpoint {target}"))?;
    let data = fs.mount_options.join(",");
    let data = std::ffi::CString::new(data).expect("no NUL bytes");
    tracing::info!("mounting {} at {target} ({format})", fs.device);
    rustix::mount::mount(
        fs.device.as_str(),
        target.as_std_path(),
        format,
        rustix::mount::MountFlags::empty(),
        data.as_c_str(),
    )
    .with_context(|| format!("mounting {} at {target}", fs.device))?;
    Ok(())
}

/// Unmount what [`mount_order`] mounted, deepest first.
pub(super) fn unmount_all(ctx: &StageContext<'_>, filesystems: &[Filesystem]) -> Result<()> {
    let mut mounted: Vec<Utf8PathBuf> = mount_order(filesystems)
        .into_iter()
        .map(|fs| join_under_root(ctx.root, fs.path.as_deref().unwrap_or("").into()))
        .collect();
    mounted.reverse();
    for target in mounted {
        tracing::info!("unmounting {target}");
        rustix::mount::unmount(target.as_std_path(), rustix::mount::UnmountFlags::empty())
            .with_context(|| format!("unmounting {target}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs(device: &str, format: Option<&str>, path: Option<&str>) -> Filesystem {
        Filesystem {
            device: device.into(),
            format: format.map(Into::into),
            path: path.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn test_mount_order() {
        let fss = vec![
            fs("/dev/vdb3", Some("xfs"), Some("/var/lib/data")),
            fs("/dev/vdb1", Some("ext4"), Some("/var")),
            fs("/dev/vdb2", Some("swap"), None),
            fs("/dev/vdb4", Some("ext4"), None),
        ];
        let order: Vec<&str> = mount_order(&fss).iter().map(|f| f.device.as_str()).collect();
        assert_eq!(order, vec!["/dev/vdb1", "/dev/vdb3"]);
    }
}
