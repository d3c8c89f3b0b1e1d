//! Systemd unit files, dropins, masking, and enablement presets.

use std::os::unix::fs::symlink;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use fn_error_context::context;

use ignition_config::v3_1::Unit;
use ignition_config::Config;
use ignition_utils::join_under_root;

use crate::stages::StageContext;

const UNIT_DIR: &str = "/etc/systemd/system";
/// Applied by `systemctl preset-all` during the first real boot.
const PRESET_PATH: &str = "/etc/systemd/system-preset/20-ignition.preset";

pub(super) fn create_units(ctx: &StageContext<'_>, config: &Config) -> Result<()> {
    if config.systemd.units.is_empty() {
        return Ok(());
    }
    let span = tracing::info_span!("createUnits");
    let _e = span.enter();

    let mut presets = String::new();
    for unit in &config.systemd.units {
        write_unit(ctx, unit)?;
        match unit.enabled {
            Some(true) => presets.push_str(&format!("enable {}\n", unit.name)),
            Some(false) => presets.push_str(&format!("disable {}\n", unit.name)),
            None => {}
        }
    }

    if !presets.is_empty() {
        let path = join_under_root(ctx.root, PRESET_PATH.into());
        std::fs::create_dir_all(path.parent().expect("preset path has a parent"))?;
        std::fs::write(&path, presets).with_context(|| format!("writing {path}"))?;
    }
    Ok(())
}

#[context("Writing unit {}", unit.name)]
fn write_unit(ctx: &StageContext<'_>, unit: &Unit) -> Result<()> {
    let unit_path = unit_path(ctx, &unit.name);
    std::fs::create_dir_all(unit_path.parent().expect("unit path has a parent"))?;

    if unit.mask == Some(true) {
        tracing::info!("masking unit {}", unit.name);
        match std::fs::symlink_metadata(&unit_path) {
            Ok(_) => std::fs::remove_file(&unit_path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        symlink("/dev/null", &unit_path)?;
        return Ok(());
    }

    if let Some(contents) = &unit.contents {
        tracing::info!("writing unit {}", unit.name);
        std::fs::write(&unit_path, contents)?;
    }

    for dropin in &unit.dropins {
        let Some(contents) = &dropin.contents else {
            continue;
        };
        let dir = Utf8PathBuf::from(format!("{unit_path}.d"));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(&dropin.name);
        tracing::info!("writing dropin {} for unit {}", dropin.name, unit.name);
        std::fs::write(&path, contents).with_context(|| format!("writing {path}"))?;
    }
    Ok(())
}

fn unit_path(ctx: &StageContext<'_>, name: &str) -> Utf8PathBuf {
    join_under_root(ctx.root, UNIT_DIR.into()).join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    use crate::fetcher::Fetcher;
    use crate::state::State;

    fn run_units(root: &Utf8Path, config: &Config) {
        let fetcher = Fetcher::new(true).unwrap();
        let mut state = State::default();
        let ctx = StageContext {
            root,
            fetcher: &fetcher,
            need_net: Utf8Path::new("/run/ignition/neednet"),
            state: &mut state,
        };
        create_units(&ctx, config).unwrap();
    }

    fn config(raw: &str) -> Config {
        let (cfg, _) = ignition_config::parse(raw.as_bytes()).unwrap();
        cfg
    }

    #[test]
    fn test_unit_contents_dropins_and_presets() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let cfg = config(
            r#"{
            "ignition": {"version": "3.1.0"},
            "systemd": {"units": [
                {"name": "example.service", "enabled": true, "contents": "[Service]\nExecStart=/bin/true\n",
                 "dropins": [{"name": "10-env.conf", "contents": "[Service]\nEnvironment=A=1\n"}]},
                {"name": "other.service", "enabled": false}
            ]}
        }"#,
        );
        run_units(root, &cfg);

        let unit = root.join("etc/systemd/system/example.service");
        assert!(std::fs::read_to_string(unit).unwrap().contains("ExecStart"));
        let dropin = root.join("etc/systemd/system/example.service.d/10-env.conf");
        assert!(std::fs::read_to_string(dropin).unwrap().contains("A=1"));
        let presets =
            std::fs::read_to_string(root.join("etc/systemd/system-preset/20-ignition.preset"))
                .unwrap();
        assert_eq!(presets, "enable example.service\ndisable other.service\n");
    }

    #[test]
    fn test_mask_points_at_dev_null() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let cfg = config(
            r#"{
            "ignition": {"version": "3.1.0"},
            "systemd": {"units": [{"name": "noisy.service", "mask": true}]}
        }"#,
        );
        run_units(root, &cfg);
        let dest = std::fs::read_link(root.join("etc/systemd/system/noisy.service")).unwrap();
        assert_eq!(dest, std::path::PathBuf::from("/dev/null"));
    }
}
