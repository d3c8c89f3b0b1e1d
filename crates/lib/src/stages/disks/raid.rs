//! Software RAID assembly via mdadm.

use std::process::Command;

use anyhow::{Context, Result};
use camino::Utf8Path;
use fn_error_context::context;

use ignition_config::v3_1::Raid;
use ignition_config::Config;
use ignition_utils::CommandRunExt;

use crate::blockdev;

pub(super) fn create_raids(config: &Config) -> Result<()> {
    let raids = &config.storage.raid;
    if raids.is_empty() {
        return Ok(());
    }
    let span = tracing::info_span!("createRaids");
    let _e = span.enter();

    let devs: Vec<&Utf8Path> = raids
        .iter()
        .flat_map(|r| r.devices.iter())
        .map(Utf8Path::new)
        .collect();
    blockdev::wait_on_devices_and_create_aliases(&devs, "raids")?;

    for array in raids {
        create_raid(array)?;
    }
    Ok(())
}

#[context("Creating raid array {}", array.name)]
fn create_raid(array: &Raid) -> Result<()> {
    let args = mdadm_args(array);
    tracing::info!("creating raid array {}", array.name);
    Command::new("mdadm")
        .args(&args)
        .log_debug()
        .run_capture_stderr()
        .context("mdadm failed")?;

    // the freshly assembled node is what later filesystem entries refer to
    let md = format!("/dev/md/{}", array.name);
    blockdev::wait_on_devices_and_create_aliases(&[Utf8Path::new(&md)], "raids")?;
    Ok(())
}

fn mdadm_args(array: &Raid) -> Vec<String> {
    let spares = array.spares.unwrap_or(0);
    let raid_devices = array.devices.len() as i64 - spares;
    let mut args = vec![
        "--create".to_owned(),
        array.name.clone(),
        "--force".to_owned(),
        "--run".to_owned(),
        "--homehost".to_owned(),
        "any".to_owned(),
        "--level".to_owned(),
        array.level.clone(),
        "--raid-devices".to_owned(),
        raid_devices.to_string(),
    ];
    if spares > 0 {
        args.push("--spare-devices".to_owned());
        args.push(spares.to_string());
    }
    for opt in &array.options {
        args.push(opt.clone());
    }
    for dev in &array.devices {
        args.push(
            blockdev::device_alias(Utf8Path::new(dev))
                .into_string(),
        );
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mdadm_args() {
        let array = Raid {
            name: "data".into(),
            level: "raid1".into(),
            devices: vec!["/dev/vdb".into(), "/dev/vdc".into(), "/dev/vdd".into()],
            spares: Some(1),
            options: vec!["--metadata=1.2".into()],
        };
        let args = mdadm_args(&array);
        assert_eq!(args[0..2], ["--create", "data"]);
        assert!(args.contains(&"--raid-devices".to_owned()));
        let idx = args.iter().position(|a| a == "--raid-devices").unwrap();
        assert_eq!(args[idx + 1], "2");
        assert!(args.contains(&"--spare-devices".to_owned()));
        assert!(args.contains(&"--metadata=1.2".to_owned()));
        // member devices go through their aliases
        assert!(args.last().unwrap().starts_with("/run/ignition/dev_aliases/"));
    }
}
