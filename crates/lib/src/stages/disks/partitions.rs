//! Partition table realization via sgdisk.

use std::process::Command;

use anyhow::{bail, Context, Result};
use camino::Utf8Path;
use fn_error_context::context;

use ignition_config::v3_1::{Disk, Partition};
use ignition_config::Config;
use ignition_utils::CommandRunExt;

use crate::blockdev;

pub(super) fn create_partitions(config: &Config) -> Result<()> {
    let disks = &config.storage.disks;
    if disks.is_empty() {
        return Ok(());
    }
    let span = tracing::info_span!("createPartitions");
    let _e = span.enter();

    let devs: Vec<&Utf8Path> = disks.iter().map(|d| Utf8Path::new(&d.device)).collect();
    blockdev::wait_on_devices_and_create_aliases(&devs, "disks")?;

    for disk in disks {
        partition_disk(disk)?;
    }
    Ok(())
}

#[context("Partitioning {}", disk.device)]
fn partition_disk(disk: &Disk) -> Result<()> {
    let alias = blockdev::device_alias(Utf8Path::new(&disk.device));

    if disk.wipe_table == Some(true) {
        tracing::info!("wiping partition table of {}", disk.device);
        Command::new("sgdisk")
            .arg("--zap-all")
            .arg(&alias)
            .log_debug()
            .run_capture_stderr()
            .context("wiping partition table")?;
        blockdev::udev_settle(&alias, "disks")?;
    }

    // Whatever survived the optional wipe is what partition directives
    // are judged against.
    let table = blockdev::partitions_of(&alias).ok();
    let args = sgdisk_args(disk, table.as_ref())?;
    if args.is_empty() {
        return Ok(());
    }

    Command::new("sgdisk")
        .args(&args)
        .arg(&alias)
        .log_debug()
        .run_capture_stderr()
        .context("writing partition table")?;
    blockdev::udev_settle(&alias, "disks")?;
    Ok(())
}

/// Build the sgdisk argument list realizing `disk.partitions` against
/// the probed `table`. An empty result means the table already conforms.
fn sgdisk_args(
    disk: &Disk,
    table: Option<&blockdev::PartitionTable>,
) -> Result<Vec<String>> {
    let mut args = Vec::new();
    for part in &disk.partitions {
        let existing = (part.number != 0)
            .then(|| table.and_then(|t| t.find_partno(part.number)))
            .flatten();

        if part.should_exist == Some(false) {
            if part.number == 0 {
                bail!("partitions that should not exist must carry a number");
            }
            if existing.is_some() {
                args.push(format!("--delete={}", part.number));
            }
            continue;
        }

        if let Some(existing) = existing {
            if part.wipe_partition_entry != Some(true) {
                tracing::info!(
                    "partition {} on {} already exists ({}), leaving it",
                    part.number,
                    disk.device,
                    existing.node
                );
                continue;
            }
            args.push(format!("--delete={}", part.number));
        }

        args.extend(creation_args(part));
    }
    Ok(args)
}

fn creation_args(part: &Partition) -> Vec<String> {
    // sgdisk itself treats partition number 0 as "next available"
    let num = part.number;
    let start = part.start_mib.map(|s| format!("{s}M")).unwrap_or_else(|| "0".into());
    let end = part
        .size_mib
        .map(|s| format!("+{s}M"))
        .unwrap_or_else(|| "0".into());
    let mut args = vec![format!("--new={num}:{start}:{end}")];
    if let Some(label) = &part.label {
        args.push(format!("--change-name={num}:{label}"));
    }
    if let Some(type_guid) = &part.type_guid {
        args.push(format!("--typecode={num}:{type_guid}"));
    }
    if let Some(guid) = &part.guid {
        args.push(format!("--partition-guid={num}:{guid}"));
    }
    args
}
