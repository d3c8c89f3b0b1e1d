//! The disks stage: partition tables, RAID arrays, and filesystems, in
//! that strict order.
//!
//! Interacting with disks, partitions, raids, or filesystems can race
//! with udev renaming device nodes under us. Every mutation therefore
//! goes through a device alias created after the node first appears,
//! and is followed by a triggered-settle so udev has digested the
//! change before the next step begins.

mod filesystems;
mod partitions;
mod raid;

use anyhow::{Context, Result};

use ignition_config::Config;

use super::{Stage, StageContext};

pub(crate) struct DisksStage;

impl Stage for DisksStage {
    fn name(&self) -> &'static str {
        "disks"
    }

    fn run(&self, _ctx: &mut StageContext<'_>, config: &Config) -> Result<()> {
        // If there is nothing to do we also skip the udev settling
        // dance entirely; provisioning a root-only machine must not
        // touch the device subsystem at all.
        if config.storage.disks.is_empty()
            && config.storage.raid.is_empty()
            && filesystems::creatable(config).is_empty()
        {
            return Ok(());
        }

        partitions::create_partitions(config).context("create partitions failed")?;
        raid::create_raids(config).context("failed to create raids")?;
        filesystems::create_filesystems(config).context("failed to create filesystems")?;
        Ok(())
    }
}
