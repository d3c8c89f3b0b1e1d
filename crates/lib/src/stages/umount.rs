//! The umount stage. Tears down what the mount stage set up once the
//! files stage is done writing.

use anyhow::Result;

use ignition_config::Config;

use super::{mount, Stage, StageContext};

pub(crate) struct UmountStage;

impl Stage for UmountStage {
    fn name(&self) -> &'static str {
        "umount"
    }

    fn run(&self, ctx: &mut StageContext<'_>, config: &Config) -> Result<()> {
        mount::unmount_all(ctx, &config.storage.filesystems)
    }
}
