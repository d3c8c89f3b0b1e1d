//! The files stage: users and groups, filesystem entries, and systemd
//! units, written into the (by now mounted) target root.
//!
//! Users come first so that entries owned by a just-created user can
//! resolve its name; units come last so enablement presets see every
//! unit this config writes.

mod nodes;
mod passwd;
mod units;

use anyhow::Result;

use ignition_config::Config;

use super::{Stage, StageContext};

pub(crate) struct FilesStage;

impl Stage for FilesStage {
    fn name(&self) -> &'static str {
        "files"
    }

    fn run(&self, ctx: &mut StageContext<'_>, config: &Config) -> Result<()> {
        passwd::create_passwd(ctx, config)?;
        nodes::create_entries(ctx, config)?;
        units::create_units(ctx, config)?;
        Ok(())
    }
}
