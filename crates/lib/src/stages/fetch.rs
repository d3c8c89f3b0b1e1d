//! The fetch stage. Acquiring and caching the final config is done by
//! the engine before any stage runs; reaching this stage's body means
//! that work succeeded, so there is nothing left but to say so.

use anyhow::Result;

use ignition_config::Config;

use super::{Stage, StageContext};

pub(crate) struct FetchStage;

impl Stage for FetchStage {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn run(&self, _ctx: &mut StageContext<'_>, _config: &Config) -> Result<()> {
        tracing::info!("config fetched and cached");
        Ok(())
    }
}
