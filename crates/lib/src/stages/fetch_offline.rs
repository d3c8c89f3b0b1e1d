//! The offline fetch stage. The engine acquires the config with an
//! offline fetcher; if that needed the network, the engine writes the
//! neednet flag file and fails so the launcher brings networking up and
//! re-runs the online fetch stage. Like `fetch`, by the time this body
//! runs the config is cached.

use anyhow::Result;

use ignition_config::Config;

use super::{Stage, StageContext};

pub(crate) struct FetchOfflineStage;

impl Stage for FetchOfflineStage {
    fn name(&self) -> &'static str {
        "fetch-offline"
    }

    fn run(&self, _ctx: &mut StageContext<'_>, config: &Config) -> Result<()> {
        // The cached config itself may still direct later stages at
        // remote resources; those stages run with networking up.
        let remote = config
            .storage
            .files
            .iter()
            .flat_map(|f| f.contents.iter().chain(f.append.iter()))
            .chain(&config.ignition.security.tls.certificate_authorities)
            .filter_map(|r| r.source.as_deref())
            .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
            .count();
        if remote > 0 {
            tracing::info!("config references {remote} remote resource(s); later stages need networking");
        }
        Ok(())
    }
}
