//! The execution stages. Each invocation of the engine runs exactly one
//! of these against the finalized config; the launcher sequences them.

use anyhow::Result;
use camino::Utf8Path;

use ignition_config::Config;

use crate::fetcher::Fetcher;
use crate::state::State;

mod disks;
mod fetch;
mod fetch_offline;
mod files;
mod kargs;
mod mount;
mod umount;

/// What a stage gets to work with besides the config.
pub(crate) struct StageContext<'a> {
    /// Root of the filesystem being provisioned.
    pub root: &'a Utf8Path,
    pub fetcher: &'a Fetcher,
    /// Flag file the offline fetch stage writes when networking is needed.
    pub need_net: &'a Utf8Path,
    pub state: &'a mut State,
}

pub(crate) trait Stage {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &mut StageContext<'_>, config: &Config) -> Result<()>;
}

/// Every available stage, in launch order. The engine receives this
/// explicit table; nothing registers itself at module init.
pub(crate) fn registry() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(fetch::FetchStage),
        Box::new(fetch_offline::FetchOfflineStage),
        Box::new(disks::DisksStage),
        Box::new(mount::MountStage),
        Box::new(files::FilesStage),
        Box::new(umount::UmountStage),
        Box::new(kargs::KargsStage),
    ]
}

pub(crate) fn get(name: &str) -> Option<Box<dyn Stage>> {
    registry().into_iter().find(|s| s.name() == name)
}

/// The valid `--stage` values.
pub fn names() -> Vec<&'static str> {
    registry().iter().map(|s| s.name()).collect()
}
