//! The kargs stage. Compares the running kernel command line with the
//! config's declarations and hands the needed changes to the distro's
//! karg helper, which knows how to edit the boot loader.

use std::process::Command;

use anyhow::{Context, Result};

use ignition_config::Config;
use ignition_utils::CommandRunExt;

use super::{Stage, StageContext};
use crate::kernel_cmdline::{Cmdline, KargsDelta};

/// Distro hook that applies command line changes to the boot loader.
const KARGS_HELPER: &str = "ignition-kargs-helper";

pub(crate) struct KargsStage;

impl Stage for KargsStage {
    fn name(&self) -> &'static str {
        "kargs"
    }

    fn run(&self, _ctx: &mut StageContext<'_>, config: &Config) -> Result<()> {
        if config.kargs.is_empty() {
            return Ok(());
        }
        let cmdline = Cmdline::from_proc()?;
        let delta = KargsDelta::compute(
            &cmdline,
            &config.kargs.should_exist,
            &config.kargs.should_not_exist,
        );
        if delta.is_empty() {
            tracing::info!("kernel arguments already as declared");
            return Ok(());
        }
        apply_delta(&delta)
    }
}

fn helper_args(delta: &KargsDelta) -> Vec<String> {
    let mut args = Vec::new();
    for karg in &delta.append {
        args.push(format!("--append={karg}"));
    }
    for karg in &delta.delete {
        args.push(format!("--delete={karg}"));
    }
    args
}

fn apply_delta(delta: &KargsDelta) -> Result<()> {
    let args = helper_args(delta);
    tracing::info!("updating kernel arguments: {args:?}");
    Command::new(KARGS_HELPER)
        .args(&args)
        .log_debug()
        .run_capture_stderr()
        .context("applying kernel argument changes")
}
