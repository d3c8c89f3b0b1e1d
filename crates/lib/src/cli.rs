//! Command line surfaces for the two personalities of the binary: the
//! staged engine (`ignition`) and single-shot application
//! (`ignition-apply`, selected by argv[0]).

use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;

use crate::apply::{self, ApplyFlags};
use crate::engine::Engine;
use crate::fetcher::Fetcher;
use crate::platform::Platform;
use crate::stages;
use crate::state::State;

/// Exit code for a failed stage.
const EXIT_FAILURE: i32 = 1;
/// Exit code for bad arguments.
const EXIT_USAGE: i32 = 2;
/// Exit code for environment problems before any stage ran.
const EXIT_SETUP: i32 = 3;

#[derive(Debug, Parser)]
#[clap(name = "ignition")]
struct IgnitionOpts {
    /// Where to cache the final config
    #[clap(long, default_value = "/run/ignition.json")]
    config_cache: Utf8PathBuf,
    /// Initial duration for which to wait for config, e.g. 50s or 3m
    #[clap(long, value_parser = parse_duration)]
    fetch_timeout: Option<Duration>,
    /// Flag file to write from fetch-offline if networking is needed
    #[clap(long, default_value = "/run/ignition/neednet")]
    neednet: Utf8PathBuf,
    /// Current platform
    #[clap(long)]
    platform: Option<String>,
    /// Obsolete alias of --platform
    #[clap(long, hide = true)]
    oem: Option<String>,
    /// Root of the filesystem
    #[clap(long, default_value = "/")]
    root: Utf8PathBuf,
    /// Execution stage
    #[clap(long)]
    stage: Option<String>,
    /// Where to store internal state
    #[clap(long, default_value = "/run/ignition/state")]
    state_file: Utf8PathBuf,
    /// Print the version and exit
    #[clap(long)]
    version: bool,
    /// Log to stdout instead of the system log
    #[clap(long)]
    log_to_stdout: bool,
}

#[derive(Debug, Parser)]
#[clap(name = "ignition-apply")]
struct ApplyOpts {
    /// Root of the filesystem
    #[clap(long, default_value = "/")]
    root: Utf8PathBuf,
    /// Ignore unsupported config sections instead of failing
    #[clap(long)]
    ignore_unsupported: bool,
    /// Error out if the config references remote resources
    #[clap(long)]
    offline: bool,
    /// Print the version and exit
    #[clap(long)]
    version: bool,
    /// Path to the config, or - for stdin
    config: Option<String>,
}

/// Entry point shared by both personalities; returns the process exit
/// code.
pub fn run<I: IntoIterator<Item = String>>(args: I) -> i32 {
    let args: Vec<String> = args.into_iter().collect();
    let apply_mode = args
        .first()
        .map(|a| a.rsplit('/').next() == Some("ignition-apply"))
        .unwrap_or(false);
    if apply_mode {
        apply_main(args)
    } else {
        ignition_main(args)
    }
}

fn ignition_main(args: Vec<String>) -> i32 {
    let opts = IgnitionOpts::parse_from(args);

    if opts.version {
        println!("ignition {}", env!("CARGO_PKG_VERSION"));
        return 0;
    }

    let platform_name = match (&opts.platform, &opts.oem) {
        (Some(p), _) => p.clone(),
        (None, Some(o)) => {
            eprintln!("warning: '--oem' is obsolete, use '--platform'");
            o.clone()
        }
        (None, None) => {
            eprintln!("'--platform' must be provided. {:?}", Platform::names());
            return EXIT_USAGE;
        }
    };
    let Some(stage_name) = opts.stage.clone() else {
        eprintln!("'--stage' must be provided. {:?}", stages::names());
        return EXIT_USAGE;
    };
    if !stages::names().contains(&stage_name.as_str()) {
        eprintln!("invalid stage {stage_name:?}. {:?}", stages::names());
        return EXIT_USAGE;
    }
    let Some(platform) = Platform::get(&platform_name) else {
        eprintln!("invalid platform {platform_name:?}. {:?}", Platform::names());
        return EXIT_USAGE;
    };

    ignition_utils::initialize_tracing(opts.log_to_stdout);
    tracing::info!("ignition {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("stage: {stage_name}");

    let fetcher = match Fetcher::new(stage_name == "fetch-offline") {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("failed to construct fetcher: {e:#}");
            return EXIT_SETUP;
        }
    };
    let state = match State::load(&opts.state_file) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("reading state: {e:#}");
            return EXIT_SETUP;
        }
    };

    let mut engine = Engine {
        root: opts.root,
        fetch_timeout: opts.fetch_timeout,
        need_net: opts.neednet,
        config_cache: opts.config_cache,
        platform,
        fetcher,
        state,
        state_path: opts.state_file,
    };

    let result = engine.run(&stage_name);

    // best-effort status report to the platform; never masks the result
    if let Err(status_err) =
        engine
            .platform
            .post_status(&engine.fetcher, &stage_name, result.as_ref().err())
    {
        tracing::error!("posting status: {status_err:#}");
    }

    match result {
        Ok(()) => {
            tracing::info!("ignition finished successfully");
            0
        }
        Err(e) => {
            tracing::error!("ignition failed: {e:#}");
            EXIT_FAILURE
        }
    }
}

fn apply_main(args: Vec<String>) -> i32 {
    let opts = ApplyOpts::parse_from(args);

    if opts.version {
        println!("ignition-apply {}", env!("CARGO_PKG_VERSION"));
        return 0;
    }

    ignition_utils::initialize_tracing(true);

    let Some(config_arg) = opts.config.as_deref() else {
        eprintln!("usage: ignition-apply [options] config.ign");
        return EXIT_USAGE;
    };

    match apply_config(config_arg, &opts) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("failed to apply: {e:#}");
            EXIT_FAILURE
        }
    }
}

fn apply_config(config_arg: &str, opts: &ApplyOpts) -> Result<()> {
    let blob = if config_arg == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("reading config from stdin")?;
        buf
    } else {
        std::fs::read(config_arg).with_context(|| format!("reading config {config_arg}"))?
    };

    let (cfg, report) = ignition_config::parse_compatible(&blob).map_err(|(report, e)| {
        if !report.is_empty() {
            tracing::error!("config diagnostics:\n{report}");
        }
        anyhow::Error::new(e)
    })?;
    if !report.is_empty() {
        tracing::info!("config diagnostics:\n{report}");
    }

    let fetcher = Fetcher::new(opts.offline)?;
    let flags = ApplyFlags {
        root: opts.root.clone(),
        ignore_unsupported: opts.ignore_unsupported,
        offline: opts.offline,
    };
    apply::run(&cfg, &flags, &fetcher)
}

/// Parse durations of the shape `50s`, `3m`, `1h`, or bare seconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let (value, mul) = match s.as_bytes().last() {
        Some(b's') => (&s[..s.len() - 1], 1),
        Some(b'm') => (&s[..s.len() - 1], 60),
        Some(b'h') => (&s[..s.len() - 1], 3600),
        _ => (s, 1),
    };
    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration {s:?}"))?;
    Ok(Duration::from_secs(value * mul))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("50s").unwrap(), Duration::from_secs(50));
        assert_eq!(parse_duration("3m").unwrap(), Duration::from_secs(180));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_argv0_dispatch() {
        // version flag exits 0 under both personalities
        assert_eq!(
            run(["ignition".to_owned(), "--version".to_owned()]),
            0
        );
        assert_eq!(
            run(["/usr/bin/ignition-apply".to_owned(), "--version".to_owned()]),
            0
        );
    }

    #[test]
    fn test_missing_platform_is_usage_error() {
        assert_eq!(
            run(["ignition".to_owned(), "--stage".to_owned(), "fetch".to_owned()]),
            EXIT_USAGE
        );
    }
}
