//! The engine drives exactly one stage per process invocation: it
//! acquires the finalized config (from the cache, or for the fetch
//! stages from the platform), hands it to the stage, and persists state
//! on success.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use camino::Utf8PathBuf;
use fn_error_context::context;

use ignition_config::v3_1::Resource;
use ignition_config::{merge, Config, Report};

use crate::fetcher::{FetchError, Fetcher};
use crate::platform::Platform;
use crate::stages;
use crate::stages::StageContext;
use crate::state::{FetchedConfig, State};

/// How deep config references may nest before we assume a cycle.
const MAX_CONFIG_DEPTH: u32 = 8;

pub struct Engine {
    pub root: Utf8PathBuf,
    pub fetch_timeout: Option<Duration>,
    pub need_net: Utf8PathBuf,
    pub config_cache: Utf8PathBuf,
    pub platform: &'static Platform,
    pub fetcher: Fetcher,
    pub state: State,
    pub state_path: Utf8PathBuf,
}

impl Engine {
    /// Run the named stage to completion. State is only persisted when
    /// the stage succeeds.
    pub fn run(&mut self, stage_name: &str) -> Result<()> {
        let stage = stages::get(stage_name)
            .ok_or_else(|| anyhow!("unknown stage {stage_name:?}"))?;

        let config = self.acquire_config(stage_name)?;
        self.fetcher.apply_timeouts(&config.ignition.timeouts);

        {
            let span = tracing::info_span!("stage", name = stage_name);
            let _e = span.enter();
            let mut ctx = StageContext {
                root: &self.root,
                fetcher: &self.fetcher,
                need_net: &self.need_net,
                state: &mut self.state,
            };
            stage
                .run(&mut ctx, &config)
                .with_context(|| format!("stage {stage_name:?} failed"))?;
        }

        self.state.save(&self.state_path)?;
        Ok(())
    }

    /// Produce the final config for this run: the cached one if an
    /// earlier stage wrote it, otherwise (for the fetch stages only)
    /// fetch, resolve references, merge, validate, and cache.
    fn acquire_config(&mut self, stage_name: &str) -> Result<Config> {
        match std::fs::read(&self.config_cache) {
            Ok(raw) => {
                tracing::info!("using config cached at {}", self.config_cache);
                let (cfg, report) =
                    ignition_config::parse(&raw).map_err(|(report, e)| config_error(report, e))?;
                log_report(&report);
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !stage_name.starts_with("fetch") {
                    bail!(
                        "no cached config at {}; the fetch stage must run first",
                        self.config_cache
                    );
                }
                match self.fetch_and_render() {
                    Ok(cfg) => {
                        self.write_cache(&cfg)?;
                        Ok(cfg)
                    }
                    Err(e) => {
                        if stage_name == "fetch-offline" && needs_network(&e) {
                            self.flag_need_net()?;
                        }
                        Err(e)
                    }
                }
            }
            Err(e) => {
                Err(e).with_context(|| format!("reading config cache {}", self.config_cache))
            }
        }
    }

    fn fetch_and_render(&mut self) -> Result<Config> {
        if let Some(timeout) = self.fetch_timeout {
            self.fetcher.set_total_timeout(timeout);
        }
        let raw = self
            .platform
            .fetch_config(&self.fetcher)
            .with_context(|| format!("fetching config from platform {:?}", self.platform.name()))?;
        let Some(raw) = raw else {
            tracing::info!("platform provided no config, continuing with an empty one");
            return Ok(empty_config());
        };
        self.state.fetched_configs.push(FetchedConfig {
            source: self.platform.name().to_owned(),
            referenced: false,
        });

        let cfg = self.render(&raw, MAX_CONFIG_DEPTH)?;

        let report = ignition_config::v3_1::validate(&cfg);
        log_report(&report);
        if report.is_fatal() {
            bail!("merged config is invalid:\n{report}");
        }
        Ok(cfg)
    }

    /// Parse raw bytes at any supported version and resolve the config
    /// references they carry: `replace` supersedes everything, `merge`
    /// entries are parents applied beneath this config.
    fn render(&mut self, raw: &[u8], depth: u32) -> Result<Config> {
        if depth == 0 {
            bail!("config references nested too deeply");
        }
        let (cfg, report) =
            ignition_config::parse_compatible(raw).map_err(|(report, e)| config_error(report, e))?;
        log_report(&report);

        if let Some(replace) = &cfg.ignition.config.replace {
            if let Some(data) = self.fetch_reference(replace)? {
                tracing::info!("config is replaced by a referenced config");
                return self.render(&data, depth - 1);
            }
        }

        let mut parents: Option<Config> = None;
        for reference in &cfg.ignition.config.merge {
            let Some(data) = self
                .fetcher
                .fetch_resource(reference)
                .context("fetching merged config")?
            else {
                continue;
            };
            self.record_reference(reference);
            let parent = self.render(&data, depth - 1)?;
            parents = Some(match parents {
                Some(acc) => merge(acc, parent),
                None => parent,
            });
        }
        Ok(match parents {
            Some(p) => merge(p, cfg),
            None => cfg,
        })
    }

    fn fetch_reference(&mut self, reference: &Resource) -> Result<Option<Vec<u8>>> {
        let data = self
            .fetcher
            .fetch_resource(reference)
            .context("fetching replacement config")?;
        if data.is_some() {
            self.record_reference(reference);
        }
        Ok(data)
    }

    fn record_reference(&mut self, reference: &Resource) {
        self.state.fetched_configs.push(FetchedConfig {
            source: reference.source.clone().unwrap_or_default(),
            referenced: true,
        });
    }

    #[context("Caching config to {}", self.config_cache)]
    fn write_cache(&self, cfg: &Config) -> Result<()> {
        use std::io::Write;
        let dir = self
            .config_cache
            .parent()
            .unwrap_or(camino::Utf8Path::new("/"));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, cfg)?;
        tmp.flush()?;
        tmp.persist(&self.config_cache)
            .map_err(|e| anyhow::Error::new(e.error).context("replacing config cache"))?;
        Ok(())
    }

    /// Tell the launcher that fetching needs the network up.
    fn flag_need_net(&self) -> Result<()> {
        tracing::info!("config fetch needs networking, flagging {}", self.need_net);
        if let Some(dir) = self.need_net.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.need_net, b"")
            .with_context(|| format!("writing {}", self.need_net))
    }
}

fn empty_config() -> Config {
    Config {
        ignition: ignition_config::v3_1::Ignition {
            version: ignition_config::MAX_VERSION.to_owned(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn config_error(report: Report, e: ignition_config::ConfigError) -> anyhow::Error {
    log_report(&report);
    anyhow::Error::new(e)
}

fn log_report(report: &Report) {
    if !report.is_empty() {
        tracing::info!("config diagnostics:\n{report}");
    }
}

fn needs_network(e: &anyhow::Error) -> bool {
    e.chain()
        .any(|c| matches!(c.downcast_ref::<FetchError>(), Some(FetchError::NeedsNetwork)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    fn engine_in(dir: &Utf8Path) -> Engine {
        Engine {
            root: dir.join("root"),
            fetch_timeout: None,
            need_net: dir.join("neednet"),
            config_cache: dir.join("ignition.json"),
            platform: Platform::get("metal").unwrap(),
            fetcher: Fetcher::new(true).unwrap(),
            state: State::default(),
            state_path: dir.join("state"),
        }
    }

    #[test]
    fn test_unknown_stage() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let mut engine = engine_in(dir);
        assert!(engine.run("frobnicate").is_err());
    }

    #[test]
    fn test_fetch_with_no_platform_config_caches_empty() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let mut engine = engine_in(dir);
        engine.run("fetch").unwrap();

        // cache now holds a valid empty current-version config
        let raw = std::fs::read(dir.join("ignition.json")).unwrap();
        let (cfg, _) = ignition_config::parse(&raw).unwrap();
        assert_eq!(cfg.ignition.version, ignition_config::MAX_VERSION);
        // and state was persisted
        assert!(dir.join("state").exists());
    }

    #[test]
    fn test_non_fetch_stage_requires_cache() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let mut engine = engine_in(dir);
        let e = engine.run("disks").unwrap_err();
        assert!(format!("{e:#}").contains("fetch stage"), "{e:#}");
    }

    #[test]
    fn test_cached_config_used() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let mut engine = engine_in(dir);
        std::fs::write(
            dir.join("ignition.json"),
            br#"{"ignition": {"version": "3.1.0"}}"#,
        )
        .unwrap();
        // disks with an empty config is the documented fast path
        engine.run("disks").unwrap();
    }

    #[test]
    fn test_render_merges_data_url_reference() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let mut engine = engine_in(dir);
        // parent declares a file; child merges on top and adds another
        let parent = br#"{"ignition":{"version":"3.1.0"},"storage":{"files":[{"path":"/a"}]}}"#;
        let parent_url = format!(
            "data:;base64,{}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, parent)
        );
        let child = format!(
            r#"{{"ignition":{{"version":"3.1.0","config":{{"merge":[{{"source":"{parent_url}"}}]}}}},"storage":{{"files":[{{"path":"/b"}}]}}}}"#
        );
        let cfg = engine.render(child.as_bytes(), MAX_CONFIG_DEPTH).unwrap();
        let paths: Vec<&str> = cfg.storage.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/b"]);
        assert_eq!(engine.state.fetched_configs.len(), 1);
        assert!(engine.state.fetched_configs[0].referenced);
    }
}
