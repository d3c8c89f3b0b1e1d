//! Single-shot application of a config to a root, for use outside the
//! staged first-boot flow (container builds, debugging). Only the
//! sections that do not touch block devices or the boot loader can be
//! applied this way.

use anyhow::{bail, Result};
use camino::{Utf8Path, Utf8PathBuf};

use ignition_config::Config;

use crate::fetcher::Fetcher;
use crate::stages::{self, StageContext};
use crate::state::State;

#[derive(Debug)]
pub struct ApplyFlags {
    pub root: Utf8PathBuf,
    /// Skip sections apply cannot honor instead of failing on them.
    pub ignore_unsupported: bool,
    /// Refuse configs that reference remote resources.
    pub offline: bool,
}

/// The config sections apply has no business executing.
fn unsupported_sections(cfg: &Config) -> Vec<&'static str> {
    let mut out = Vec::new();
    if !cfg.storage.disks.is_empty() {
        out.push("storage.disks");
    }
    if !cfg.storage.raid.is_empty() {
        out.push("storage.raid");
    }
    if !cfg.storage.filesystems.is_empty() {
        out.push("storage.filesystems");
    }
    if !cfg.kargs.is_empty() {
        out.push("kargs");
    }
    out
}

fn remote_sources(cfg: &Config) -> Vec<&str> {
    cfg.storage
        .files
        .iter()
        .flat_map(|f| f.contents.iter().chain(f.append.iter()))
        .chain(&cfg.ignition.security.tls.certificate_authorities)
        .filter_map(|r| r.source.as_deref())
        .filter(|s| !s.starts_with("data:") && !s.starts_with('/'))
        .collect()
}

pub fn run(config: &Config, flags: &ApplyFlags, fetcher: &Fetcher) -> Result<()> {
    let unsupported = unsupported_sections(config);
    if !unsupported.is_empty() {
        if !flags.ignore_unsupported {
            bail!(
                "config sections unsupported by apply: {}",
                unsupported.join(", ")
            );
        }
        tracing::warn!("ignoring unsupported config sections: {}", unsupported.join(", "));
    }

    if flags.offline {
        let remote = remote_sources(config);
        if !remote.is_empty() {
            bail!("offline mode but config references remote resources: {remote:?}");
        }
    }

    let mut state = State::default();
    let mut ctx = StageContext {
        root: &flags.root,
        fetcher,
        need_net: Utf8Path::new("/run/ignition/neednet"),
        state: &mut state,
    };
    stages::get("files")
        .expect("files stage exists")
        .run(&mut ctx, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(raw: &str) -> Config {
        let (cfg, _) = ignition_config::parse(raw.as_bytes()).unwrap();
        cfg
    }

    #[test]
    fn test_unsupported_sections_detected() {
        let cfg = config(
            r#"{
            "ignition": {"version": "3.1.0"},
            "storage": {"disks": [{"device": "/dev/vda"}]},
            "kargs": {"shouldExist": ["quiet"]}
        }"#,
        );
        assert_eq!(unsupported_sections(&cfg), vec!["storage.disks", "kargs"]);
    }

    #[test]
    fn test_remote_sources() {
        let cfg = config(
            r#"{
            "ignition": {"version": "3.1.0"},
            "storage": {"files": [
                {"path": "/a", "contents": {"source": "data:,x"}},
                {"path": "/b", "contents": {"source": "https://example.com/b"}}
            ]}
        }"#,
        );
        assert_eq!(remote_sources(&cfg), vec!["https://example.com/b"]);
    }

    #[test]
    fn test_offline_refuses_remote() {
        let cfg = config(
            r#"{
            "ignition": {"version": "3.1.0"},
            "storage": {"files": [{"path": "/b", "contents": {"source": "https://example.com/b"}}]}
        }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let flags = ApplyFlags {
            root: Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap(),
            ignore_unsupported: false,
            offline: true,
        };
        let fetcher = Fetcher::new(true).unwrap();
        assert!(run(&cfg, &flags, &fetcher).is_err());
    }

    #[test]
    fn test_apply_files() {
        let cfg = config(
            r#"{
            "ignition": {"version": "3.1.0"},
            "storage": {"files": [{"path": "/etc/hostname", "contents": {"source": "data:,node1"}, "overwrite": true}]}
        }"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let flags = ApplyFlags {
            root: Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap(),
            ignore_unsupported: false,
            offline: true,
        };
        let fetcher = Fetcher::new(true).unwrap();
        run(&cfg, &flags, &fetcher).unwrap();
        let hostname = std::fs::read_to_string(dir.path().join("etc/hostname")).unwrap();
        assert_eq!(hostname, "node1");
    }
}
