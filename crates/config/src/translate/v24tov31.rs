//! Translation from the legacy 2.x schema to the current one.
//!
//! Legacy configs name their filesystems and express file paths relative
//! to them; the current schema has only absolute paths. The caller must
//! therefore supply a mapping from filesystem name to the absolute
//! mountpoint it will occupy (`root` is always `/`). Everything else is a
//! mechanical restructuring, with a handful of historical behaviors that
//! have to be preserved exactly for configs already in the field.

use std::collections::HashMap;

use ignition_utils::join_absolute;

use crate::errors::ConfigError;
use crate::v2_4 as old;
use crate::v3_1 as new;
use crate::v3_1::path_ancestors;

/// Mapping from legacy filesystem name to absolute mountpoint.
pub type FsMap = HashMap<String, String>;

fn with_root(mut fs_map: FsMap) -> FsMap {
    fs_map.insert("root".to_owned(), "/".to_owned());
    fs_map
}

/// Look up the mountpoint for a legacy filesystem name. Missing names
/// resolve to the empty mountpoint, i.e. the path stays as written;
/// declared filesystems are checked against the map up front.
fn mountpoint<'a>(fs_map: &'a FsMap, name: &str) -> &'a str {
    fs_map.get(name).map(String::as_str).unwrap_or("")
}

/// Return whether `cfg` is translatable, without translating. The same
/// checks gate [`translate`].
pub fn check(cfg: &old::Config, fs_map: &FsMap) -> Result<(), ConfigError> {
    let fs_map = &with_root(fs_map.clone());

    let report = old::validate(cfg);
    if report.is_fatal() || report.is_deprecated() {
        return Err(ConfigError::Invalid(report));
    }

    if !cfg.networkd.units.is_empty() {
        return Err(ConfigError::UsesNetworkd);
    }

    // every named filesystem needs a mountpoint for path rewriting
    for fs in &cfg.storage.filesystems {
        if !fs_map.contains_key(&fs.name) {
            return Err(ConfigError::UnmappedFilesystem(fs.name.clone()));
        }
        if let Some(mount) = &fs.mount {
            if let Some(create) = &mount.create {
                if !create.force {
                    return Err(ConfigError::CreateWithoutForce);
                }
            }
        }
    }

    // We are not allowed to write entries through links we also write.
    let links: Vec<String> = cfg
        .storage
        .links
        .iter()
        .map(|l| join_absolute(mountpoint(fs_map, &l.filesystem), &l.path))
        .collect();
    let uses_link = |path: &str| -> Option<String> {
        path_ancestors(path)
            .into_iter()
            .find(|a| links.contains(a))
    };

    // kind-qualified description per absolute path
    let mut entries: HashMap<String, String> = HashMap::new();
    let mut claim = |path: String, name: String| -> Result<(), ConfigError> {
        if let Some(old_name) = entries.get(&path) {
            return Err(ConfigError::DuplicateInode {
                old: old_name.clone(),
                new: name,
            });
        }
        if let Some(link) = uses_link(&path) {
            return Err(ConfigError::UsesOwnLink {
                link_path: link,
                name,
            });
        }
        entries.insert(path, name);
        Ok(())
    };

    for file in &cfg.storage.files {
        let path = join_absolute(mountpoint(fs_map, &file.filesystem), &file.path);
        claim(path.clone(), format!("File: {path}"))?;
    }
    for dir in &cfg.storage.directories {
        let path = join_absolute(mountpoint(fs_map, &dir.filesystem), &dir.path);
        claim(path.clone(), format!("Directory: {path}"))?;
    }
    for link in &cfg.storage.links {
        let path = join_absolute(mountpoint(fs_map, &link.filesystem), &link.path);
        claim(path.clone(), format!("Link: {path}"))?;
    }

    let mut unit_names = Vec::new();
    for unit in &cfg.systemd.units {
        if unit_names.contains(&&unit.name) {
            return Err(ConfigError::DuplicateUnit {
                name: unit.name.clone(),
            });
        }
        unit_names.push(&unit.name);
        let mut dropin_names = Vec::new();
        for dropin in &unit.dropins {
            if dropin_names.contains(&&dropin.name) {
                return Err(ConfigError::DuplicateDropin {
                    unit: unit.name.clone(),
                    name: dropin.name.clone(),
                });
            }
            dropin_names.push(&dropin.name);
        }
    }

    Ok(())
}

/// Translate a legacy config to the current schema.
pub fn translate(cfg: old::Config, fs_map: FsMap) -> Result<new::Config, ConfigError> {
    let fs_map = with_root(fs_map);
    check(&cfg, &fs_map)?;

    let res = new::Config {
        ignition: new::Ignition {
            version: new::MAX_VERSION.to_owned(),
            config: new::IgnitionConfig {
                merge: cfg
                    .ignition
                    .config
                    .append
                    .into_iter()
                    .map(cfg_ref)
                    .collect(),
                replace: cfg.ignition.config.replace.map(cfg_ref),
            },
            proxy: new::Proxy {
                http_proxy: str_p(cfg.ignition.proxy.http_proxy),
                https_proxy: str_p(cfg.ignition.proxy.https_proxy),
                no_proxy: cfg.ignition.proxy.no_proxy,
            },
            security: new::Security {
                tls: new::Tls {
                    certificate_authorities: cfg
                        .ignition
                        .security
                        .tls
                        .certificate_authorities
                        .into_iter()
                        .map(ca_ref)
                        .collect(),
                },
            },
            timeouts: new::Timeouts {
                http_response_headers: cfg.ignition.timeouts.http_response_headers,
                http_total: cfg.ignition.timeouts.http_total,
            },
        },
        passwd: new::Passwd {
            users: cfg.passwd.users.into_iter().map(user).collect(),
            groups: cfg.passwd.groups.into_iter().map(group).collect(),
        },
        systemd: new::Systemd {
            units: cfg.systemd.units.into_iter().map(unit).collect(),
        },
        storage: new::Storage {
            disks: cfg.storage.disks.into_iter().map(disk).collect(),
            raid: cfg.storage.raid.into_iter().map(raid).collect(),
            filesystems: cfg
                .storage
                .filesystems
                .into_iter()
                .filter_map(|f| filesystem(f, &fs_map))
                .collect(),
            files: cfg
                .storage
                .files
                .into_iter()
                .map(|f| file(f, &fs_map))
                .collect(),
            directories: cfg
                .storage
                .directories
                .into_iter()
                .map(|d| directory(d, &fs_map))
                .collect(),
            links: cfg
                .storage
                .links
                .into_iter()
                .map(|l| link(l, &fs_map))
                .collect(),
        },
        kargs: new::Kargs::default(),
    };

    let report = new::validate(&res);
    if report.is_fatal() {
        return Err(ConfigError::Invalid(report));
    }
    Ok(res)
}

/// Empty legacy strings meant "unset"; drop them rather than carrying
/// empty values into the new schema.
fn str_p(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Legacy false booleans likewise collapse to absent.
fn bool_p(b: bool) -> Option<bool> {
    if b {
        Some(true)
    } else {
        None
    }
}

fn int_p(i: i64) -> Option<i64> {
    if i == 0 {
        None
    } else {
        Some(i)
    }
}

fn http_headers(headers: Vec<old::HttpHeader>) -> Vec<new::HttpHeader> {
    headers
        .into_iter()
        .map(|h| new::HttpHeader {
            name: h.name,
            value: str_p(h.value),
        })
        .collect()
}

fn cfg_ref(r: old::ConfigReference) -> new::Resource {
    new::Resource {
        source: Some(r.source),
        compression: None,
        http_headers: http_headers(r.http_headers),
        verification: new::Verification {
            hash: r.verification.hash,
        },
    }
}

fn ca_ref(r: old::CaReference) -> new::Resource {
    new::Resource {
        source: Some(r.source),
        compression: None,
        http_headers: http_headers(r.http_headers),
        verification: new::Verification {
            hash: r.verification.hash,
        },
    }
}

fn user(u: old::PasswdUser) -> new::PasswdUser {
    let mut uid = u.uid;
    let mut gecos = u.gecos;
    let mut home_dir = u.home_dir;
    let mut no_create_home = u.no_create_home;
    let mut primary_group = u.primary_group;
    let mut groups = u.groups;
    let mut no_user_group = u.no_user_group;
    let mut no_log_init = u.no_log_init;
    let mut shell = u.shell;
    let mut system = u.system;

    // The obsolete nested create object supersedes the flat fields.
    if let Some(create) = u.create {
        uid = create.uid;
        gecos = create.gecos;
        home_dir = create.home_dir;
        no_create_home = create.no_create_home;
        primary_group = create.primary_group;
        groups = create.groups;
        no_user_group = create.no_user_group;
        no_log_init = create.no_log_init;
        shell = create.shell;
        system = create.system;
    }

    new::PasswdUser {
        name: u.name,
        password_hash: u.password_hash,
        ssh_authorized_keys: u.ssh_authorized_keys,
        uid,
        gecos: str_p(gecos),
        home_dir: str_p(home_dir),
        no_create_home: bool_p(no_create_home),
        primary_group: str_p(primary_group),
        groups,
        no_user_group: bool_p(no_user_group),
        no_log_init: bool_p(no_log_init),
        shell: str_p(shell),
        system: bool_p(system),
    }
}

fn group(g: old::PasswdGroup) -> new::PasswdGroup {
    new::PasswdGroup {
        name: g.name,
        gid: g.gid,
        password_hash: str_p(g.password_hash),
        system: bool_p(g.system),
    }
}

fn unit(u: old::Unit) -> new::Unit {
    // `enabled` wins over the obsolete `enable` boolean, and an explicit
    // enabled=false must stay an explicit false on output.
    let mut enabled = None;
    if u.enabled == Some(true) || u.enable {
        enabled = Some(true);
    }
    if u.enabled == Some(false) {
        enabled = Some(false);
    }
    new::Unit {
        name: u.name,
        enabled,
        mask: bool_p(u.mask),
        contents: str_p(u.contents),
        dropins: u
            .dropins
            .into_iter()
            .map(|d| new::Dropin {
                name: d.name,
                contents: str_p(d.contents),
            })
            .collect(),
    }
}

fn disk(d: old::Disk) -> new::Disk {
    new::Disk {
        device: d.device,
        wipe_table: bool_p(d.wipe_table),
        partitions: d
            .partitions
            .into_iter()
            .map(|p| new::Partition {
                label: p.label,
                number: p.number,
                size_mib: p.size_mib,
                start_mib: p.start_mib,
                type_guid: str_p(p.type_guid),
                guid: str_p(p.guid),
                wipe_partition_entry: bool_p(p.wipe_partition_entry),
                should_exist: p.should_exist,
            })
            .collect(),
    }
}

fn raid(r: old::Raid) -> new::Raid {
    new::Raid {
        name: r.name,
        level: r.level,
        devices: r.devices,
        spares: int_p(r.spares),
        options: r.options,
    }
}

fn filesystem(f: old::Filesystem, fs_map: &FsMap) -> Option<new::Filesystem> {
    if f.name == "root" {
        // root is implied
        return None;
    }
    let mount = f.mount.unwrap_or_default();

    let mut wipe = bool_p(mount.wipe_filesystem);
    let mut options = mount.options;

    // A create block means first-generation semantics: creation was
    // checked to be forced, which maps onto wiping, and its options fold
    // into the one options list the new schema has.
    if let Some(create) = mount.create {
        wipe = bool_p(create.force);
        options.extend(create.options);
    }

    let mut format = mount.format;
    // Filesystems named "oem" were btrfs on every deployed machine that
    // never asked for a wipe; existing configs rely on that default.
    if f.name == "oem" && wipe != Some(true) {
        format = "btrfs".to_owned();
    }

    Some(new::Filesystem {
        device: mount.device,
        format: str_p(format),
        wipe_filesystem: wipe,
        label: mount.label,
        uuid: mount.uuid,
        options,
        mount_options: Vec::new(),
        clean_except: Vec::new(),
        create: None,
        path: str_p(fs_map.get(&f.name).cloned().unwrap_or_default()),
    })
}

fn node_user(u: Option<old::NodeUser>) -> new::NodeUser {
    let u = u.unwrap_or_default();
    new::NodeUser {
        id: u.id,
        name: str_p(u.name),
    }
}

fn node_group(g: Option<old::NodeGroup>) -> new::NodeGroup {
    let g = g.unwrap_or_default();
    new::NodeGroup {
        id: g.id,
        name: str_p(g.name),
    }
}

fn file(f: old::File, fs_map: &FsMap) -> new::File {
    let mount = mountpoint(fs_map, &f.filesystem);
    // 2.x files overwrite by default; but appending entries must come
    // out with an explicit overwrite=false to stay valid.
    let mut overwrite = f.overwrite.or(Some(true));
    if f.append {
        overwrite = Some(false);
    }

    let contents = new::Resource {
        compression: str_p(f.contents.compression),
        source: Some(f.contents.source),
        http_headers: http_headers(f.contents.http_headers),
        verification: new::Verification {
            hash: f.contents.verification.hash,
        },
    };

    let (contents, append) = if f.append {
        (None, vec![contents])
    } else {
        (Some(contents), Vec::new())
    };

    new::File {
        path: join_absolute(mount, &f.path),
        user: node_user(f.user),
        group: node_group(f.group),
        overwrite,
        contents,
        append,
        mode: f.mode,
    }
}

fn directory(d: old::Directory, fs_map: &FsMap) -> new::Directory {
    new::Directory {
        path: join_absolute(mountpoint(fs_map, &d.filesystem), &d.path),
        user: node_user(d.user),
        group: node_group(d.group),
        overwrite: d.overwrite,
        mode: d.mode,
    }
}

fn link(l: old::Link, fs_map: &FsMap) -> new::Link {
    new::Link {
        path: join_absolute(mountpoint(fs_map, &l.filesystem), &l.path),
        user: node_user(l.user),
        group: node_group(l.group),
        overwrite: l.overwrite,
        target: Some(l.target),
        hard: bool_p(l.hard),
    }
}

/// Remove duplicate files, units, and users from a legacy config before
/// translation, newest entry winning. Works only on configs where every
/// file lives on the root filesystem and nothing appends: anything else
/// has ordering semantics deduplication would destroy. Dropin lists of
/// duplicate units are unioned into the kept unit (existing names win);
/// authorized keys of duplicate users are concatenated onto the kept one.
pub fn deduplicate(mut cfg: old::Config) -> Result<old::Config, ConfigError> {
    let files = std::mem::take(&mut cfg.storage.files);
    let units = std::mem::take(&mut cfg.systemd.units);
    let users = std::mem::take(&mut cfg.passwd.users);

    let mut out_files: Vec<old::File> = Vec::new();
    let mut seen_paths = std::collections::HashSet::new();
    for f in files.into_iter().rev() {
        if f.filesystem != "root" {
            return Err(ConfigError::Dedup(
                "cannot dedupe set of files on non-root filesystem".into(),
            ));
        }
        if f.append {
            return Err(ConfigError::Dedup(
                "cannot dedupe set of files that contains appendices".into(),
            ));
        }
        if seen_paths.insert(f.path.clone()) {
            out_files.push(f);
        }
    }

    let mut out_units: Vec<old::Unit> = Vec::new();
    let mut seen_units = std::collections::HashSet::new();
    for u in units.into_iter().rev() {
        if seen_units.insert(u.name.clone()) {
            out_units.push(u);
        } else if !u.dropins.is_empty() {
            // union this older unit's dropins into the kept revision
            let kept = out_units
                .iter_mut()
                .find(|k| k.name == u.name)
                .expect("seen unit is in output");
            for dropin in u.dropins {
                if !kept.dropins.iter().any(|d| d.name == dropin.name) {
                    kept.dropins.push(dropin);
                }
            }
        }
    }

    let mut out_users: Vec<old::PasswdUser> = Vec::new();
    let mut seen_users = std::collections::HashSet::new();
    for u in users.into_iter().rev() {
        if seen_users.insert(u.name.clone()) {
            out_users.push(u);
        } else {
            // only the keys of an older duplicate survive
            let kept = out_users
                .iter_mut()
                .find(|k| k.name == u.name)
                .expect("seen user is in output");
            kept.ssh_authorized_keys.extend(u.ssh_authorized_keys);
        }
    }

    cfg.storage.files = out_files;
    cfg.systemd.units = out_units;
    cfg.passwd.users = out_users;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs_map(pairs: &[(&str, &str)]) -> FsMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parse24(raw: &str) -> old::Config {
        old::parse(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_translate_non_root_filesystem() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {
                "filesystems": [{"name": "data", "mount": {"device": "/dev/sdb1", "format": "ext4"}}],
                "files": [{"filesystem": "data", "path": "/x", "contents": {"source": "data:,hi"}}]
            }
        }"#,
        );
        let new = translate(cfg, fs_map(&[("data", "/mnt/data")])).unwrap();
        assert_eq!(new.ignition.version, "3.1.0");
        assert_eq!(new.storage.filesystems[0].path.as_deref(), Some("/mnt/data"));
        assert_eq!(new.storage.filesystems[0].format.as_deref(), Some("ext4"));
        assert_eq!(new.storage.files[0].path, "/mnt/data/x");
        assert_eq!(
            new.storage.files[0]
                .contents
                .as_ref()
                .unwrap()
                .source
                .as_deref(),
            Some("data:,hi")
        );
    }

    #[test]
    fn test_unmapped_filesystem_fails_then_succeeds() {
        let raw = r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {
                "filesystems": [{"name": "var", "mount": {"device": "/dev/sdb1", "format": "xfs"}}]
            }
        }"#;
        let e = translate(parse24(raw), FsMap::new()).unwrap_err();
        assert!(matches!(e, ConfigError::UnmappedFilesystem(name) if name == "var"));
        translate(parse24(raw), fs_map(&[("var", "/var")])).unwrap();
    }

    #[test]
    fn test_duplicate_inode_across_kinds() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {
                "files": [{"filesystem": "root", "path": "/a"}],
                "directories": [{"filesystem": "root", "path": "/a"}]
            }
        }"#,
        );
        let e = translate(cfg, FsMap::new()).unwrap_err();
        match e {
            ConfigError::DuplicateInode { old, new } => {
                assert_eq!(old, "File: /a");
                assert_eq!(new, "Directory: /a");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_file_under_own_link() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {
                "links": [{"filesystem": "root", "path": "/l", "target": "/t"}],
                "files": [{"filesystem": "root", "path": "/l/x"}]
            }
        }"#,
        );
        let e = translate(cfg, FsMap::new()).unwrap_err();
        match e {
            ConfigError::UsesOwnLink { link_path, name } => {
                assert_eq!(link_path, "/l");
                assert_eq!(name, "File: /l/x");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_link_to_itself_is_not_uses_own_link() {
        // equality is a duplicate, not a link traversal
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {
                "links": [{"filesystem": "root", "path": "/l", "target": "/t"}],
                "files": [{"filesystem": "root", "path": "/l"}]
            }
        }"#,
        );
        let e = translate(cfg, FsMap::new()).unwrap_err();
        assert!(matches!(e, ConfigError::DuplicateInode { .. }));
    }

    #[test]
    fn test_enabled_wins_over_enable() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "systemd": {"units": [{"name": "a.service", "enable": true, "enabled": false}]}
        }"#,
        );
        let new = translate(cfg, FsMap::new()).unwrap();
        assert_eq!(new.systemd.units[0].enabled, Some(false));
    }

    #[test]
    fn test_enable_alone_enables() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "systemd": {"units": [{"name": "a.service", "enable": true}]}
        }"#,
        );
        let new = translate(cfg, FsMap::new()).unwrap();
        assert_eq!(new.systemd.units[0].enabled, Some(true));
    }

    #[test]
    fn test_networkd_rejected() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "networkd": {"units": [{"name": "00-eth0.network", "contents": "[Match]"}]}
        }"#,
        );
        let e = translate(cfg, FsMap::new()).unwrap_err();
        assert!(matches!(e, ConfigError::UsesNetworkd));
    }

    #[test]
    fn test_duplicate_units_and_dropins() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "systemd": {"units": [
                {"name": "a.service"},
                {"name": "a.service"}
            ]}
        }"#,
        );
        let e = translate(cfg, FsMap::new()).unwrap_err();
        assert!(matches!(e, ConfigError::DuplicateUnit { name } if name == "a.service"));

        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "systemd": {"units": [
                {"name": "a.service", "dropins": [{"name": "x.conf"}, {"name": "x.conf"}]}
            ]}
        }"#,
        );
        let e = translate(cfg, FsMap::new()).unwrap_err();
        assert!(
            matches!(e, ConfigError::DuplicateDropin { unit, name } if unit == "a.service" && name == "x.conf")
        );
    }

    #[test]
    fn test_create_requires_force() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {
                "filesystems": [{"name": "data", "mount": {"device": "/dev/sdb1", "format": "ext4", "create": {}}}]
            }
        }"#,
        );
        let e = translate(cfg, fs_map(&[("data", "/mnt/data")])).unwrap_err();
        assert!(matches!(e, ConfigError::CreateWithoutForce));
    }

    #[test]
    fn test_create_folds_into_wipe_and_options() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {
                "filesystems": [{"name": "data", "mount": {
                    "device": "/dev/sdb1", "format": "ext4",
                    "options": ["-b", "1024"],
                    "create": {"force": true, "options": ["-m", "0"]}
                }}]
            }
        }"#,
        );
        let new = translate(cfg, fs_map(&[("data", "/mnt/data")])).unwrap();
        let fs = &new.storage.filesystems[0];
        assert_eq!(fs.wipe_filesystem, Some(true));
        assert_eq!(fs.options, vec!["-b", "1024", "-m", "0"]);
    }

    #[test]
    fn test_oem_defaults_to_btrfs() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {
                "filesystems": [{"name": "oem", "mount": {"device": "/dev/sda6", "format": "ext4"}}]
            }
        }"#,
        );
        let new = translate(cfg, fs_map(&[("oem", "/usr/share/oem")])).unwrap();
        assert_eq!(new.storage.filesystems[0].format.as_deref(), Some("btrfs"));

        // an explicit wipe keeps the declared format
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {
                "filesystems": [{"name": "oem", "mount": {"device": "/dev/sda6", "format": "ext4", "wipeFilesystem": true}}]
            }
        }"#,
        );
        let new = translate(cfg, fs_map(&[("oem", "/usr/share/oem")])).unwrap();
        assert_eq!(new.storage.filesystems[0].format.as_deref(), Some("ext4"));
    }

    #[test]
    fn test_root_filesystem_elided() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {"filesystems": [{"name": "root"}]}
        }"#,
        );
        let new = translate(cfg, FsMap::new()).unwrap();
        assert!(new.storage.filesystems.is_empty());
    }

    #[test]
    fn test_user_create_supersedes() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "passwd": {"users": [{
                "name": "core", "shell": "/bin/bash", "uid": 1000,
                "create": {"shell": "/bin/zsh", "groups": ["wheel"]}
            }]}
        }"#,
        );
        let new = translate(cfg, FsMap::new()).unwrap();
        let u = &new.passwd.users[0];
        assert_eq!(u.shell.as_deref(), Some("/bin/zsh"));
        assert_eq!(u.uid, None);
        assert_eq!(u.groups, vec!["wheel"]);
    }

    #[test]
    fn test_append_file_translates_to_append_resource() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {"files": [{
                "filesystem": "root", "path": "/etc/motd",
                "append": true, "contents": {"source": "data:,hey"}
            }]}
        }"#,
        );
        let new = translate(cfg, FsMap::new()).unwrap();
        let f = &new.storage.files[0];
        assert!(f.contents.is_none());
        assert_eq!(f.append.len(), 1);
        assert_eq!(f.overwrite, Some(false));
    }

    #[test]
    fn test_dedup_files_last_wins() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {"files": [
                {"filesystem": "root", "path": "/a", "contents": {"source": "data:,old"}},
                {"filesystem": "root", "path": "/a", "contents": {"source": "data:,new"}}
            ]}
        }"#,
        );
        let out = deduplicate(cfg).unwrap();
        assert_eq!(out.storage.files.len(), 1);
        assert_eq!(out.storage.files[0].contents.source, "data:,new");
    }

    #[test]
    fn test_dedup_rejects_non_root_and_appendices() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {"files": [{"filesystem": "data", "path": "/a"}]}
        }"#,
        );
        assert!(matches!(deduplicate(cfg), Err(ConfigError::Dedup(_))));

        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "storage": {"files": [{"filesystem": "root", "path": "/a", "append": true}]}
        }"#,
        );
        assert!(matches!(deduplicate(cfg), Err(ConfigError::Dedup(_))));
    }

    #[test]
    fn test_dedup_units_union_dropins() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "systemd": {"units": [
                {"name": "a.service", "contents": "old", "dropins": [
                    {"name": "x.conf", "contents": "older x"},
                    {"name": "y.conf", "contents": "y"}
                ]},
                {"name": "a.service", "contents": "new", "dropins": [
                    {"name": "x.conf", "contents": "newer x"}
                ]}
            ]}
        }"#,
        );
        let out = deduplicate(cfg).unwrap();
        assert_eq!(out.systemd.units.len(), 1);
        let unit = &out.systemd.units[0];
        assert_eq!(unit.contents, "new");
        // the kept revision's dropin wins; the older unit's y.conf joins it
        assert_eq!(unit.dropins.len(), 2);
        assert_eq!(unit.dropins[0].name, "x.conf");
        assert_eq!(unit.dropins[0].contents, "newer x");
        assert_eq!(unit.dropins[1].name, "y.conf");
    }

    #[test]
    fn test_dedup_users_concat_keys() {
        let cfg = parse24(
            r#"{
            "ignition": {"version": "2.4.0"},
            "passwd": {"users": [
                {"name": "core", "sshAuthorizedKeys": ["key-old"], "shell": "/bin/sh"},
                {"name": "core", "sshAuthorizedKeys": ["key-new"]}
            ]}
        }"#,
        );
        let out = deduplicate(cfg).unwrap();
        assert_eq!(out.passwd.users.len(), 1);
        let u = &out.passwd.users[0];
        // newest entry is the base; older entries only contribute keys
        assert_eq!(u.shell, "");
        assert_eq!(u.ssh_authorized_keys, vec!["key-new", "key-old"]);
    }
}
