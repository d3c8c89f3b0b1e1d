use std::collections::{HashMap, HashSet};

use crate::errors::hash_parts;
use crate::path;
use crate::report::{Level, PathSegment, Report};

use super::types::*;
use super::MAX_VERSION;

/// All the proper ancestor paths of `p`, longest first, excluding "/".
/// `/a/b/c` yields `/a/b` then `/a`.
pub(crate) fn path_ancestors(p: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = p.trim_end_matches('/');
    while let Some(idx) = cur.rfind('/') {
        if idx == 0 {
            break;
        }
        cur = &cur[..idx];
        out.push(cur.to_owned());
    }
    out
}

fn check_resource(r: &Resource, path: Vec<PathSegment>, report: &mut Report) {
    if let Some(hash) = &r.verification.hash {
        if let Err(e) = hash_parts(hash) {
            let mut p = path.clone();
            p.push(PathSegment::Field("verification"));
            p.push(PathSegment::Field("hash"));
            report.add_fatal(p, e.to_string());
        }
    }
    if let Some(c) = &r.compression {
        if !matches!(c.as_str(), "" | "gzip") {
            let mut p = path;
            p.push(PathSegment::Field("compression"));
            report.add_fatal(p, format!("unsupported compression {c:?}"));
        }
    }
}

/// Structurally validate a parsed config. The config may only be used if
/// the returned report has no fatal entries.
pub fn validate(cfg: &Config) -> Report {
    let mut report = Report::default();

    if cfg.ignition.version != MAX_VERSION {
        report.add_fatal(
            path!["ignition", "version"],
            format!("version must be {MAX_VERSION}"),
        );
    }

    for (i, r) in cfg.ignition.config.merge.iter().enumerate() {
        check_resource(r, path!["ignition", "config", "merge", i], &mut report);
    }
    if let Some(r) = &cfg.ignition.config.replace {
        check_resource(r, path!["ignition", "config", "replace"], &mut report);
    }
    for (i, r) in cfg
        .ignition
        .security
        .tls
        .certificate_authorities
        .iter()
        .enumerate()
    {
        check_resource(
            r,
            path!["ignition", "security", "tls", "certificateAuthorities", i],
            &mut report,
        );
    }

    validate_storage(&cfg.storage, &mut report);
    validate_systemd(&cfg.systemd, &mut report);
    validate_passwd(&cfg.passwd, &mut report);

    report
}

fn validate_passwd(passwd: &Passwd, report: &mut Report) {
    let mut seen = HashSet::new();
    for (i, u) in passwd.users.iter().enumerate() {
        if u.name.is_empty() {
            report.add_fatal(path!["passwd", "users", i, "name"], "name is required");
        }
        if !seen.insert(&u.name) {
            report.add_fatal(
                path!["passwd", "users", i, "name"],
                format!("duplicate user {:?}", u.name),
            );
        }
    }
    let mut seen = HashSet::new();
    for (i, g) in passwd.groups.iter().enumerate() {
        if g.name.is_empty() {
            report.add_fatal(path!["passwd", "groups", i, "name"], "name is required");
        }
        if !seen.insert(&g.name) {
            report.add_fatal(
                path!["passwd", "groups", i, "name"],
                format!("duplicate group {:?}", g.name),
            );
        }
    }
}

fn validate_systemd(systemd: &Systemd, report: &mut Report) {
    let mut unit_names = HashSet::new();
    for (i, unit) in systemd.units.iter().enumerate() {
        if unit.name.is_empty() {
            report.add_fatal(path!["systemd", "units", i, "name"], "name is required");
        }
        if !unit_names.insert(&unit.name) {
            report.add_fatal(
                path!["systemd", "units", i, "name"],
                format!("duplicate unit {:?}", unit.name),
            );
        }
        let mut dropin_names = HashSet::new();
        for (j, dropin) in unit.dropins.iter().enumerate() {
            if !dropin_names.insert(&dropin.name) {
                report.add_fatal(
                    path!["systemd", "units", i, "dropins", j, "name"],
                    format!("duplicate dropin {:?} in unit {:?}", dropin.name, unit.name),
                );
            }
        }
    }
}

fn validate_storage(storage: &Storage, report: &mut Report) {
    let mut disk_devices = HashSet::new();
    for (i, disk) in storage.disks.iter().enumerate() {
        if disk.device.is_empty() {
            report.add_fatal(path!["storage", "disks", i, "device"], "device is required");
        }
        if !disk_devices.insert(&disk.device) {
            report.add_fatal(
                path!["storage", "disks", i, "device"],
                format!("duplicate disk {:?}", disk.device),
            );
        }
        let mut numbers = HashSet::new();
        for (j, part) in disk.partitions.iter().enumerate() {
            // 0 means "next available" and may repeat
            if part.number != 0 && !numbers.insert(part.number) {
                report.add_fatal(
                    path!["storage", "disks", i, "partitions", j, "number"],
                    format!("duplicate partition number {}", part.number),
                );
            }
        }
    }

    let mut raid_names = HashSet::new();
    for (i, raid) in storage.raid.iter().enumerate() {
        if raid.name.is_empty() {
            report.add_fatal(path!["storage", "raid", i, "name"], "name is required");
        }
        if !raid_names.insert(&raid.name) {
            report.add_fatal(
                path!["storage", "raid", i, "name"],
                format!("duplicate raid array {:?}", raid.name),
            );
        }
        if raid.devices.is_empty() {
            report.add_fatal(path!["storage", "raid", i, "devices"], "devices is required");
        }
    }

    let mut fs_devices = HashSet::new();
    for (i, fs) in storage.filesystems.iter().enumerate() {
        if fs.device.is_empty() {
            report.add_fatal(
                path!["storage", "filesystems", i, "device"],
                "device is required",
            );
        }
        if !fs_devices.insert(&fs.device) {
            report.add_fatal(
                path!["storage", "filesystems", i, "device"],
                format!("duplicate filesystem {:?}", fs.device),
            );
        }
        match &fs.format {
            Some(f) if !FILESYSTEM_FORMATS.contains(&f.as_str()) => {
                report.add_fatal(
                    path!["storage", "filesystems", i, "format"],
                    format!("unsupported filesystem format {f:?}"),
                );
            }
            _ => {}
        }
        if let Some(p) = &fs.path {
            if !p.starts_with('/') {
                report.add_fatal(
                    path!["storage", "filesystems", i, "path"],
                    "path must be absolute",
                );
            }
        }
        if fs.create.is_some() {
            report.add(
                path!["storage", "filesystems", i, "create"],
                Level::Warning,
                "create is obsolete; use wipeFilesystem and options",
            );
        }
    }

    validate_nodes(storage, report);
}

fn check_node_path(
    path_str: &str,
    desc: &str,
    ctx: Vec<PathSegment>,
    entries: &HashMap<String, String>,
    link_paths: &HashSet<String>,
    report: &mut Report,
) -> bool {
    if !path_str.starts_with('/') {
        report.add_fatal(ctx, "path must be absolute");
        return false;
    }
    if let Some(old) = entries.get(path_str) {
        report.add_fatal(ctx, format!("path conflicts with {old}"));
        return false;
    }
    for ancestor in path_ancestors(path_str) {
        if link_paths.contains(&ancestor) {
            report.add_fatal(
                ctx,
                format!("{desc} uses link {ancestor:?} defined by this config"),
            );
            return false;
        }
    }
    true
}

fn validate_nodes(storage: &Storage, report: &mut Report) {
    // kind-qualified description per path, for duplicate diagnostics
    let mut entries: HashMap<String, String> = HashMap::new();
    let link_paths: HashSet<String> = storage.links.iter().map(|l| l.path.clone()).collect();

    for (i, f) in storage.files.iter().enumerate() {
        if f.contents.is_some() && !f.append.is_empty() {
            report.add_fatal(
                path!["storage", "files", i],
                "contents and append are mutually exclusive",
            );
        }
        if !f.append.is_empty() && f.overwrite == Some(true) {
            report.add_fatal(
                path!["storage", "files", i, "overwrite"],
                "overwrite must be false if append is used",
            );
        }
        if let Some(c) = &f.contents {
            check_resource(c, path!["storage", "files", i, "contents"], report);
        }
        for (j, a) in f.append.iter().enumerate() {
            check_resource(a, path!["storage", "files", i, "append", j], report);
        }
        let desc = format!("File: {}", f.path);
        if check_node_path(
            &f.path,
            &desc,
            path!["storage", "files", i, "path"],
            &entries,
            &link_paths,
            report,
        ) {
            entries.insert(f.path.clone(), desc);
        }
    }
    for (i, d) in storage.directories.iter().enumerate() {
        let desc = format!("Directory: {}", d.path);
        if check_node_path(
            &d.path,
            &desc,
            path!["storage", "directories", i, "path"],
            &entries,
            &link_paths,
            report,
        ) {
            entries.insert(d.path.clone(), desc);
        }
    }
    for (i, l) in storage.links.iter().enumerate() {
        if l.target.as_deref().unwrap_or("").is_empty() {
            report.add_fatal(path!["storage", "links", i, "target"], "target is required");
        }
        let desc = format!("Link: {}", l.path);
        if check_node_path(
            &l.path,
            &desc,
            path!["storage", "links", i, "path"],
            &entries,
            &link_paths,
            report,
        ) {
            entries.insert(l.path.clone(), desc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            ignition: Ignition {
                version: MAX_VERSION.to_owned(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_path_ancestors() {
        assert_eq!(path_ancestors("/a/b/c"), vec!["/a/b", "/a"]);
        assert_eq!(path_ancestors("/a"), Vec::<String>::new());
        assert_eq!(path_ancestors("/"), Vec::<String>::new());
    }

    #[test]
    fn test_wrong_version() {
        let mut cfg = base();
        cfg.ignition.version = "3.9.0".into();
        assert!(validate(&cfg).is_fatal());
    }

    #[test]
    fn test_duplicate_nodes_fatal() {
        let mut cfg = base();
        cfg.storage.files.push(File {
            path: "/a".into(),
            ..Default::default()
        });
        cfg.storage.directories.push(Directory {
            path: "/a".into(),
            ..Default::default()
        });
        let r = validate(&cfg);
        assert!(r.is_fatal());
        assert!(r.to_string().contains("File: /a"), "{r}");
    }

    #[test]
    fn test_file_under_own_link() {
        let mut cfg = base();
        cfg.storage.links.push(Link {
            path: "/l".into(),
            target: Some("/t".into()),
            ..Default::default()
        });
        cfg.storage.files.push(File {
            path: "/l/x".into(),
            ..Default::default()
        });
        assert!(validate(&cfg).is_fatal());
    }

    #[test]
    fn test_append_overwrite_conflict() {
        let mut cfg = base();
        cfg.storage.files.push(File {
            path: "/a".into(),
            append: vec![Resource::default()],
            overwrite: Some(true),
            ..Default::default()
        });
        assert!(validate(&cfg).is_fatal());
    }

    #[test]
    fn test_contents_append_exclusive() {
        let mut cfg = base();
        cfg.storage.files.push(File {
            path: "/a".into(),
            contents: Some(Resource::default()),
            append: vec![Resource::default()],
            ..Default::default()
        });
        assert!(validate(&cfg).is_fatal());
    }

    #[test]
    fn test_partition_numbers() {
        let mut cfg = base();
        cfg.storage.disks.push(Disk {
            device: "/dev/vda".into(),
            partitions: vec![
                Partition {
                    number: 1,
                    ..Default::default()
                },
                Partition {
                    number: 1,
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        assert!(validate(&cfg).is_fatal());

        // zero repeats freely
        let mut cfg = base();
        cfg.storage.disks.push(Disk {
            device: "/dev/vda".into(),
            partitions: vec![Partition::default(), Partition::default()],
            ..Default::default()
        });
        assert!(!validate(&cfg).is_fatal());
    }

    #[test]
    fn test_bad_format() {
        let mut cfg = base();
        cfg.storage.filesystems.push(Filesystem {
            device: "/dev/vdb1".into(),
            format: Some("zfs".into()),
            ..Default::default()
        });
        assert!(validate(&cfg).is_fatal());
    }

    #[test]
    fn test_bad_hash_is_fatal() {
        let mut cfg = base();
        cfg.storage.files.push(File {
            path: "/a".into(),
            contents: Some(Resource {
                source: Some("data:,hi".into()),
                verification: Verification {
                    hash: Some("sha256:beef".into()),
                },
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(validate(&cfg).is_fatal());
    }
}
