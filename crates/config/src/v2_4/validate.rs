use std::collections::HashSet;

use crate::errors::hash_parts;
use crate::path;
use crate::report::{Level, Report};

use super::types::*;

/// Validate a legacy config. Translation refuses configs whose report is
/// fatal or carries deprecation entries; warnings (the obsolete `create`
/// and `enable` fields, which translation still understands) pass.
pub fn validate(cfg: &Config) -> Report {
    let mut report = Report::default();

    let check_hash = |v: &Verification, ctx: Vec<crate::report::PathSegment>, report: &mut Report| {
        if let Some(hash) = &v.hash {
            if let Err(e) = hash_parts(hash) {
                report.add_fatal(ctx, e.to_string());
            }
        }
    };

    for (i, r) in cfg.ignition.config.append.iter().enumerate() {
        check_hash(
            &r.verification,
            path!["ignition", "config", "append", i],
            &mut report,
        );
    }
    if let Some(r) = &cfg.ignition.config.replace {
        check_hash(
            &r.verification,
            path!["ignition", "config", "replace"],
            &mut report,
        );
    }

    let mut fs_names = HashSet::new();
    for (i, fs) in cfg.storage.filesystems.iter().enumerate() {
        if fs.name.is_empty() {
            report.add_fatal(path!["storage", "filesystems", i, "name"], "name is required");
        }
        if !fs_names.insert(&fs.name) {
            report.add_fatal(
                path!["storage", "filesystems", i, "name"],
                format!("duplicate filesystem {:?}", fs.name),
            );
        }
        match (&fs.mount, &fs.path) {
            (Some(_), Some(_)) => report.add_fatal(
                path!["storage", "filesystems", i],
                "mount and path are mutually exclusive",
            ),
            (None, None) if fs.name != "root" => report.add_fatal(
                path!["storage", "filesystems", i],
                "one of mount or path is required",
            ),
            _ => {}
        }
        if let Some(m) = &fs.mount {
            if m.device.is_empty() {
                report.add_fatal(
                    path!["storage", "filesystems", i, "mount", "device"],
                    "device is required",
                );
            }
        }
    }

    for (i, f) in cfg.storage.files.iter().enumerate() {
        if !f.path.starts_with('/') {
            report.add_fatal(path!["storage", "files", i, "path"], "path must be absolute");
        }
        if f.filesystem.is_empty() {
            report.add_fatal(
                path!["storage", "files", i, "filesystem"],
                "filesystem is required",
            );
        }
        check_hash(
            &f.contents.verification,
            path!["storage", "files", i, "contents", "verification"],
            &mut report,
        );
    }
    for (i, d) in cfg.storage.directories.iter().enumerate() {
        if !d.path.starts_with('/') {
            report.add_fatal(
                path!["storage", "directories", i, "path"],
                "path must be absolute",
            );
        }
        if d.filesystem.is_empty() {
            report.add_fatal(
                path!["storage", "directories", i, "filesystem"],
                "filesystem is required",
            );
        }
    }
    for (i, l) in cfg.storage.links.iter().enumerate() {
        if !l.path.starts_with('/') {
            report.add_fatal(path!["storage", "links", i, "path"], "path must be absolute");
        }
        if l.filesystem.is_empty() {
            report.add_fatal(
                path!["storage", "links", i, "filesystem"],
                "filesystem is required",
            );
        }
        if l.target.is_empty() {
            report.add_fatal(path!["storage", "links", i, "target"], "target is required");
        }
    }

    for (i, disk) in cfg.storage.disks.iter().enumerate() {
        if disk.device.is_empty() {
            report.add_fatal(path!["storage", "disks", i, "device"], "device is required");
        }
        let mut numbers = HashSet::new();
        for (j, part) in disk.partitions.iter().enumerate() {
            if part.number != 0 && !numbers.insert(part.number) {
                report.add_fatal(
                    path!["storage", "disks", i, "partitions", j, "number"],
                    format!("duplicate partition number {}", part.number),
                );
            }
        }
    }

    for (i, u) in cfg.passwd.users.iter().enumerate() {
        if u.name.is_empty() {
            report.add_fatal(path!["passwd", "users", i, "name"], "name is required");
        }
        if u.create.is_some() {
            report.add(
                path!["passwd", "users", i, "create"],
                Level::Warning,
                "create is obsolete; use the flat user fields",
            );
        }
    }

    for (i, unit) in cfg.systemd.units.iter().enumerate() {
        if unit.name.is_empty() {
            report.add_fatal(path!["systemd", "units", i, "name"], "name is required");
        }
        if unit.enable {
            report.add(
                path!["systemd", "units", i, "enable"],
                Level::Warning,
                "enable is obsolete; use enabled",
            );
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_config() {
        let cfg = Config {
            ignition: Ignition {
                version: "2.4.0".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let r = validate(&cfg);
        assert!(!r.is_fatal() && !r.is_deprecated());
    }

    #[test]
    fn test_obsolete_fields_warn_not_reject() {
        let mut cfg = Config::default();
        cfg.passwd.users.push(PasswdUser {
            name: "core".into(),
            create: Some(UserCreate::default()),
            ..Default::default()
        });
        cfg.systemd.units.push(Unit {
            name: "a.service".into(),
            enable: true,
            ..Default::default()
        });
        let r = validate(&cfg);
        assert!(!r.is_fatal());
        assert!(!r.is_deprecated());
        assert_eq!(
            r.entries
                .iter()
                .filter(|e| e.level == Level::Warning)
                .count(),
            2
        );
    }

    #[test]
    fn test_relative_path_fatal() {
        let mut cfg = Config::default();
        cfg.storage.files.push(File {
            filesystem: "root".into(),
            path: "etc/passwd".into(),
            ..Default::default()
        });
        assert!(validate(&cfg).is_fatal());
    }

    #[test]
    fn test_mount_and_path_exclusive() {
        let mut cfg = Config::default();
        cfg.storage.filesystems.push(Filesystem {
            name: "data".into(),
            mount: Some(Mount {
                device: "/dev/sdb1".into(),
                ..Default::default()
            }),
            path: Some("/mnt".into()),
        });
        assert!(validate(&cfg).is_fatal());
    }
}
