//! Mechanical upgrade from the 3.0.0 schema. Fields added in 3.1
//! (proxy, HTTP headers, mount options, kargs, clean-except) come out
//! absent/empty.

use crate::v3_0 as prev;

use super::types::*;
use super::MAX_VERSION;

pub fn from_v3_0(old: prev::Config) -> Config {
    Config {
        ignition: Ignition {
            version: MAX_VERSION.to_owned(),
            config: IgnitionConfig {
                merge: old.ignition.config.merge.into_iter().map(resource).collect(),
                replace: old.ignition.config.replace.map(resource),
            },
            proxy: Proxy::default(),
            security: Security {
                tls: Tls {
                    certificate_authorities: old
                        .ignition
                        .security
                        .tls
                        .certificate_authorities
                        .into_iter()
                        .map(resource)
                        .collect(),
                },
            },
            timeouts: Timeouts {
                http_response_headers: old.ignition.timeouts.http_response_headers,
                http_total: old.ignition.timeouts.http_total,
            },
        },
        passwd: Passwd {
            users: old.passwd.users.into_iter().map(user).collect(),
            groups: old.passwd.groups.into_iter().map(group).collect(),
        },
        systemd: Systemd {
            units: old.systemd.units.into_iter().map(unit).collect(),
        },
        storage: Storage {
            disks: old.storage.disks.into_iter().map(disk).collect(),
            raid: old.storage.raid.into_iter().map(raid).collect(),
            filesystems: old.storage.filesystems.into_iter().map(filesystem).collect(),
            files: old.storage.files.into_iter().map(file).collect(),
            directories: old.storage.directories.into_iter().map(directory).collect(),
            links: old.storage.links.into_iter().map(link).collect(),
        },
        kargs: Kargs::default(),
    }
}

fn resource(old: prev::Resource) -> Resource {
    Resource {
        source: old.source,
        compression: old.compression,
        http_headers: Vec::new(),
        verification: Verification {
            hash: old.verification.hash,
        },
    }
}

fn user(old: prev::PasswdUser) -> PasswdUser {
    PasswdUser {
        name: old.name,
        password_hash: old.password_hash,
        ssh_authorized_keys: old.ssh_authorized_keys,
        uid: old.uid,
        gecos: old.gecos,
        home_dir: old.home_dir,
        no_create_home: old.no_create_home,
        primary_group: old.primary_group,
        groups: old.groups,
        no_user_group: old.no_user_group,
        no_log_init: old.no_log_init,
        shell: old.shell,
        system: old.system,
    }
}

fn group(old: prev::PasswdGroup) -> PasswdGroup {
    PasswdGroup {
        name: old.name,
        gid: old.gid,
        password_hash: old.password_hash,
        system: old.system,
    }
}

fn unit(old: prev::Unit) -> Unit {
    Unit {
        name: old.name,
        enabled: old.enabled,
        mask: old.mask,
        contents: old.contents,
        dropins: old
            .dropins
            .into_iter()
            .map(|d| Dropin {
                name: d.name,
                contents: d.contents,
            })
            .collect(),
    }
}

fn disk(old: prev::Disk) -> Disk {
    Disk {
        device: old.device,
        wipe_table: old.wipe_table,
        partitions: old
            .partitions
            .into_iter()
            .map(|p| Partition {
                number: p.number,
                label: p.label,
                size_mib: p.size_mib,
                start_mib: p.start_mib,
                type_guid: p.type_guid,
                guid: p.guid,
                wipe_partition_entry: p.wipe_partition_entry,
                should_exist: p.should_exist,
            })
            .collect(),
    }
}

fn raid(old: prev::Raid) -> Raid {
    Raid {
        name: old.name,
        level: old.level,
        devices: old.devices,
        spares: old.spares,
        options: old.options,
    }
}

fn filesystem(old: prev::Filesystem) -> Filesystem {
    Filesystem {
        device: old.device,
        format: old.format,
        path: old.path,
        label: old.label,
        uuid: old.uuid,
        wipe_filesystem: old.wipe_filesystem,
        options: old.options,
        mount_options: Vec::new(),
        clean_except: Vec::new(),
        create: None,
    }
}

fn node_user(old: prev::NodeUser) -> NodeUser {
    NodeUser {
        id: old.id,
        name: old.name,
    }
}

fn node_group(old: prev::NodeGroup) -> NodeGroup {
    NodeGroup {
        id: old.id,
        name: old.name,
    }
}

fn file(old: prev::File) -> File {
    File {
        path: old.path,
        user: node_user(old.user),
        group: node_group(old.group),
        overwrite: old.overwrite,
        contents: old.contents.map(resource),
        append: old.append.into_iter().map(resource).collect(),
        mode: old.mode,
    }
}

fn directory(old: prev::Directory) -> Directory {
    Directory {
        path: old.path,
        user: node_user(old.user),
        group: node_group(old.group),
        overwrite: old.overwrite,
        mode: old.mode,
    }
}

fn link(old: prev::Link) -> Link {
    Link {
        path: old.path,
        user: node_user(old.user),
        group: node_group(old.group),
        overwrite: old.overwrite,
        target: old.target,
        hard: old.hard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_bumps_version() {
        let old = prev::parse(br#"{"ignition": {"version": "3.0.0"}}"#).unwrap();
        let new = from_v3_0(old);
        assert_eq!(new.ignition.version, MAX_VERSION);
        assert!(super::super::validate(&new).is_empty());
    }

    #[test]
    fn test_upgrade_carries_storage() {
        let raw = br#"{
            "ignition": {"version": "3.0.0"},
            "storage": {"filesystems": [{"device": "/dev/vdb1", "format": "ext4", "path": "/var"}]}
        }"#;
        let old = prev::parse(raw).unwrap();
        let new = from_v3_0(old);
        let fs = &new.storage.filesystems[0];
        assert_eq!(fs.device, "/dev/vdb1");
        assert_eq!(fs.format.as_deref(), Some("ext4"));
        assert!(fs.mount_options.is_empty());
    }
}
