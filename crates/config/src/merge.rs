//! Deep, field-aware merging of a parent config with a child overlay.
//!
//! Scalars take the child's value when the child provides one. Sequences
//! with an identifying key merge element-wise on that key, recursing into
//! matching pairs; unmatched elements concatenate parent-first. Purely
//! positional sequences (config references, certificate authorities,
//! append resources) concatenate. Unkeyed scalar lists are replaced
//! wholesale when the child provides a non-empty one.
//!
//! `replace` semantics are not handled here: the engine decides between
//! replace and merge before this is ever called.

use crate::v3_1::*;

pub trait Merge: Sized {
    /// Combine `self` (the parent) with `child`, child winning where
    /// both speak.
    fn merge(self, child: Self) -> Self;
}

/// Child-wins for scalar options.
fn opt<T>(parent: Option<T>, child: Option<T>) -> Option<T> {
    child.or(parent)
}

/// Recursive merge for nested option structures.
fn opt_merge<T: Merge>(parent: Option<T>, child: Option<T>) -> Option<T> {
    match (parent, child) {
        (Some(p), Some(c)) => Some(p.merge(c)),
        (p, c) => c.or(p),
    }
}

/// Non-empty string wins; legacy plain strings treat empty as unset.
fn string(parent: String, child: String) -> String {
    if child.is_empty() {
        parent
    } else {
        child
    }
}

/// Child-wins for unkeyed scalar lists, when the child has one at all.
fn list<T>(parent: Vec<T>, child: Vec<T>) -> Vec<T> {
    if child.is_empty() {
        parent
    } else {
        child
    }
}

fn concat<T>(mut parent: Vec<T>, child: Vec<T>) -> Vec<T> {
    parent.extend(child);
    parent
}

/// Merge two keyed sequences: pairs with equal keys merge recursively in
/// the parent's position; child-only elements append in order. A `None`
/// key never matches anything.
fn keyed<T: Merge, K: PartialEq>(
    parent: Vec<T>,
    child: Vec<T>,
    key: impl Fn(&T) -> Option<K>,
) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(parent.len() + child.len());
    let mut child: Vec<Option<T>> = child.into_iter().map(Some).collect();
    for p in parent {
        let pk = key(&p);
        let matched = pk.as_ref().and_then(|pk| {
            child
                .iter_mut()
                .find(|c| c.as_ref().and_then(&key).as_ref() == Some(pk))
        });
        match matched {
            Some(slot) => {
                let c = slot.take().expect("matched child present");
                out.push(p.merge(c));
            }
            None => out.push(p),
        }
    }
    out.extend(child.into_iter().flatten());
    out
}

impl Merge for Config {
    fn merge(self, child: Self) -> Self {
        Config {
            ignition: self.ignition.merge(child.ignition),
            passwd: self.passwd.merge(child.passwd),
            storage: self.storage.merge(child.storage),
            systemd: self.systemd.merge(child.systemd),
            kargs: self.kargs.merge(child.kargs),
        }
    }
}

impl Merge for Ignition {
    fn merge(self, child: Self) -> Self {
        Ignition {
            version: string(self.version, child.version),
            config: IgnitionConfig {
                merge: concat(self.config.merge, child.config.merge),
                replace: opt_merge(self.config.replace, child.config.replace),
            },
            proxy: Proxy {
                http_proxy: opt(self.proxy.http_proxy, child.proxy.http_proxy),
                https_proxy: opt(self.proxy.https_proxy, child.proxy.https_proxy),
                no_proxy: list(self.proxy.no_proxy, child.proxy.no_proxy),
            },
            security: Security {
                tls: Tls {
                    certificate_authorities: concat(
                        self.security.tls.certificate_authorities,
                        child.security.tls.certificate_authorities,
                    ),
                },
            },
            timeouts: Timeouts {
                http_response_headers: opt(
                    self.timeouts.http_response_headers,
                    child.timeouts.http_response_headers,
                ),
                http_total: opt(self.timeouts.http_total, child.timeouts.http_total),
            },
        }
    }
}

impl Merge for Resource {
    fn merge(self, child: Self) -> Self {
        Resource {
            source: opt(self.source, child.source),
            compression: opt(self.compression, child.compression),
            http_headers: keyed(self.http_headers, child.http_headers, |h| {
                Some(h.name.clone())
            }),
            verification: Verification {
                hash: opt(self.verification.hash, child.verification.hash),
            },
        }
    }
}

impl Merge for HttpHeader {
    fn merge(self, child: Self) -> Self {
        HttpHeader {
            name: self.name,
            value: opt(self.value, child.value),
        }
    }
}

impl Merge for Passwd {
    fn merge(self, child: Self) -> Self {
        Passwd {
            users: keyed(self.users, child.users, |u| Some(u.name.clone())),
            groups: keyed(self.groups, child.groups, |g| Some(g.name.clone())),
        }
    }
}

impl Merge for PasswdUser {
    fn merge(self, child: Self) -> Self {
        PasswdUser {
            name: self.name,
            password_hash: opt(self.password_hash, child.password_hash),
            ssh_authorized_keys: list(self.ssh_authorized_keys, child.ssh_authorized_keys),
            uid: opt(self.uid, child.uid),
            gecos: opt(self.gecos, child.gecos),
            home_dir: opt(self.home_dir, child.home_dir),
            no_create_home: opt(self.no_create_home, child.no_create_home),
            primary_group: opt(self.primary_group, child.primary_group),
            groups: list(self.groups, child.groups),
            no_user_group: opt(self.no_user_group, child.no_user_group),
            no_log_init: opt(self.no_log_init, child.no_log_init),
            shell: opt(self.shell, child.shell),
            system: opt(self.system, child.system),
        }
    }
}

impl Merge for PasswdGroup {
    fn merge(self, child: Self) -> Self {
        PasswdGroup {
            name: self.name,
            gid: opt(self.gid, child.gid),
            password_hash: opt(self.password_hash, child.password_hash),
            system: opt(self.system, child.system),
        }
    }
}

impl Merge for Systemd {
    fn merge(self, child: Self) -> Self {
        Systemd {
            units: keyed(self.units, child.units, |u| Some(u.name.clone())),
        }
    }
}

impl Merge for Unit {
    fn merge(self, child: Self) -> Self {
        Unit {
            name: self.name,
            enabled: opt(self.enabled, child.enabled),
            mask: opt(self.mask, child.mask),
            contents: opt(self.contents, child.contents),
            dropins: keyed(self.dropins, child.dropins, |d| Some(d.name.clone())),
        }
    }
}

impl Merge for Dropin {
    fn merge(self, child: Self) -> Self {
        Dropin {
            name: self.name,
            contents: opt(self.contents, child.contents),
        }
    }
}

impl Merge for Storage {
    fn merge(self, child: Self) -> Self {
        Storage {
            disks: keyed(self.disks, child.disks, |d| Some(d.device.clone())),
            raid: keyed(self.raid, child.raid, |r| Some(r.name.clone())),
            filesystems: keyed(self.filesystems, child.filesystems, |f| {
                Some(f.device.clone())
            }),
            files: keyed(self.files, child.files, |f| Some(f.path.clone())),
            directories: keyed(self.directories, child.directories, |d| {
                Some(d.path.clone())
            }),
            links: keyed(self.links, child.links, |l| Some(l.path.clone())),
        }
    }
}

impl Merge for Disk {
    fn merge(self, child: Self) -> Self {
        Disk {
            device: self.device,
            wipe_table: opt(self.wipe_table, child.wipe_table),
            // number 0 ("next available") never matches an existing entry
            partitions: keyed(self.partitions, child.partitions, |p| {
                (p.number != 0).then_some(p.number)
            }),
        }
    }
}

impl Merge for Partition {
    fn merge(self, child: Self) -> Self {
        Partition {
            number: self.number,
            label: opt(self.label, child.label),
            size_mib: opt(self.size_mib, child.size_mib),
            start_mib: opt(self.start_mib, child.start_mib),
            type_guid: opt(self.type_guid, child.type_guid),
            guid: opt(self.guid, child.guid),
            wipe_partition_entry: opt(self.wipe_partition_entry, child.wipe_partition_entry),
            should_exist: opt(self.should_exist, child.should_exist),
        }
    }
}

impl Merge for Raid {
    fn merge(self, child: Self) -> Self {
        Raid {
            name: self.name,
            level: string(self.level, child.level),
            devices: list(self.devices, child.devices),
            spares: opt(self.spares, child.spares),
            options: list(self.options, child.options),
        }
    }
}

impl Merge for Filesystem {
    fn merge(self, child: Self) -> Self {
        Filesystem {
            device: self.device,
            format: opt(self.format, child.format),
            path: opt(self.path, child.path),
            label: opt(self.label, child.label),
            uuid: opt(self.uuid, child.uuid),
            wipe_filesystem: opt(self.wipe_filesystem, child.wipe_filesystem),
            options: list(self.options, child.options),
            mount_options: list(self.mount_options, child.mount_options),
            clean_except: list(self.clean_except, child.clean_except),
            create: opt_merge(self.create, child.create),
        }
    }
}

impl Merge for Create {
    fn merge(self, child: Self) -> Self {
        Create {
            force: opt(self.force, child.force),
            options: list(self.options, child.options),
        }
    }
}

impl Merge for File {
    fn merge(self, child: Self) -> Self {
        // A child replacing the contents supersedes anything the parent
        // wanted appended; otherwise appends accumulate.
        let append = if child.contents.is_some() {
            child.append
        } else {
            concat(self.append, child.append)
        };
        File {
            path: self.path,
            user: NodeUser {
                id: opt(self.user.id, child.user.id),
                name: opt(self.user.name, child.user.name),
            },
            group: NodeGroup {
                id: opt(self.group.id, child.group.id),
                name: opt(self.group.name, child.group.name),
            },
            overwrite: opt(self.overwrite, child.overwrite),
            contents: opt_merge(self.contents, child.contents),
            append,
            mode: opt(self.mode, child.mode),
        }
    }
}

impl Merge for Directory {
    fn merge(self, child: Self) -> Self {
        Directory {
            path: self.path,
            user: NodeUser {
                id: opt(self.user.id, child.user.id),
                name: opt(self.user.name, child.user.name),
            },
            group: NodeGroup {
                id: opt(self.group.id, child.group.id),
                name: opt(self.group.name, child.group.name),
            },
            overwrite: opt(self.overwrite, child.overwrite),
            mode: opt(self.mode, child.mode),
        }
    }
}

impl Merge for Link {
    fn merge(self, child: Self) -> Self {
        Link {
            path: self.path,
            user: NodeUser {
                id: opt(self.user.id, child.user.id),
                name: opt(self.user.name, child.user.name),
            },
            group: NodeGroup {
                id: opt(self.group.id, child.group.id),
                name: opt(self.group.name, child.group.name),
            },
            overwrite: opt(self.overwrite, child.overwrite),
            target: opt(self.target, child.target),
            hard: opt(self.hard, child.hard),
        }
    }
}

impl Merge for Kargs {
    fn merge(self, child: Self) -> Self {
        Kargs {
            should_exist: list(self.should_exist, child.should_exist),
            should_not_exist: list(self.should_not_exist, child.should_not_exist),
        }
    }
}

/// Merge `child` over `parent`.
pub fn merge(parent: Config, child: Config) -> Config {
    parent.merge(child)
}
