//! Types for the legacy 2.x schema. Scalars that were plain (non-pointer)
//! historically stay plain here, with empty meaning unset; only fields
//! whose absent/false distinction matters (`enabled`) are optional.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub ignition: Ignition,
    #[serde(default)]
    pub passwd: Passwd,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub systemd: Systemd,
    #[serde(default)]
    pub networkd: Networkd,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ignition {
    pub version: String,
    #[serde(default)]
    pub config: IgnitionConfig,
    #[serde(default)]
    pub security: Security,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub proxy: Proxy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnitionConfig {
    #[serde(default)]
    pub append: Vec<ConfigReference>,
    pub replace: Option<ConfigReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReference {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub verification: Verification,
    #[serde(default)]
    pub http_headers: Vec<HttpHeader>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpHeader {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    #[serde(default)]
    pub tls: Tls,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tls {
    #[serde(default)]
    pub certificate_authorities: Vec<CaReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaReference {
    pub source: String,
    #[serde(default)]
    pub verification: Verification,
    #[serde(default)]
    pub http_headers: Vec<HttpHeader>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
    pub http_response_headers: Option<u32>,
    pub http_total: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proxy {
    #[serde(default)]
    pub http_proxy: String,
    #[serde(default)]
    pub https_proxy: String,
    #[serde(default)]
    pub no_proxy: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passwd {
    #[serde(default)]
    pub users: Vec<PasswdUser>,
    #[serde(default)]
    pub groups: Vec<PasswdGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswdUser {
    pub name: String,
    pub password_hash: Option<String>,
    #[serde(default)]
    pub ssh_authorized_keys: Vec<String>,
    pub uid: Option<i64>,
    #[serde(default)]
    pub gecos: String,
    #[serde(default)]
    pub home_dir: String,
    #[serde(default)]
    pub no_create_home: bool,
    #[serde(default)]
    pub primary_group: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub no_user_group: bool,
    #[serde(default)]
    pub no_log_init: bool,
    #[serde(default)]
    pub shell: String,
    #[serde(default)]
    pub system: bool,
    /// Obsolete nested form; when present it supersedes the flat fields.
    pub create: Option<UserCreate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreate {
    pub uid: Option<i64>,
    #[serde(default)]
    pub gecos: String,
    #[serde(default)]
    pub home_dir: String,
    #[serde(default)]
    pub no_create_home: bool,
    #[serde(default)]
    pub primary_group: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub no_user_group: bool,
    #[serde(default)]
    pub no_log_init: bool,
    #[serde(default)]
    pub shell: String,
    #[serde(default)]
    pub system: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswdGroup {
    pub name: String,
    pub gid: Option<i64>,
    #[serde(default)]
    pub password_hash: String,
    #[serde(default)]
    pub system: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Systemd {
    #[serde(default)]
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub name: String,
    /// Obsolete boolean; `enabled` wins when both are present.
    #[serde(default)]
    pub enable: bool,
    pub enabled: Option<bool>,
    #[serde(default)]
    pub mask: bool,
    #[serde(default)]
    pub contents: String,
    #[serde(default)]
    pub dropins: Vec<SystemdDropin>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemdDropin {
    pub name: String,
    #[serde(default)]
    pub contents: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Networkd {
    #[serde(default)]
    pub units: Vec<NetworkdUnit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkdUnit {
    pub name: String,
    #[serde(default)]
    pub contents: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Storage {
    #[serde(default)]
    pub disks: Vec<Disk>,
    #[serde(default)]
    pub raid: Vec<Raid>,
    #[serde(default)]
    pub filesystems: Vec<Filesystem>,
    #[serde(default)]
    pub files: Vec<File>,
    #[serde(default)]
    pub directories: Vec<Directory>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    pub device: String,
    #[serde(default)]
    pub wipe_table: bool,
    #[serde(default)]
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub label: Option<String>,
    #[serde(default)]
    pub number: u32,
    pub size_mib: Option<u64>,
    pub start_mib: Option<u64>,
    #[serde(default)]
    pub type_guid: String,
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub wipe_partition_entry: bool,
    pub should_exist: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Raid {
    pub name: String,
    pub level: String,
    #[serde(default)]
    pub devices: Vec<String>,
    #[serde(default)]
    pub spares: i64,
    #[serde(default)]
    pub options: Vec<String>,
}

/// A legacy filesystem is named; entries elsewhere in the config refer to
/// it by that name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filesystem {
    pub name: String,
    pub mount: Option<Mount>,
    /// Mountpoint of a filesystem that already exists on the host.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub device: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub wipe_filesystem: bool,
    pub label: Option<String>,
    pub uuid: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    /// First-generation creation block; requires `force`.
    pub create: Option<Create>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Create {
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    #[serde(default)]
    pub filesystem: String,
    pub path: String,
    #[serde(default)]
    pub contents: FileContents,
    #[serde(default)]
    pub append: bool,
    pub mode: Option<i32>,
    pub overwrite: Option<bool>,
    pub user: Option<NodeUser>,
    pub group: Option<NodeGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContents {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub compression: String,
    #[serde(default)]
    pub verification: Verification,
    #[serde(default)]
    pub http_headers: Vec<HttpHeader>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    #[serde(default)]
    pub filesystem: String,
    pub path: String,
    pub mode: Option<i32>,
    pub overwrite: Option<bool>,
    pub user: Option<NodeUser>,
    pub group: Option<NodeGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    #[serde(default)]
    pub filesystem: String,
    pub path: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub hard: bool,
    pub overwrite: Option<bool>,
    pub user: Option<NodeUser>,
    pub group: Option<NodeGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUser {
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
}
