use std::process::Command;

use anyhow::{anyhow, Result};
use camino::Utf8Path;
use fn_error_context::context;
use serde::Deserialize;

use ignition_utils::CommandRunExt;

#[derive(Debug, Deserialize)]
struct DevicesOutput {
    blockdevices: Vec<Device>,
}

/// A block device as reported by lsblk, restricted to the properties
/// the provisioning stages care about.
#[derive(Debug, Default, Deserialize)]
pub struct Device {
    pub name: String,
    pub label: Option<String>,
    pub fstype: Option<String>,
    pub uuid: Option<String>,
    pub path: Option<String>,
    pub children: Option<Vec<Device>>,
}

impl Device {
    // Older lsblk doesn't have PATH, so we reconstruct it
    pub fn path(&self) -> String {
        self.path.clone().unwrap_or(format!("/dev/{}", &self.name))
    }
}

#[context("Listing device {dev}")]
pub fn list_dev(dev: &Utf8Path) -> Result<Device> {
    let mut devs: DevicesOutput = Command::new("lsblk")
        .args(["-J", "-b", "-O"])
        .arg(dev)
        .log_debug()
        .run_and_parse_json()?;
    let result = devs
        .blockdevices
        .drain(..)
        .next()
        .ok_or_else(|| anyhow!("no device output from lsblk for {dev}"));
    result
}

/// What a device currently holds: filesystem type, UUID, and label, each
/// empty when the device has none (or no filesystem at all).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesystemInfo {
    pub format: String,
    pub uuid: String,
    pub label: String,
}

/// Probe the current filesystem signature of `dev`.
#[context("Probing filesystem on {dev}")]
pub fn probe_filesystem(dev: &Utf8Path) -> Result<FilesystemInfo> {
    let d = list_dev(dev)?;
    let info = FilesystemInfo {
        format: d.fstype.unwrap_or_default(),
        uuid: d.uuid.unwrap_or_default(),
        label: d.label.unwrap_or_default(),
    };
    tracing::info!(
        "found {:?} filesystem at {dev} with uuid {:?} and label {:?}",
        info.format,
        info.uuid,
        info.label
    );
    Ok(info)
}

#[derive(Debug, Deserialize)]
struct SfDiskOutput {
    partitiontable: PartitionTable,
}

#[derive(Debug, Deserialize)]
pub struct Partition {
    pub node: String,
    pub start: u64,
    pub size: u64,
    #[serde(rename = "type")]
    pub parttype: String,
    pub uuid: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionTableKind {
    Dos,
    Gpt,
    #[serde(untagged)]
    Unknown(String),
}

#[derive(Debug, Deserialize)]
pub struct PartitionTable {
    pub label: PartitionTableKind,
    pub id: String,
    pub device: String,
    pub partitions: Vec<Partition>,
}

impl PartitionTable {
    /// Find the partition with the given offset (starting at 1)
    pub fn find_partno(&self, partno: u32) -> Option<&Partition> {
        let idx = partno.checked_sub(1)? as usize;
        self.partitions.get(idx)
    }

    /// The lowest partition number not present in the table; numbers
    /// start at 1. Used for config entries declaring "next available".
    pub fn next_available_partno(&self) -> u32 {
        let mut n = 1u32;
        loop {
            if self.find_partno(n).is_none() {
                return n;
            }
            n += 1;
        }
    }
}

#[context("Listing partitions of {dev}")]
pub fn partitions_of(dev: &Utf8Path) -> Result<PartitionTable> {
    let o: SfDiskOutput = Command::new("sfdisk")
        .args(["-J", dev.as_str()])
        .run_and_parse_json()?;
    Ok(o.partitiontable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lsblk() {
        let fixture = indoc::indoc! { r#"
        {
           "blockdevices": [
              {
                 "name": "vdb1",
                 "path": "/dev/vdb1",
                 "label": "DATA",
                 "fstype": "ext4",
                 "uuid": "5d1a0df5-2b17-4460-a4b2-4c0c40e68cbd"
              }
           ]
        }
        "# };
        let devs: DevicesOutput = serde_json::from_str(fixture).unwrap();
        let dev = devs.blockdevices.into_iter().next().unwrap();
        assert_eq!(dev.path(), "/dev/vdb1");
        assert_eq!(dev.fstype.as_deref(), Some("ext4"));
        assert_eq!(dev.label.as_deref(), Some("DATA"));
    }

    #[test]
    fn test_parse_sfdisk() {
        let fixture = indoc::indoc! { r#"
        {
            "partitiontable": {
               "label": "gpt",
               "id": "A67AA901-2C72-4818-B098-7F1CAC127279",
               "device": "/dev/vdb",
               "unit": "sectors",
               "partitions": [
                  {
                     "node": "/dev/vdb1",
                     "start": 2048,
                     "size": 8192,
                     "type": "0FC63DAF-8483-4772-8E79-3D69D8477DE4",
                     "uuid": "58A4C5F0-BD12-424C-B563-195AC65A25DD",
                     "name": "boot"
                  }
               ]
            }
         }
        "# };
        let table: SfDiskOutput = serde_json::from_str(fixture).unwrap();
        let table = table.partitiontable;
        assert_eq!(table.label, PartitionTableKind::Gpt);
        assert_eq!(table.find_partno(1).unwrap().size, 8192);
        assert!(table.find_partno(2).is_none());
        assert_eq!(table.next_available_partno(), 2);
    }
}
