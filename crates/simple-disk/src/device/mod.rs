//! The device database layer: one-shot snapshots of the host's block
//! devices and rule-driven selection over them.

pub mod filter;
pub mod snapshot;
pub mod topology;

pub use filter::{device_nodes, filter};
pub use snapshot::{DeviceDatabase, UdevDatabase};

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

/// Immutable snapshot of a single device in the host device database.
///
/// Produced once by the snapshotter and consumed read-only; records are keyed
/// by their canonical device node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Canonical device node, e.g. `/dev/sda`.
    pub devnode: PathBuf,

    /// Basename of the sys path, e.g. `sda`.
    pub sysname: String,

    /// Kernel subsystem, e.g. `block`.
    pub subsystem: String,

    /// udev tags attached to the device.
    pub tags: BTreeSet<String>,

    /// udev properties (environment), e.g. `DEVTYPE=disk`.
    pub properties: BTreeMap<String, String>,

    /// sysfs attributes, e.g. `size`.
    pub sysattrs: BTreeMap<String, String>,
}

impl DeviceRecord {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn sysattr(&self, key: &str) -> Option<&str> {
        self.sysattrs.get(key).map(String::as_str)
    }

    /// The `MAJOR:MINOR` device number, if both properties are present.
    pub fn device_number(&self) -> Option<String> {
        Some(format!(
            "{}:{}",
            self.property("MAJOR")?,
            self.property("MINOR")?
        ))
    }

    /// Reconstructs the selection rule that would uniquely describe this
    /// device, for operator cross-checking of rule files.
    pub fn to_selection_rule(&self) -> SelectionRule {
        SelectionRule {
            subsystems: vec![self.subsystem.clone()],
            names: vec![self.sysname.clone()],
            tags: self.tags.iter().cloned().collect(),
            properties: self.properties.clone(),
            attrs: self.sysattrs.clone(),
        }
    }
}

/// One snapshot of all initialized devices, keyed by canonical device node.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    records: BTreeMap<PathBuf, DeviceRecord>,
}

impl DeviceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record, replacing any previous record of the same device node.
    pub fn insert(&mut self, record: DeviceRecord) {
        self.records.insert(record.devnode.clone(), record);
    }

    pub fn get(&self, devnode: &Path) -> Option<&DeviceRecord> {
        self.records.get(devnode)
    }

    /// Records in device-node order.
    pub fn records(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<DeviceRecord> for DeviceSnapshot {
    fn from_iter<I: IntoIterator<Item = DeviceRecord>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

/// A conjunctive predicate over a device: every field of the rule must be
/// satisfied for the device to match. All entries are shell-style globs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionRule {
    /// Globs that must all match the device subsystem.
    pub subsystems: Vec<String>,

    /// Globs that must all match the device sysname.
    pub names: Vec<String>,

    /// Globs that must each match at least one device tag.
    pub tags: Vec<String>,

    /// Key glob to value glob; each pair must be witnessed by some property.
    pub properties: BTreeMap<String, String>,

    /// Key glob to value glob; each pair must be witnessed by some sysattr.
    pub attrs: BTreeMap<String, String>,
}

impl SelectionRule {
    /// The targeted rule selecting a single device by canonical node path.
    pub fn for_devnode(devnode: &Path) -> Self {
        Self {
            properties: BTreeMap::from([(
                "DEVNAME".to_string(),
                devnode.to_string_lossy().into_owned(),
            )]),
            ..Self::default()
        }
    }
}
