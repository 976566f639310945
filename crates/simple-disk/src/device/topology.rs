//! Topology queries over a snapshot: the partitions of a disk and the parent
//! disk of a partition, correlated through `MAJOR:MINOR` device numbers.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::{
    device::{filter, DeviceRecord, DeviceSnapshot, SelectionRule},
    error::VolumeError,
};

/// Looks up exactly one device by canonical device node.
pub fn lookup_device(
    snapshot: &DeviceSnapshot,
    devnode: &Path,
) -> Result<DeviceRecord, VolumeError> {
    let mut matched = filter::filter(snapshot, &[SelectionRule::for_devnode(devnode)])?;
    if matched.len() > 1 {
        return Err(VolumeError::AmbiguousDisk {
            devnode: devnode.to_path_buf(),
        });
    }
    matched
        .pop_first()
        .map(|(_, record)| record)
        .ok_or_else(|| VolumeError::DiskNotFound {
            devnode: devnode.to_path_buf(),
        })
}

/// Returns the partition devices of `disk`, keyed by device node.
///
/// A disk record without a device number cannot have partitions correlated to
/// it and yields an empty map.
pub fn partitions_of_disk(
    snapshot: &DeviceSnapshot,
    disk: &Path,
) -> Result<BTreeMap<PathBuf, DeviceRecord>, VolumeError> {
    let record = lookup_device(snapshot, disk)?;
    let Some(device_number) = record.device_number() else {
        return Ok(BTreeMap::new());
    };

    let rule = SelectionRule {
        properties: BTreeMap::from([
            ("ID_PART_ENTRY_DISK".to_string(), device_number),
            ("DEVTYPE".to_string(), "partition".to_string()),
        ]),
        ..SelectionRule::default()
    };
    filter::filter(snapshot, &[rule])
}

/// Returns the parent disk record of `partition`.
pub fn disk_of_partition(
    snapshot: &DeviceSnapshot,
    partition: &Path,
) -> Result<DeviceRecord, VolumeError> {
    let record = lookup_device(snapshot, partition)?;
    let not_found = || VolumeError::DiskNotFound {
        devnode: partition.to_path_buf(),
    };

    let entry_disk = record.property("ID_PART_ENTRY_DISK").ok_or_else(not_found)?;
    let (major, minor) = entry_disk.split_once(':').ok_or_else(not_found)?;

    let rule = SelectionRule {
        properties: BTreeMap::from([
            ("MAJOR".to_string(), major.to_string()),
            ("MINOR".to_string(), minor.to_string()),
        ]),
        ..SelectionRule::default()
    };
    let mut matched = filter::filter(snapshot, &[rule])?;
    if matched.len() > 1 {
        return Err(VolumeError::AmbiguousDisk {
            devnode: partition.to_path_buf(),
        });
    }
    matched
        .pop_first()
        .map(|(_, record)| record)
        .ok_or_else(not_found)
}
