//! Disk-state classification and the candidate pipeline that buckets every
//! selected disk into initialized, blank and rejected.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    constants::{METADATA_PARTITION_NAME, METADATA_PARTITION_TYPE},
    device::{filter, topology, DeviceDatabase, DeviceRecord, DeviceSnapshot, SelectionRule},
    error::VolumeError,
};

/// What a disk under consideration turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskState {
    /// Partition layout and label conform to a simple volume.
    Initialized,

    /// No partitions, no filesystem, no partition table; safe to recruit.
    Blank,

    /// Off-limits; the reason is informational, not an error.
    Rejected(RejectReason),
}

/// Why a disk is not usable as a simple volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    HasFilesystem,
    HasPartitionTable,
    MissingMetadataPartition,
    MissingDataPartition,
    MultipleMetadataPartitions,
    MultipleDataPartitions,
    Unknown,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectReason::HasFilesystem => "disk has no partitions but has a filesystem",
            RejectReason::HasPartitionTable => "disk has no partitions but has a partition table",
            RejectReason::MissingMetadataPartition => "could not find a metadata partition",
            RejectReason::MissingDataPartition => "could not find a data partition",
            RejectReason::MultipleMetadataPartitions => "found multiple metadata partitions",
            RejectReason::MultipleDataPartitions => "found multiple data partitions",
            RejectReason::Unknown => "disk state not known",
        })
    }
}

/// Partition device nodes of a disk, grouped by their role.
pub(crate) struct PartitionRoles {
    pub metadata: Vec<PathBuf>,
    pub data: Vec<PathBuf>,
}

pub(crate) fn partition_roles(partitions: &BTreeMap<PathBuf, DeviceRecord>) -> PartitionRoles {
    let mut roles = PartitionRoles {
        metadata: Vec::new(),
        data: Vec::new(),
    };
    for (devnode, record) in partitions {
        let is_metadata = record.property("ID_PART_ENTRY_NAME") == Some(METADATA_PARTITION_NAME)
            && record.property("ID_PART_ENTRY_TYPE") == Some(METADATA_PARTITION_TYPE);
        if is_metadata {
            roles.metadata.push(devnode.clone());
        } else {
            roles.data.push(devnode.clone());
        }
    }
    roles
}

/// Decides whether `disk` is an initialized simple volume, a blank recruit,
/// or off-limits.
pub fn classify(snapshot: &DeviceSnapshot, disk: &Path) -> Result<DiskState, VolumeError> {
    let partitions = topology::partitions_of_disk(snapshot, disk)?;

    if partitions.is_empty() {
        let record = topology::lookup_device(snapshot, disk)?;
        if record.property("ID_FS_USAGE").is_some() {
            // Has a filesystem. Don't touch it.
            return Ok(DiskState::Rejected(RejectReason::HasFilesystem));
        }
        if record.property("ID_PART_TABLE_TYPE").is_some() {
            // Has a partition table we did not create. Don't touch it either.
            return Ok(DiskState::Rejected(RejectReason::HasPartitionTable));
        }
        return Ok(DiskState::Blank);
    }

    let roles = partition_roles(&partitions);
    if roles.metadata.len() > 1 {
        return Ok(DiskState::Rejected(RejectReason::MultipleMetadataPartitions));
    }
    if roles.data.len() > 1 {
        return Ok(DiskState::Rejected(RejectReason::MultipleDataPartitions));
    }
    if roles.metadata.is_empty() {
        return Ok(DiskState::Rejected(RejectReason::MissingMetadataPartition));
    }
    if roles.data.is_empty() {
        return Ok(DiskState::Rejected(RejectReason::MissingDataPartition));
    }
    Ok(DiskState::Initialized)
}

/// Resolves the metadata and data partition nodes of an initialized disk.
pub fn label_and_data_devices(
    snapshot: &DeviceSnapshot,
    disk: &Path,
) -> Result<(PathBuf, PathBuf), VolumeError> {
    let partitions = topology::partitions_of_disk(snapshot, disk)?;
    let PartitionRoles { mut metadata, mut data } = partition_roles(&partitions);
    match (metadata.pop(), data.pop()) {
        (Some(label_device), Some(data_device)) if metadata.is_empty() && data.is_empty() => {
            Ok((label_device, data_device))
        }
        _ => Err(VolumeError::DiskDidNotInitialize {
            devnode: disk.to_path_buf(),
        }),
    }
}

/// Result buckets of one candidate pass, each sorted by device node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskCandidates {
    pub initialized: Vec<PathBuf>,
    pub blank: Vec<PathBuf>,
    pub rejected: Vec<(PathBuf, RejectReason)>,
}

/// Takes one snapshot, applies the selection rules and sorts every matching
/// disk into a bucket.
pub fn candidates(
    db: &dyn DeviceDatabase,
    rules: &[SelectionRule],
) -> Result<DiskCandidates, VolumeError> {
    let snapshot = db.snapshot()?;
    candidates_in(&snapshot, rules)
}

/// The snapshot-explicit form of [`candidates`].
pub fn candidates_in(
    snapshot: &DeviceSnapshot,
    rules: &[SelectionRule],
) -> Result<DiskCandidates, VolumeError> {
    let disks = filter::filter(snapshot, rules)?;
    let mut result = DiskCandidates::default();
    for devnode in disks.keys() {
        match classify(snapshot, devnode)? {
            DiskState::Initialized => result.initialized.push(devnode.clone()),
            DiskState::Blank => result.blank.push(devnode.clone()),
            DiskState::Rejected(reason) => {
                debug!("Rejecting '{}': {reason}", devnode.display());
                result.rejected.push((devnode.clone(), reason));
            }
        }
    }
    Ok(result)
}
