use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
};

use anyhow::Error;
use log::trace;

use crate::{
    device::{DeviceRecord, DeviceSnapshot},
    error::VolumeError,
};

/// Source of device database snapshots.
///
/// The engine never talks to udev directly; it takes one snapshot per
/// operation and works over the owned records, so selection stays conjunctive
/// (udev's own property matching is disjunctive across keys) and tests can
/// substitute synthetic databases.
pub trait DeviceDatabase {
    fn snapshot(&self) -> Result<DeviceSnapshot, VolumeError>;
}

/// The live udev database of the running host.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdevDatabase;

impl DeviceDatabase for UdevDatabase {
    fn snapshot(&self) -> Result<DeviceSnapshot, VolumeError> {
        snapshot_inner().map_err(VolumeError::DeviceDatabaseLookup)
    }
}

fn snapshot_inner() -> Result<DeviceSnapshot, Error> {
    let mut enumerator = udev::Enumerator::new()?;
    // Devices the database has not finished processing have incomplete
    // properties; leave them out of the snapshot.
    enumerator.match_is_initialized()?;

    let mut snapshot = DeviceSnapshot::new();
    for device in enumerator.scan_devices()? {
        if let Some(record) = record_from(&device) {
            trace!("Snapshotted device '{}'", record.devnode.display());
            snapshot.insert(record);
        }
    }
    Ok(snapshot)
}

/// Converts a udev device to an owned record. Devices without a device node
/// cannot be addressed by the engine and are skipped.
fn record_from(device: &udev::Device) -> Option<DeviceRecord> {
    let devnode = device.devnode()?.to_path_buf();
    let sysname = device.sysname().to_string_lossy().into_owned();
    let subsystem = device
        .subsystem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut properties = BTreeMap::new();
    for entry in device.properties() {
        properties.insert(
            entry.name().to_string_lossy().into_owned(),
            entry.value().to_string_lossy().into_owned(),
        );
    }

    Some(DeviceRecord {
        tags: tags_from(&properties),
        sysattrs: sysattrs_from(device),
        devnode,
        sysname,
        subsystem,
        properties,
    })
}

/// Collects the device's tag set from the `TAGS`/`CURRENT_TAGS` properties
/// (`:`-separated lists maintained by udev).
fn tags_from(properties: &BTreeMap<String, String>) -> BTreeSet<String> {
    ["TAGS", "CURRENT_TAGS"]
        .iter()
        .filter_map(|key| properties.get(*key))
        .flat_map(|raw| raw.split(':'))
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads the device's top-level sysfs attributes. Attributes that cannot be
/// read (write-only or transient ones) are left out.
fn sysattrs_from(device: &udev::Device) -> BTreeMap<String, String> {
    let mut sysattrs = BTreeMap::new();
    let Ok(entries) = fs::read_dir(device.syspath()) else {
        return sysattrs;
    };
    for entry in entries.flatten() {
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(value) = device.attribute_value(&name) {
            sysattrs.insert(name, value.to_string_lossy().into_owned());
        }
    }
    sysattrs
}
