use std::path::Path;

use log::debug;

use crate::{
    device::{topology, DeviceDatabase},
    error::VolumeError,
    query::VolumeQuery,
    tools::DiskTools,
    volume::{access::VolumeAccess, label::VolumeLabel},
};

/// Checks whether the initialized disk behind `label_device` and
/// `data_device` satisfies `query`.
///
/// "Does not satisfy" is `Ok(false)`; errors are reserved for states where no
/// decision can be made. Wrong passphrases are a plain `false`. The
/// `initialized` field of the query only gates which pipeline runs and is not
/// consulted here, and neither are the result-set constraints (`min-disks`,
/// `max-disks`, `exclusive`, `dynamic-mounts`); those belong to the caller
/// assembling the set.
pub fn query_matches(
    db: &dyn DeviceDatabase,
    tools: &dyn DiskTools,
    query: &VolumeQuery,
    label_device: &Path,
    data_device: &Path,
) -> Result<bool, VolumeError> {
    let label = VolumeLabel::read_from(label_device)?;

    if query.own_hostname {
        let hostname = diskutils::identity::hostname().map_err(VolumeError::IdentityLookup)?;
        if label.hostname != hostname {
            return Ok(false);
        }
    }

    if !query.own_machine_id.is_empty() {
        let machine_id = diskutils::identity::machine_id().map_err(VolumeError::IdentityLookup)?;
        if label.machine_id != machine_id {
            return Ok(false);
        }
    }

    if !query.label.is_empty() && query.label != label.label {
        return Ok(false);
    }

    // label.numbering has no query relevance.

    let access = if query.wants_encryption() {
        if !label.encrypted {
            // The label says the data volume is not encrypted. It could be
            // corrupted, but someone would have had to do that on purpose,
            // so treat it as a plain mismatch.
            return Ok(false);
        }
        match VolumeAccess::open_encrypted(tools, data_device, &query.encryption_passphrase) {
            Ok(access) => access,
            Err(err) => {
                // A passphrase that does not unlock the volume is a
                // mismatch, not an error.
                debug!(
                    "Could not open '{}' as an encrypted volume: {err}",
                    data_device.display()
                );
                return Ok(false);
            }
        }
    } else {
        if label.encrypted {
            return Ok(false);
        }
        VolumeAccess::open(tools, data_device)
    };

    // The context is dropped, and with it the mapping closed, on every path
    // out of this function.
    data_device_matches(db, query, access.device_path())
}

/// The size and filesystem constraints, checked against the opened data
/// device.
fn data_device_matches(
    db: &dyn DeviceDatabase,
    query: &VolumeQuery,
    device: &Path,
) -> Result<bool, VolumeError> {
    let snapshot = db.snapshot()?;
    let record = topology::lookup_device(&snapshot, device)?;

    let size = match record.sysattr("size").and_then(|raw| raw.parse::<u64>().ok()) {
        Some(size) => size,
        // Missing or malformed size: nothing to match against, fail the disk.
        None => return Ok(false),
    };
    if query.min_size_bytes > 0 && size < query.min_size_bytes {
        return Ok(false);
    }
    if query.max_size_bytes > 0 && size > query.max_size_bytes {
        return Ok(false);
    }

    if !query.filesystem.is_empty() {
        match record.property("ID_FS_TYPE") {
            Some(filesystem) if filesystem == query.filesystem => {}
            // Unknown filesystem type cannot satisfy a filesystem constraint.
            _ => return Ok(false),
        }
    }

    Ok(true)
}
