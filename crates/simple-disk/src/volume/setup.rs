use std::{collections::BTreeMap, path::Path};

use log::{debug, info};

use crate::{
    constants::{
        METADATA_PARTITION_NAME, METADATA_PARTITION_OFFSET_MIB, METADATA_PARTITION_SIZE_MIB,
        METADATA_PARTITION_TYPE, VOLUME_LABEL_VERSION,
    },
    device::DeviceDatabase,
    error::VolumeError,
    query::VolumeQuery,
    tools::{DiskTools, LuksParams},
    volume::{access::VolumeAccess, candidates, label::VolumeLabel},
};

/// Renders the single partitioner invocation that lays out a new volume:
/// partition 1 is always the metadata partition at a fixed offset and
/// extent, partition 2 takes the remainder of the disk and carries the
/// query label as its name.
fn partition_args(query: &VolumeQuery) -> Vec<String> {
    let start = METADATA_PARTITION_OFFSET_MIB;
    let end = start + METADATA_PARTITION_SIZE_MIB;
    let mut args = vec![
        "-o".to_string(),
        "-n".to_string(),
        format!("1:{start}M:{end}M"),
        "-t".to_string(),
        format!("1:{METADATA_PARTITION_TYPE}"),
        "-c".to_string(),
        format!("1:{METADATA_PARTITION_NAME}"),
        "-n".to_string(),
        "2:0:0".to_string(),
    ];
    if !query.label.is_empty() {
        args.push("-c".to_string());
        args.push(format!("2:{}", query.label));
    }
    args
}

/// Initializes `disk` as a simple volume described by `query`.
///
/// Forcibly overwrites any partition table already present; the caller is
/// responsible for only pointing this at disks the classifier reported as
/// blank, and for keeping everything else away from the disk until it
/// returns. On failure the disk is left as far as it got, which is the
/// diagnosable state.
pub fn initialize(
    db: &dyn DeviceDatabase,
    tools: &dyn DiskTools,
    disk: &Path,
    query: &VolumeQuery,
    hostname: &str,
    machine_id: &str,
) -> Result<(), VolumeError> {
    info!("Partitioning '{}'", disk.display());
    tools.partition(disk, &partition_args(query))?;

    info!("Updating the kernel with the new partitions of '{}'", disk.display());
    tools.reread_partitions(disk)?;
    tools.settle()?;

    let snapshot = db.snapshot()?;
    let (label_device, data_device) = candidates::label_and_data_devices(&snapshot, disk)?;
    debug!(
        "Disk '{}' has label device '{}' and data device '{}'",
        disk.display(),
        label_device.display(),
        data_device.display()
    );

    let label = VolumeLabel {
        version: VOLUME_LABEL_VERSION,
        hostname: hostname.to_string(),
        machine_id: machine_id.to_string(),
        label: query.label.clone(),
        numbering: String::new(),
        encrypted: query.wants_encryption(),
        metadata: BTreeMap::new(),
    };
    info!("Writing the volume label to '{}'", label_device.display());
    label.write_to(&label_device)?;

    if query.wants_encryption() {
        info!("Setting up an encrypted data volume on '{}'", data_device.display());
        tools.luks_format(
            &data_device,
            &query.encryption_passphrase,
            &LuksParams::from(query),
        )?;

        let access =
            VolumeAccess::open_encrypted(tools, &data_device, &query.encryption_passphrase)?;
        info!(
            "Creating a {} filesystem on '{}'",
            query.filesystem,
            access.device_path().display()
        );
        let formatted = tools.make_filesystem(access.device_path(), &query.filesystem);
        let released = access.release();
        formatted?;
        released?;
    } else {
        info!(
            "Creating a {} filesystem on '{}'",
            query.filesystem,
            data_device.display()
        );
        tools.make_filesystem(&data_device, &query.filesystem)?;
    }

    info!("Device initialization complete for '{}'", disk.display());
    Ok(())
}
