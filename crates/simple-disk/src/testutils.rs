//! Shared test scaffolding: synthetic device records, a fake device database
//! and a fake tool executor that plays back the partitioner's effects into
//! the database.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::anyhow;

use crate::{
    constants::{METADATA_PARTITION_NAME, METADATA_PARTITION_TYPE},
    device::{topology, DeviceDatabase, DeviceRecord, DeviceSnapshot},
    error::VolumeError,
    tools::{DiskTools, LuksParams},
};

/// A block device record with the given node and the base properties every
/// udev record carries.
pub(crate) fn record_with(
    devnode: &str,
    customize: impl FnOnce(&mut DeviceRecord),
) -> DeviceRecord {
    let mut record = DeviceRecord {
        devnode: PathBuf::from(devnode),
        sysname: Path::new(devnode)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        subsystem: "block".to_string(),
        ..DeviceRecord::default()
    };
    record
        .properties
        .insert("DEVNAME".to_string(), devnode.to_string());
    customize(&mut record);
    record
}

pub(crate) fn disk_record(devnode: &str, major: &str, minor: &str) -> DeviceRecord {
    let major = major.to_string();
    let minor = minor.to_string();
    record_with(devnode, move |record| {
        record
            .properties
            .insert("DEVTYPE".to_string(), "disk".to_string());
        record.properties.insert("MAJOR".to_string(), major);
        record.properties.insert("MINOR".to_string(), minor);
    })
}

pub(crate) fn partition_record(
    devnode: &str,
    entry_disk: &str,
    customize: impl FnOnce(&mut DeviceRecord),
) -> DeviceRecord {
    let entry_disk = entry_disk.to_string();
    record_with(devnode, move |record| {
        record
            .properties
            .insert("DEVTYPE".to_string(), "partition".to_string());
        record
            .properties
            .insert("ID_PART_ENTRY_DISK".to_string(), entry_disk);
        customize(record);
    })
}

pub(crate) fn metadata_partition_record(devnode: &str, entry_disk: &str) -> DeviceRecord {
    partition_record(devnode, entry_disk, |record| {
        record.properties.insert(
            "ID_PART_ENTRY_NAME".to_string(),
            METADATA_PARTITION_NAME.to_string(),
        );
        record.properties.insert(
            "ID_PART_ENTRY_TYPE".to_string(),
            METADATA_PARTITION_TYPE.to_string(),
        );
    })
}

pub(crate) fn data_partition_record(devnode: &str, entry_disk: &str) -> DeviceRecord {
    partition_record(devnode, entry_disk, |record| {
        record
            .properties
            .insert("ID_PART_ENTRY_NAME".to_string(), "data".to_string());
        record.properties.insert(
            "ID_PART_ENTRY_TYPE".to_string(),
            "0fc63daf-8483-4772-8e79-3d69d8477de4".to_string(),
        );
    })
}

/// An in-memory device database shared between a test, its fake tools and
/// the code under test.
#[derive(Clone, Default)]
pub(crate) struct FakeDatabase {
    state: Rc<RefCell<DeviceSnapshot>>,
}

impl FakeDatabase {
    pub fn new(records: impl IntoIterator<Item = DeviceRecord>) -> Self {
        Self {
            state: Rc::new(RefCell::new(records.into_iter().collect())),
        }
    }

    pub fn insert(&self, record: DeviceRecord) {
        self.state.borrow_mut().insert(record);
    }
}

impl DeviceDatabase for FakeDatabase {
    fn snapshot(&self) -> Result<DeviceSnapshot, VolumeError> {
        Ok(self.state.borrow().clone())
    }
}

/// A fake tool executor. Records every invocation, and mimics the
/// partitioner by materializing partition records (backed by real temp
/// files, so label writes land somewhere) into the shared database.
pub(crate) struct FakeTools {
    db: FakeDatabase,
    dir: tempfile::TempDir,
    calls: RefCell<Vec<String>>,
    /// Sysattrs given to the record of an opened LUKS mapping.
    pub mapped_sysattrs: BTreeMap<String, String>,
    /// Properties merged into the record of an opened LUKS mapping.
    pub mapped_properties: BTreeMap<String, String>,
    pub fail_partition: bool,
    pub fail_luks_open: bool,
    pub fail_luks_close: bool,
    pub fail_mkfs: bool,
    /// Pretend the partitioner succeeded without any partitions appearing.
    pub skip_partition_records: bool,
}

impl FakeTools {
    pub fn new(db: FakeDatabase) -> Self {
        Self {
            db,
            dir: tempfile::tempdir().unwrap(),
            calls: RefCell::new(Vec::new()),
            mapped_sysattrs: BTreeMap::new(),
            mapped_properties: BTreeMap::new(),
            fail_partition: false,
            fail_luks_open: false,
            fail_luks_close: false,
            fail_mkfs: false,
            skip_partition_records: false,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// The node a successful `luks_open` hands back.
    pub fn mapped_device(&self) -> PathBuf {
        self.dir.path().join("dm-0")
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl DiskTools for FakeTools {
    fn partition(&self, disk: &Path, args: &[String]) -> Result<(), VolumeError> {
        self.log(format!("sgdisk {} {}", args.join(" "), disk.display()));
        if self.fail_partition {
            return Err(VolumeError::PartitioningFailed {
                devnode: disk.to_path_buf(),
                source: anyhow!("injected partitioner failure"),
            });
        }

        let snapshot = self.db.snapshot()?;
        let disk_number = topology::lookup_device(&snapshot, disk)?
            .device_number()
            .unwrap_or_default();
        if self.skip_partition_records {
            return Ok(());
        }

        // Reconstruct the partition table the arguments describe: "-n"
        // declares an entry, "-t" and "-c" attach its type and name.
        let mut entries: BTreeMap<u32, (Option<String>, Option<String>)> = BTreeMap::new();
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            if !matches!(flag.as_str(), "-n" | "-t" | "-c") {
                continue;
            }
            let Some(value) = iter.next() else { continue };
            let Some((index, rest)) = value.split_once(':') else {
                continue;
            };
            let Ok(index) = index.parse::<u32>() else {
                continue;
            };
            let entry = entries.entry(index).or_default();
            match flag.as_str() {
                "-t" => entry.0 = Some(rest.to_string()),
                "-c" => entry.1 = Some(rest.to_string()),
                _ => {}
            }
        }

        let disk_name = disk
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        for (index, (entry_type, entry_name)) in entries {
            let backing = self.dir.path().join(format!("{disk_name}{index}"));
            File::create(&backing).unwrap();
            let record = partition_record(
                &backing.to_string_lossy(),
                &disk_number,
                move |record| {
                    if let Some(entry_type) = entry_type {
                        record
                            .properties
                            .insert("ID_PART_ENTRY_TYPE".to_string(), entry_type);
                    }
                    if let Some(entry_name) = entry_name {
                        record
                            .properties
                            .insert("ID_PART_ENTRY_NAME".to_string(), entry_name);
                    }
                },
            );
            self.db.insert(record);
        }
        Ok(())
    }

    fn reread_partitions(&self, disk: &Path) -> Result<(), VolumeError> {
        self.log(format!("partprobe {}", disk.display()));
        Ok(())
    }

    fn settle(&self) -> Result<(), VolumeError> {
        self.log("settle".to_string());
        Ok(())
    }

    fn luks_format(
        &self,
        device: &Path,
        _passphrase: &str,
        params: &LuksParams,
    ) -> Result<(), VolumeError> {
        self.log(format!(
            "luksFormat {} cipher={} hash={} key-size={}",
            device.display(),
            params.cipher,
            params.hash,
            params.key_size
        ));
        Ok(())
    }

    fn luks_open(
        &self,
        device: &Path,
        mapping: &str,
        _passphrase: &str,
    ) -> Result<PathBuf, VolumeError> {
        if self.fail_luks_open {
            return Err(VolumeError::CryptSetupOpenFailed {
                devnode: device.to_path_buf(),
                source: anyhow!("injected open failure"),
            });
        }
        self.log(format!("luksOpen {} {mapping}", device.display()));

        let mapped = self.mapped_device();
        File::create(&mapped).unwrap();
        let sysattrs = self.mapped_sysattrs.clone();
        let properties = self.mapped_properties.clone();
        self.db.insert(record_with(
            &mapped.to_string_lossy(),
            move |record| {
                record.sysattrs = sysattrs;
                record.properties.extend(properties);
            },
        ));
        Ok(mapped)
    }

    fn luks_close(&self, mapping: &str) -> Result<(), VolumeError> {
        self.log(format!("luksClose {mapping}"));
        if self.fail_luks_close {
            return Err(VolumeError::CryptSetupCloseFailed {
                mapping: mapping.to_string(),
                source: anyhow!("injected close failure"),
            });
        }
        Ok(())
    }

    fn make_filesystem(&self, device: &Path, filesystem: &str) -> Result<(), VolumeError> {
        self.log(format!("mkfs -t {filesystem} {}", device.display()));
        if self.fail_mkfs {
            return Err(VolumeError::FilesystemCreationFailed {
                devnode: device.to_path_buf(),
                filesystem: filesystem.to_string(),
                source: anyhow!("injected mkfs failure"),
            });
        }
        Ok(())
    }
}
