//! The external tools the engine drives, behind one seam so every pipeline
//! can be exercised against fakes.

use std::path::{Path, PathBuf};

use diskutils::dependencies::Dependency;

use crate::{error::VolumeError, query::VolumeQuery};

/// LUKS parameters carried by a volume query. Empty or zero fields defer to
/// the tool defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LuksParams {
    pub cipher: String,
    pub hash: String,
    pub key_size: u32,
}

impl From<&VolumeQuery> for LuksParams {
    fn from(query: &VolumeQuery) -> Self {
        Self {
            cipher: query.encryption_cipher.clone(),
            hash: query.encryption_hash.clone(),
            key_size: query.encryption_key_size,
        }
    }
}

/// Abstract executor for the partitioning, encryption and filesystem tools.
pub trait DiskTools {
    /// Runs the GPT partitioner against `disk` with pre-rendered arguments.
    fn partition(&self, disk: &Path, args: &[String]) -> Result<(), VolumeError>;

    /// Asks the kernel to re-read the partition table of `disk`.
    fn reread_partitions(&self, disk: &Path) -> Result<(), VolumeError>;

    /// Blocks until the device database has caught up with kernel events.
    fn settle(&self) -> Result<(), VolumeError>;

    /// Formats `device` as a LUKS volume keyed by `passphrase`.
    fn luks_format(
        &self,
        device: &Path,
        passphrase: &str,
        params: &LuksParams,
    ) -> Result<(), VolumeError>;

    /// Opens `device` under `mapping` and returns the usable mapped node.
    fn luks_open(
        &self,
        device: &Path,
        mapping: &str,
        passphrase: &str,
    ) -> Result<PathBuf, VolumeError>;

    /// Closes a previously opened mapping.
    fn luks_close(&self, mapping: &str) -> Result<(), VolumeError>;

    /// Creates a filesystem on `device`.
    fn make_filesystem(&self, device: &Path, filesystem: &str) -> Result<(), VolumeError>;
}

/// The real tools of the running host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTools;

impl DiskTools for SystemTools {
    fn partition(&self, disk: &Path, args: &[String]) -> Result<(), VolumeError> {
        Dependency::Sgdisk
            .cmd()
            .args(args)
            .arg(disk)
            .run_and_check()
            .map_err(|source| VolumeError::PartitioningFailed {
                devnode: disk.to_path_buf(),
                source: (*source).into(),
            })
    }

    fn reread_partitions(&self, disk: &Path) -> Result<(), VolumeError> {
        Dependency::Partprobe
            .cmd()
            .arg(disk)
            .run_and_check()
            .map_err(|source| VolumeError::PartProbeFailed {
                devnode: disk.to_path_buf(),
                source: (*source).into(),
            })
    }

    fn settle(&self) -> Result<(), VolumeError> {
        diskutils::udevadm::settle().map_err(VolumeError::SettleFailed)
    }

    fn luks_format(
        &self,
        device: &Path,
        passphrase: &str,
        params: &LuksParams,
    ) -> Result<(), VolumeError> {
        let mut cmd = Dependency::Cryptsetup.cmd();
        cmd.arg("-v").arg("--force-password").arg("luksFormat");
        if !params.cipher.is_empty() {
            cmd.arg("-c").arg(&params.cipher);
        }
        if params.key_size != 0 {
            cmd.arg("-s").arg(params.key_size.to_string());
        }
        if !params.hash.is_empty() {
            cmd.arg("-h").arg(&params.hash);
        }
        // The passphrase is fed on stdin; "-" makes cryptsetup read it there.
        cmd.arg(device).arg("-").input(passphrase.as_bytes().to_vec());
        cmd.run_and_check()
            .map_err(|source| VolumeError::CryptSetupFormatFailed {
                devnode: device.to_path_buf(),
                source: (*source).into(),
            })
    }

    fn luks_open(
        &self,
        device: &Path,
        mapping: &str,
        passphrase: &str,
    ) -> Result<PathBuf, VolumeError> {
        let open_failed = |source: anyhow::Error| VolumeError::CryptSetupOpenFailed {
            devnode: device.to_path_buf(),
            source,
        };

        Dependency::Cryptsetup
            .cmd()
            .arg("-v")
            .arg("open")
            .arg(device)
            .arg(mapping)
            .input(passphrase.as_bytes().to_vec())
            .run_and_check()
            .map_err(|source| open_failed((*source).into()))?;

        // Resolve the mapper symlink to the real node the kernel created.
        Path::new("/dev/mapper")
            .join(mapping)
            .canonicalize()
            .map_err(|source| open_failed(source.into()))
    }

    fn luks_close(&self, mapping: &str) -> Result<(), VolumeError> {
        Dependency::Cryptsetup
            .cmd()
            .arg("close")
            .arg(mapping)
            .run_and_check()
            .map_err(|source| VolumeError::CryptSetupCloseFailed {
                mapping: mapping.to_string(),
                source: (*source).into(),
            })
    }

    fn make_filesystem(&self, device: &Path, filesystem: &str) -> Result<(), VolumeError> {
        Dependency::Mkfs
            .cmd()
            .arg("-V")
            .arg("-t")
            .arg(filesystem)
            .arg(device)
            .run_and_check()
            .map_err(|source| VolumeError::FilesystemCreationFailed {
                devnode: device.to_path_buf(),
                filesystem: filesystem.to_string(),
                source: (*source).into(),
            })
    }
}
