use std::path::{Path, PathBuf};

use log::{debug, error};
use uuid::Uuid;

use crate::{error::VolumeError, tools::DiskTools};

/// Scoped access to a data volume, either straight through the device node or
/// via an encrypted mapping.
///
/// Teardown is guaranteed: [`VolumeAccess::release`] closes the mapping with
/// the failure visible to the caller, and dropping the context closes it on
/// every other exit path. Closing is idempotent.
pub struct VolumeAccess<'t> {
    tools: &'t dyn DiskTools,
    device_path: PathBuf,
    mapping: Option<String>,
}

impl std::fmt::Debug for VolumeAccess<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeAccess")
            .field("device_path", &self.device_path)
            .field("mapping", &self.mapping)
            .finish()
    }
}

impl<'t> VolumeAccess<'t> {
    /// Plain passthrough; the volume is used at its own device node.
    pub fn open(tools: &'t dyn DiskTools, device: &Path) -> Self {
        Self {
            tools,
            device_path: device.to_path_buf(),
            mapping: None,
        }
    }

    /// Opens `device` as a LUKS volume under a fresh mapping name.
    pub fn open_encrypted(
        tools: &'t dyn DiskTools,
        device: &Path,
        passphrase: &str,
    ) -> Result<Self, VolumeError> {
        let mapping = Uuid::new_v4().to_string();
        let device_path = tools.luks_open(device, &mapping, passphrase)?;
        debug!(
            "Opened '{}' as encrypted mapping '{mapping}' at '{}'",
            device.display(),
            device_path.display()
        );
        Ok(Self {
            tools,
            device_path,
            mapping: Some(mapping),
        })
    }

    /// The device node through which the volume's data is reachable.
    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    /// Tears the context down, surfacing a failed close to the caller.
    pub fn release(mut self) -> Result<(), VolumeError> {
        self.close_mapping()
    }

    fn close_mapping(&mut self) -> Result<(), VolumeError> {
        match self.mapping.take() {
            Some(mapping) => self.tools.luks_close(&mapping),
            None => Ok(()),
        }
    }
}

impl Drop for VolumeAccess<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close_mapping() {
            // The mapping may leak; nothing more can be done from here.
            error!("Failed to release encrypted mapping: {err}");
        }
    }
}
