use std::{fs::OpenOptions, io::Write, path::Path};

use anyhow::{Context, Error};

/// Writes `data` to an existing file or device node and fsyncs it before
/// closing, so the data has reached the device if this returns `Ok`.
pub fn write_and_sync(path: &Path, data: &[u8]) -> Result<(), Error> {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("Failed to open '{}' for writing", path.display()))?;
    file.write_all(data)
        .with_context(|| format!("Failed to write to '{}'", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync '{}'", path.display()))?;
    Ok(())
}
