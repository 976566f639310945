use anyhow::{Context, Error};

use crate::dependencies::Dependency;

/// Waits for the device database event queue to empty, so freshly created
/// partitions are visible to the next snapshot.
pub fn settle() -> Result<(), Error> {
    Dependency::Udevadm
        .cmd()
        .arg("settle")
        .run_and_check()
        .context("Failed to settle the device database")
}
