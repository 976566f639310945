//! Mount table access, consulted when deciding whether a disk is up for
//! exclusive use. Result-set level policy lives with the caller; this module
//! only answers what is mounted from where.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Error};

use crate::constants::PROC_MOUNTS_PATH;

/// A single entry of a mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: PathBuf,
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub options: String,
}

/// Source of mount table entries.
pub trait MountTable {
    fn entries(&self) -> Result<Vec<MountEntry>, Error>;
}

/// The kernel's `/proc/mounts` view of the running system.
#[derive(Debug, Clone)]
pub struct ProcMounts {
    path: PathBuf,
}

impl ProcMounts {
    pub fn new() -> Self {
        Self::at(PROC_MOUNTS_PATH)
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcMounts {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable for ProcMounts {
    fn entries(&self) -> Result<Vec<MountEntry>, Error> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read mount table '{}'", self.path.display()))?;
        Ok(parse_mounts(&contents))
    }
}

fn parse_mounts(contents: &str) -> Vec<MountEntry> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let mut fields = line.split_whitespace();
            Some(MountEntry {
                device: PathBuf::from(fields.next()?),
                mount_point: PathBuf::from(fields.next()?),
                fs_type: fields.next()?.to_string(),
                options: fields.next().unwrap_or("").to_string(),
            })
        })
        .collect()
}

/// The device nodes currently backing a mount.
pub fn mounted_device_nodes(table: &dyn MountTable) -> Result<BTreeSet<PathBuf>, Error> {
    Ok(table
        .entries()?
        .into_iter()
        .map(|entry| entry.device)
        .filter(|device| device.starts_with(Path::new("/dev")))
        .collect())
}
