use std::path::PathBuf;

/// Errors produced by the volume engine.
///
/// "This disk does not satisfy the query" and "this disk is not a usable
/// volume" are results, not errors; see
/// [`DiskState`](crate::volume::DiskState) and the matcher's boolean return.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("Device database snapshot failed")]
    DeviceDatabaseLookup(#[source] anyhow::Error),

    #[error("Bad glob pattern '{pattern}'")]
    BadGlobPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Device '{}' did not resolve to any device", .devnode.display())]
    DiskNotFound { devnode: PathBuf },

    #[error("Lookup for '{}' matched more than one device", .devnode.display())]
    AmbiguousDisk { devnode: PathBuf },

    #[error("Failed to partition disk '{}'", .devnode.display())]
    PartitioningFailed {
        devnode: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Informing the kernel of the new partition table on '{}' failed", .devnode.display())]
    PartProbeFailed {
        devnode: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Waiting for the device database to settle failed")]
    SettleFailed(#[source] anyhow::Error),

    #[error("Disk '{}' did not come back as a valid volume after partitioning", .devnode.display())]
    DiskDidNotInitialize { devnode: PathBuf },

    #[error("Failed to write the volume label to '{}'", .devnode.display())]
    LabelWriteFailed {
        devnode: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to read the volume label from '{}'", .path.display())]
    LabelReadFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("cryptsetup failed to format '{}'", .devnode.display())]
    CryptSetupFormatFailed {
        devnode: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("cryptsetup failed to open '{}'", .devnode.display())]
    CryptSetupOpenFailed {
        devnode: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("cryptsetup failed to close mapping '{mapping}'")]
    CryptSetupCloseFailed {
        mapping: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to create a {filesystem} filesystem on '{}'", .devnode.display())]
    FilesystemCreationFailed {
        devnode: PathBuf,
        filesystem: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to determine the identity of this host")]
    IdentityLookup(#[source] anyhow::Error),
}
