/// GPT entry name of the metadata partition on every initialized disk.
pub const METADATA_PARTITION_NAME: &str = "simple-metadata";

/// GPT partition type GUID of the metadata partition.
pub const METADATA_PARTITION_TYPE: &str = "903b0d2d-812e-4029-89fa-a905b9cd80c1";

/// Current schema version of the on-disk volume label.
pub const VOLUME_LABEL_VERSION: i32 = 1;

/// Offset from the start of the disk to the metadata partition, in MiB.
pub const METADATA_PARTITION_OFFSET_MIB: u32 = 1;

/// Extent of the metadata partition, in MiB.
pub const METADATA_PARTITION_SIZE_MIB: u32 = 1;

/// Mount table consulted for exclusivity checks.
pub const PROC_MOUNTS_PATH: &str = "/proc/mounts";
