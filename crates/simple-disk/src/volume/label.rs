use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{bail, Context, Error};
use serde::{Deserialize, Serialize};

use crate::error::VolumeError;

/// The metadata record written to the metadata partition of every
/// initialized disk.
///
/// On disk this is a UTF-8 JSON object followed by a single NUL byte; readers
/// consume up to and including the first NUL and ignore whatever follows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeLabel {
    /// Version of the label schema.
    pub version: i32,

    /// Hostname this disk was last initialized on.
    pub hostname: String,

    /// Machine id this disk was last initialized on, if available.
    pub machine_id: String,

    /// Label of this disk; should match the data partition label.
    pub label: String,

    /// Last numbering assignment this disk had for the current label.
    pub numbering: String,

    /// Disk was created as an encrypted volume.
    pub encrypted: bool,

    /// Extra metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl VolumeLabel {
    /// Renders the label to its NUL-terminated JSON form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = serde_json::to_vec(self).context("Failed to serialize volume label")?;
        bytes.push(0);
        Ok(bytes)
    }

    /// Reads a NUL-terminated label from the file or device node at `path`.
    pub fn read_from(path: &Path) -> Result<Self, VolumeError> {
        Self::read_inner(path).map_err(|source| VolumeError::LabelReadFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    fn read_inner(path: &Path) -> Result<Self, Error> {
        let file =
            File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
        let mut raw = Vec::new();
        BufReader::new(file)
            .read_until(0, &mut raw)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        if raw.pop() != Some(0) {
            bail!("Volume label is not NUL-terminated");
        }
        serde_json::from_slice(&raw).context("Volume label is not valid JSON")
    }

    /// Writes the label to the device node at `path`, fsyncing before close.
    pub fn write_to(&self, path: &Path) -> Result<(), VolumeError> {
        let write_failed = |source: Error| VolumeError::LabelWriteFailed {
            devnode: path.to_path_buf(),
            source,
        };
        let bytes = self.to_bytes().map_err(write_failed)?;
        diskutils::files::write_and_sync(path, &bytes).map_err(write_failed)
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;

    use crate::constants::VOLUME_LABEL_VERSION;

    use super::*;

    fn sample_label() -> VolumeLabel {
        VolumeLabel {
            version: VOLUME_LABEL_VERSION,
            hostname: "node-a".to_string(),
            machine_id: "0123456789abcdef0123456789abcdef".to_string(),
            label: "logs".to_string(),
            numbering: String::new(),
            encrypted: false,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_serialized_form() {
        let bytes = sample_label().to_bytes().unwrap();
        assert_eq!(bytes.last(), Some(&0u8));

        // Exactly one NUL, at the very end.
        assert_eq!(bytes.iter().filter(|byte| **byte == 0).count(), 1);

        let value: serde_json::Value = serde_json::from_slice(&bytes[..bytes.len() - 1]).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["hostname"], "node-a");
        assert_eq!(value["machine_id"], "0123456789abcdef0123456789abcdef");
        assert_eq!(value["label"], "logs");
        assert_eq!(value["numbering"], "");
        assert_eq!(value["encrypted"], false);
        assert!(value["metadata"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_write_read_round_trip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let label = VolumeLabel {
            encrypted: true,
            metadata: btreemap! { "rack".to_string() => "r12".to_string() },
            ..sample_label()
        };
        label.write_to(file.path()).unwrap();
        assert_eq!(VolumeLabel::read_from(file.path()).unwrap(), label);
    }

    #[test]
    fn test_read_ignores_bytes_past_the_terminator() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut bytes = sample_label().to_bytes().unwrap();
        // Padding past the NUL, as read back from a 1 MiB partition.
        bytes.extend_from_slice(&[0xff; 512]);
        std::fs::write(file.path(), &bytes).unwrap();
        assert_eq!(VolumeLabel::read_from(file.path()).unwrap(), sample_label());
    }

    #[test]
    fn test_read_requires_terminator() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"{\"version\":1}").unwrap();
        let err = VolumeLabel::read_from(file.path()).unwrap_err();
        assert!(matches!(err, VolumeError::LabelReadFailed { .. }));
    }

    #[test]
    fn test_read_rejects_malformed_json() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not json\0").unwrap();
        let err = VolumeLabel::read_from(file.path()).unwrap_err();
        assert!(matches!(err, VolumeError::LabelReadFailed { .. }));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = VolumeLabel::read_from(&dir.path().join("label")).unwrap_err();
        assert!(matches!(err, VolumeError::LabelReadFailed { .. }));
    }
}
