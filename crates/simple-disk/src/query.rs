use std::{collections::BTreeMap, str::FromStr};

use crate::volumelabel::{
    self, FieldSpec, LabelError, LabelRecord, LabelValue,
};

/// How disks mounted under a volume are named: incrementing numbers or UUIDs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamingStyle {
    #[default]
    Numeric,
    Uuid,
}

impl LabelValue for NamingStyle {
    fn encode_label(&self) -> Result<Option<String>, LabelError> {
        Ok(match self {
            NamingStyle::Numeric => None,
            NamingStyle::Uuid => Some("uuid".to_string()),
        })
    }

    fn parse_label(raw: &str) -> Result<Self, String> {
        match raw {
            "numeric" => Ok(NamingStyle::Numeric),
            "uuid" => Ok(NamingStyle::Uuid),
            _ => Err(format!("unknown naming style '{raw}'")),
        }
    }
}

/// A declarative description of the disks a volume wants.
///
/// In reality a mash-up of query and create parameters: the same record
/// selects initialized disks and carries everything needed to recruit blank
/// ones. Zero values mean "don't care" throughout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeQuery {
    /// Label the disks must carry.
    pub label: String,

    /// Only accept disks initialized on this host.
    pub own_hostname: bool,

    /// Only accept disks initialized on this machine id.
    pub own_machine_id: String,

    /// Whether the disks should already be initialized. Advisory: it gates
    /// which pipeline runs, the matcher itself ignores it.
    pub initialized: bool,

    /// Whether the disks are for this volume's exclusive use.
    pub exclusive: bool,

    /// Mount matching disks under a subdirectory, tracked as they come
    /// and go.
    pub dynamic_mounts: bool,

    /// Respect the numbering recorded in the disk labels.
    pub persist_numbering: bool,

    /// Prefix for mount points created under the volume.
    pub basename: String,

    /// Naming style for mount points created under the volume.
    pub naming_style: NamingStyle,

    /// Smallest acceptable data volume, in bytes.
    pub min_size_bytes: u64,

    /// Largest acceptable data volume, in bytes.
    pub max_size_bytes: u64,

    /// Fewest disks that must match before the volume materializes.
    pub min_disks: i32,

    /// Most disks the volume will take.
    pub max_disks: i32,

    /// Filesystem to create on recruitment and require on match.
    pub filesystem: String,

    /// When set, the data volume is (or is to be) encrypted with this
    /// passphrase.
    pub encryption_passphrase: String,

    /// LUKS cipher used at creation; empty defers to the tool default.
    pub encryption_cipher: String,

    /// LUKS hash used at creation; empty defers to the tool default.
    pub encryption_hash: String,

    /// LUKS key size used at creation; zero defers to the tool default.
    pub encryption_key_size: u32,

    /// Free-form metadata, carried from `meta-*` keys of the query string
    /// into the on-disk label.
    pub metadata: BTreeMap<String, String>,
}

impl VolumeQuery {
    /// Parses a query from its compact string form.
    pub fn parse(input: &str) -> Result<Self, LabelError> {
        volumelabel::from_label_string(input)
    }

    /// Renders the query to its compact string form.
    pub fn to_label_string(&self) -> Result<String, LabelError> {
        volumelabel::to_label_string(self)
    }

    /// Whether the query asks for an encrypted data volume.
    pub fn wants_encryption(&self) -> bool {
        !self.encryption_passphrase.is_empty()
    }
}

impl FromStr for VolumeQuery {
    type Err = LabelError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl LabelRecord for VolumeQuery {
    const FIELDS: &'static [FieldSpec<Self>] = &[
        FieldSpec {
            key: "label",
            encode: |query| query.label.encode_label(),
            decode: |query, raw| {
                query.label = String::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "own-hostname",
            encode: |query| query.own_hostname.encode_label(),
            decode: |query, raw| {
                query.own_hostname = bool::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "own-machine-id",
            encode: |query| query.own_machine_id.encode_label(),
            decode: |query, raw| {
                query.own_machine_id = String::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "initialized",
            encode: |query| query.initialized.encode_label(),
            decode: |query, raw| {
                query.initialized = bool::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "exclusive",
            encode: |query| query.exclusive.encode_label(),
            decode: |query, raw| {
                query.exclusive = bool::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "dynamic-mounts",
            encode: |query| query.dynamic_mounts.encode_label(),
            decode: |query, raw| {
                query.dynamic_mounts = bool::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "persist-numbering",
            encode: |query| query.persist_numbering.encode_label(),
            decode: |query, raw| {
                query.persist_numbering = bool::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "basename",
            encode: |query| query.basename.encode_label(),
            decode: |query, raw| {
                query.basename = String::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "naming-style",
            encode: |query| query.naming_style.encode_label(),
            decode: |query, raw| {
                query.naming_style = NamingStyle::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "min-size",
            encode: |query| query.min_size_bytes.encode_label(),
            decode: |query, raw| {
                query.min_size_bytes = u64::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "max-size",
            encode: |query| query.max_size_bytes.encode_label(),
            decode: |query, raw| {
                query.max_size_bytes = u64::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "min-disks",
            encode: |query| query.min_disks.encode_label(),
            decode: |query, raw| {
                query.min_disks = i32::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "max-disks",
            encode: |query| query.max_disks.encode_label(),
            decode: |query, raw| {
                query.max_disks = i32::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "filesystem",
            encode: |query| query.filesystem.encode_label(),
            decode: |query, raw| {
                query.filesystem = String::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "encryption-passphrase",
            encode: |query| query.encryption_passphrase.encode_label(),
            decode: |query, raw| {
                query.encryption_passphrase = String::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "encryption-cipher",
            encode: |query| query.encryption_cipher.encode_label(),
            decode: |query, raw| {
                query.encryption_cipher = String::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "encryption-key-size",
            encode: |query| query.encryption_key_size.encode_label(),
            decode: |query, raw| {
                query.encryption_key_size = u32::parse_label(raw)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "encryption-hash",
            encode: |query| query.encryption_hash.encode_label(),
            decode: |query, raw| {
                query.encryption_hash = String::parse_label(raw)?;
                Ok(())
            },
        },
    ];

    /// `meta-*` keys fall through the field table into the metadata map.
    fn record_extra(&mut self, key: &str, value: &str) -> Result<(), LabelError> {
        if let Some(stripped) = key.strip_prefix("meta-") {
            if volumelabel::key_is_valid(stripped) {
                self.metadata
                    .insert(stripped.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    fn extra_pairs(&self) -> Vec<(String, String)> {
        self.metadata
            .iter()
            .map(|(key, value)| (format!("meta-{key}"), value.clone()))
            .collect()
    }
}
