//! The compact `key.value_…` string form of volume queries.
//!
//! Volume names handed over by the container runtime double as the query
//! string, so the format is restricted to a charset that survives being a
//! volume name: keys and values match `[A-Za-z0-9][A-Za-z0-9-]*`, segments
//! are joined with `_` and split from their value on the first `.`.
//!
//! Records describe themselves through a static field table
//! ([`LabelRecord::FIELDS`]); the encoder and decoder walk the table, so the
//! wire format is fixed at compile time and adding a field is one table row.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

/// Joins the `key.value` segments of an encoded record.
pub const FIELD_SEPARATOR: char = '_';

/// Splits a segment into key and value.
pub const KEY_VALUE_SEPARATOR: char = '.';

static FIELD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[A-Za-z0-9][A-Za-z0-9-]*$").expect("field charset regex"));

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.9f";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    #[error("Field key does not match the label charset: '{key}'")]
    InvalidFieldKey { key: String },

    #[error("Field value does not match the label charset: '{value}'")]
    InvalidFieldValue { value: String },

    #[error("Could not parse field '{key}' from '{value}': {reason}")]
    UnparseableValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Checks if a string is a valid label field key. Keys may not be blank.
pub fn key_is_valid(key: &str) -> bool {
    FIELD_PATTERN.is_match(key)
}

/// Checks if a string is a valid label field value. Values may be blank.
pub fn value_is_valid(value: &str) -> bool {
    value.is_empty() || FIELD_PATTERN.is_match(value)
}

/// A scalar that can stand as the value of a label field.
///
/// Encoding to `None` omits the whole segment; parse failures return a plain
/// reason, the decoder attaches the key context.
pub trait LabelValue: Sized {
    fn encode_label(&self) -> Result<Option<String>, LabelError>;
    fn parse_label(raw: &str) -> Result<Self, String>;
}

impl LabelValue for bool {
    fn encode_label(&self) -> Result<Option<String>, LabelError> {
        Ok(Some(if *self { "true" } else { "false" }.to_string()))
    }

    fn parse_label(raw: &str) -> Result<Self, String> {
        match raw {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(format!("expected 'true' or 'false', got '{raw}'")),
        }
    }
}

macro_rules! integer_label_value {
    ($($int:ty),* $(,)?) => {$(
        impl LabelValue for $int {
            fn encode_label(&self) -> Result<Option<String>, LabelError> {
                Ok(Some(self.to_string()))
            }

            fn parse_label(raw: &str) -> Result<Self, String> {
                raw.parse::<$int>().map_err(|err| err.to_string())
            }
        }
    )*};
}

integer_label_value!(i8, i16, i32, i64, u8, u16, u32, u64);

impl LabelValue for String {
    /// Strings ride through validated; the empty string is an absent field.
    fn encode_label(&self) -> Result<Option<String>, LabelError> {
        if self.is_empty() {
            return Ok(None);
        }
        if !value_is_valid(self) {
            return Err(LabelError::InvalidFieldValue {
                value: self.clone(),
            });
        }
        Ok(Some(self.clone()))
    }

    fn parse_label(raw: &str) -> Result<Self, String> {
        if !value_is_valid(raw) {
            return Err(format!("'{raw}' does not match the field charset"));
        }
        Ok(raw.to_string())
    }
}

impl LabelValue for NaiveDateTime {
    /// `YYYY-MM-DDTHH-MM-SS.nnnnnnnnn` with the `.` swapped for `N`, which
    /// keeps the rendering inside the field charset.
    fn encode_label(&self) -> Result<Option<String>, LabelError> {
        let rendered = self.format(TIMESTAMP_FORMAT).to_string().replace('.', "N");
        if !value_is_valid(&rendered) {
            return Err(LabelError::InvalidFieldValue { value: rendered });
        }
        Ok(Some(rendered))
    }

    fn parse_label(raw: &str) -> Result<Self, String> {
        NaiveDateTime::parse_from_str(&raw.replace('N', "."), TIMESTAMP_FORMAT)
            .map_err(|err| err.to_string())
    }
}

/// Describes one field of a label record: its wire key and typed accessors.
pub struct FieldSpec<T> {
    pub key: &'static str,
    pub encode: fn(&T) -> Result<Option<String>, LabelError>,
    pub decode: fn(&mut T, &str) -> Result<(), String>,
}

/// A record with a static field table, encodable to the compact label form.
pub trait LabelRecord: Default + 'static {
    const FIELDS: &'static [FieldSpec<Self>];

    /// Called with decoded keys that match no entry of [`Self::FIELDS`].
    /// The default drops them on the floor.
    fn record_extra(&mut self, _key: &str, _value: &str) -> Result<(), LabelError> {
        Ok(())
    }

    /// Additional `(key, value)` segments emitted after the field table.
    fn extra_pairs(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Encodes a record to its label string.
pub fn to_label_string<T: LabelRecord>(record: &T) -> Result<String, LabelError> {
    let mut segments = Vec::with_capacity(T::FIELDS.len());
    for field in T::FIELDS {
        if !key_is_valid(field.key) {
            return Err(LabelError::InvalidFieldKey {
                key: field.key.to_string(),
            });
        }
        if let Some(value) = (field.encode)(record)? {
            segments.push(render_segment(field.key, &value));
        }
    }
    for (key, value) in record.extra_pairs() {
        if !key_is_valid(&key) {
            return Err(LabelError::InvalidFieldKey { key });
        }
        if !value_is_valid(&value) {
            return Err(LabelError::InvalidFieldValue { value });
        }
        segments.push(render_segment(&key, &value));
    }
    Ok(segments.join(&FIELD_SEPARATOR.to_string()))
}

/// Decodes a record from its label string. Absent keys leave the target at
/// its zero value; of duplicated keys the last occurrence wins.
pub fn from_label_string<T: LabelRecord>(input: &str) -> Result<T, LabelError> {
    let mut record = T::default();
    if input.is_empty() {
        return Ok(record);
    }

    let mut raw_values: BTreeMap<String, String> = BTreeMap::new();
    for segment in input.split(FIELD_SEPARATOR) {
        let (key, value) = match segment.split_once(KEY_VALUE_SEPARATOR) {
            Some((key, value)) => (key, value),
            None => (segment, ""),
        };
        raw_values.insert(key.to_string(), value.to_string());
    }

    for field in T::FIELDS {
        if let Some(raw) = raw_values.remove(field.key) {
            (field.decode)(&mut record, &raw).map_err(|reason| LabelError::UnparseableValue {
                key: field.key.to_string(),
                value: raw.clone(),
                reason,
            })?;
        }
    }

    // Whatever is left is unknown to the field table; hand it to the
    // record's fallback.
    for (key, value) in raw_values {
        record.record_extra(&key, &value)?;
    }
    Ok(record)
}

fn render_segment(key: &str, value: &str) -> String {
    if value.is_empty() {
        key.to_string()
    } else {
        format!("{key}{KEY_VALUE_SEPARATOR}{value}")
    }
}
