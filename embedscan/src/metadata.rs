//! Segment records and the metadata vocabulary written at ingestion time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata keys written by the ingestion pipeline and read during a scan.
pub mod fields {
    /// Caller-supplied identifier of the source document.
    pub const SOURCE_ID: &str = "source_id";
    /// Zero-based position of the segment within its source.
    pub const INDEX: &str = "index";
    /// File name of the ingested document.
    pub const FILE_NAME: &str = "file_name";
    /// URL the document was fetched from.
    pub const URL: &str = "url";
    /// Full path of the ingested file.
    pub const FULL_PATH: &str = "full_path";
    /// Directory the ingested file lived in.
    pub const ABSOLUTE_DIRECTORY_PATH: &str = "absolute_directory_path";
    /// Free-form source label.
    pub const SOURCE: &str = "source";
    /// Document title.
    pub const TITLE: &str = "title";
    /// RFC 3339 UTC instant the source was ingested.
    pub const INGESTION_DATETIME: &str = "ingestion_datetime";
    /// Epoch milliseconds the source was ingested.
    pub const INGESTION_TIMESTAMP: &str = "ingestion_timestamp";

    /// Every key above, in the order a metadata projection requests them.
    pub const ALL: [&str; 10] = [
        SOURCE_ID,
        INDEX,
        FILE_NAME,
        URL,
        FULL_PATH,
        ABSOLUTE_DIRECTORY_PATH,
        SOURCE,
        TITLE,
        INGESTION_DATETIME,
        INGESTION_TIMESTAMP,
    ];
}

/// A single metadata value as stored alongside a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Integer value (`index`, `ingestion_timestamp`).
    Int(i64),
    /// String value.
    Str(String),
    /// Explicit null.
    Null,
}

impl MetadataValue {
    /// Convert a JSON payload value as returned by a backend.
    ///
    /// Floats with an integral value become [`MetadataValue::Int`] since several
    /// stores round-trip every number through `f64`. Booleans are kept as
    /// strings; arrays and objects are not part of the vocabulary and yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            serde_json::Value::Bool(b) => Some(Self::Str(b.to_string())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| Self::Int(f as i64))
                        .or_else(|| Some(Self::Str(n.to_string())))
                }
            }
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

/// Key-value metadata attached to one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(HashMap<String, MetadataValue>);

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build metadata from a JSON object, dropping values outside the vocabulary types.
    pub fn from_json_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        object
            .iter()
            .filter_map(|(k, v)| MetadataValue::from_json(v).map(|v| (k.clone(), v)))
            .collect()
    }

    /// Insert a value, returning `self` for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Raw access to a value.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    /// A non-empty textual value. Integers are rendered in decimal.
    pub fn str_field(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            MetadataValue::Str(s) if !s.is_empty() => Some(s.clone()),
            MetadataValue::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    /// An integer value, accepting strings that parse as `i64`.
    pub fn int_field(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            MetadataValue::Int(i) => Some(*i),
            MetadataValue::Str(s) => s.trim().parse().ok(),
            MetadataValue::Null => None,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, MetadataValue)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, MetadataValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One stored segment as returned by a metadata-only page fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    /// Backend identifier of the embedding.
    pub embedding_id: String,
    /// Metadata written at ingestion time.
    pub metadata: Metadata,
}

impl SegmentRecord {
    /// Create a record from an id and its metadata.
    pub fn new(embedding_id: impl Into<String>, metadata: Metadata) -> Self {
        Self { embedding_id: embedding_id.into(), metadata }
    }
}
