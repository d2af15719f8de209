//! Source summaries and the aggregated listing handed to callers.

use serde::{Deserialize, Serialize};

use crate::metadata::{Metadata, fields};

/// One logical source reconstructed from its segments.
///
/// `segment_count` is `1 + max(index)` over every segment sharing `key`
/// that the scan observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    /// Deduplication key this summary was merged under.
    #[serde(skip)]
    pub key: String,
    /// Number of segments the source was split into.
    pub segment_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_directory_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_datetime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_timestamp: Option<i64>,
}

impl SourceSummary {
    /// Build a summary from the metadata of the segment that set its count.
    pub fn from_metadata(key: String, segment_count: u64, metadata: &Metadata) -> Self {
        Self {
            key,
            segment_count,
            source_id: metadata.str_field(fields::SOURCE_ID),
            absolute_directory_path: metadata.str_field(fields::ABSOLUTE_DIRECTORY_PATH),
            full_path: metadata.str_field(fields::FULL_PATH),
            file_name: metadata.str_field(fields::FILE_NAME),
            url: metadata.str_field(fields::URL),
            source: metadata.str_field(fields::SOURCE),
            title: metadata.str_field(fields::TITLE),
            ingestion_datetime: metadata.str_field(fields::INGESTION_DATETIME),
            ingestion_timestamp: metadata.int_field(fields::INGESTION_TIMESTAMP),
        }
    }
}

/// The result of listing the sources of one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceListing {
    /// The scanned store.
    pub store_name: String,
    /// One summary per distinct source.
    pub sources: Vec<SourceSummary>,
    /// Always `sources.len()`.
    pub source_count: usize,
}

impl SourceListing {
    /// Create a listing; `source_count` is derived from `sources`.
    pub fn new(store_name: impl Into<String>, sources: Vec<SourceSummary>) -> Self {
        let source_count = sources.len();
        Self { store_name: store_name.into(), sources, source_count }
    }

    /// Serialize the listing as a JSON value.
    pub fn to_json(&self) -> crate::error::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
