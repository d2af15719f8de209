//! Deduplication keys for segment metadata.

use crate::metadata::{Metadata, fields};

/// Derive the key that groups a segment with the other segments of its source.
///
/// The first non-empty candidate wins:
///
/// 1. `source_id`
/// 2. `full_path` (or `absolute_directory_path`) followed by `ingestion_datetime`
/// 3. `url` followed by `ingestion_datetime`
/// 4. `source` followed by `ingestion_datetime`
///
/// Returns an empty string when none is present; such segments cannot be
/// attributed to a source and are left out of the listing.
pub fn resolve_key(metadata: &Metadata) -> String {
    if let Some(source_id) = metadata.str_field(fields::SOURCE_ID) {
        return source_id;
    }

    let ingested_at = metadata.str_field(fields::INGESTION_DATETIME).unwrap_or_default();
    let located = metadata
        .str_field(fields::FULL_PATH)
        .or_else(|| metadata.str_field(fields::ABSOLUTE_DIRECTORY_PATH))
        .or_else(|| metadata.str_field(fields::URL))
        .or_else(|| metadata.str_field(fields::SOURCE));

    match located {
        Some(location) => format!("{location}{ingested_at}"),
        None => String::new(),
    }
}
