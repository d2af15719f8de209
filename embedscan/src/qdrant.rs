//! Qdrant segment store.
//!
//! Provides [`QdrantScanStore`], which walks a collection with the
//! [qdrant-client](https://docs.rs/qdrant-client) `scroll` call over gRPC,
//! following `next_page_offset` and never requesting vectors.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use embedscan::qdrant::QdrantScanStore;
//!
//! let store = QdrantScanStore::new("http://localhost:6334")?;
//! let listing = embedscan::list_sources("docs", Arc::new(store), 500).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{PointId, ScrollPointsBuilder, Value as QdrantValue};
use tracing::debug;

use crate::backend::{BackendKind, ScrollBatch, ScrollScan, SegmentStore};
use crate::error::{Result, ScanError};
use crate::metadata::{Metadata, MetadataValue, SegmentRecord};

const BACKEND: &str = "qdrant";
const NUM_PREFIX: &str = "num:";
const UUID_PREFIX: &str = "uuid:";

/// A [`SegmentStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// Segment metadata is read from the point payload. Fields of a nested
/// `metadata` object override top-level payload fields.
pub struct QdrantScanStore {
    client: Qdrant,
}

impl QdrantScanStore {
    /// Connect to the Qdrant server at `url`.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Connect to the Qdrant server at `url` with an API key.
    pub fn with_api_key(url: &str, api_key: impl Into<String>) -> Result<Self> {
        let client = Qdrant::from_url(url).api_key(api_key.into()).build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Connect using `QDRANT_URL` and the optional `QDRANT_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("QDRANT_URL").map_err(|_| {
            ScanError::ConfigError("qdrant: QDRANT_URL environment variable not set".into())
        })?;
        let mut builder = Qdrant::from_url(&url);
        if let Ok(key) = std::env::var("QDRANT_API_KEY") {
            builder = builder.api_key(key);
        }
        Ok(Self { client: builder.build().map_err(Self::map_err)? })
    }

    /// Use an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn map_err(e: qdrant_client::QdrantError) -> ScanError {
        ScanError::backend(BACKEND, e.to_string())
    }
}

/// Render a point id as a scroll token that keeps its numeric/uuid form.
fn encode_token(id: &PointId) -> Option<String> {
    match id.point_id_options.as_ref()? {
        PointIdOptions::Num(n) => Some(format!("{NUM_PREFIX}{n}")),
        PointIdOptions::Uuid(u) => Some(format!("{UUID_PREFIX}{u}")),
    }
}

fn decode_token(token: &str) -> Result<PointId> {
    if let Some(n) = token.strip_prefix(NUM_PREFIX) {
        let n: u64 = n
            .parse()
            .map_err(|_| ScanError::backend(BACKEND, format!("invalid scroll token '{token}'")))?;
        return Ok(PointId::from(n));
    }
    match token.strip_prefix(UUID_PREFIX) {
        Some(uuid) => Ok(PointId::from(uuid.to_string())),
        None => Err(ScanError::backend(BACKEND, format!("invalid scroll token '{token}'"))),
    }
}

fn point_id_string(id: Option<&PointId>) -> Option<String> {
    match id?.point_id_options.as_ref()? {
        PointIdOptions::Num(n) => Some(n.to_string()),
        PointIdOptions::Uuid(u) => Some(u.clone()),
    }
}

fn metadata_value(value: &QdrantValue) -> Option<MetadataValue> {
    match value.kind.as_ref()? {
        Kind::StringValue(s) => Some(MetadataValue::Str(s.clone())),
        Kind::IntegerValue(i) => Some(MetadataValue::Int(*i)),
        Kind::DoubleValue(d) if d.fract() == 0.0 && d.is_finite() => {
            Some(MetadataValue::Int(*d as i64))
        }
        Kind::DoubleValue(d) => Some(MetadataValue::Str(d.to_string())),
        Kind::BoolValue(b) => Some(MetadataValue::Str(b.to_string())),
        Kind::NullValue(_) => Some(MetadataValue::Null),
        Kind::StructValue(_) | Kind::ListValue(_) => None,
    }
}

fn payload_metadata(payload: &HashMap<String, QdrantValue>) -> Metadata {
    let mut metadata = Metadata::new();
    for (key, value) in payload {
        if let Some(value) = metadata_value(value) {
            metadata.insert(key.clone(), value);
        }
    }
    if let Some(Kind::StructValue(nested)) = payload.get("metadata").and_then(|v| v.kind.as_ref())
    {
        for (key, value) in &nested.fields {
            if let Some(value) = metadata_value(value) {
                metadata.insert(key.clone(), value);
            }
        }
    }
    metadata
}

#[async_trait]
impl ScrollScan for QdrantScanStore {
    async fn scroll(
        &self,
        collection: &str,
        token: Option<&str>,
        batch_size: usize,
    ) -> Result<ScrollBatch> {
        let mut request = ScrollPointsBuilder::new(collection)
            .limit(u32::try_from(batch_size).unwrap_or(u32::MAX))
            .with_payload(true)
            .with_vectors(false);
        if let Some(token) = token {
            request = request.offset(decode_token(token)?);
        }

        let response = self.client.scroll(request).await.map_err(Self::map_err)?;

        let records: Vec<SegmentRecord> = response
            .result
            .iter()
            .filter_map(|point| {
                let id = point_id_string(point.id.as_ref())?;
                Some(SegmentRecord::new(id, payload_metadata(&point.payload)))
            })
            .collect();
        let next_token = response.next_page_offset.as_ref().and_then(encode_token);
        debug!(collection, points = records.len(), more = next_token.is_some(), "scrolled qdrant");

        Ok(ScrollBatch { records, next_token })
    }
}

impl SegmentStore for QdrantScanStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Qdrant
    }

    fn scroll_scan(self: Arc<Self>) -> Option<Arc<dyn ScrollScan>> {
        Some(self)
    }
}
