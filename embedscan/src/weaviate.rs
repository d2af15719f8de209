//! Weaviate segment store.
//!
//! Provides [`WeaviateScanStore`], which walks a class with the REST
//! `/v1/objects` listing and its `after` cursor. The cursor is the id of the
//! last object returned, so no server-side state needs releasing.
//!
//! This module is only available when the `weaviate` feature is enabled.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::backend::{BackendKind, ScrollBatch, ScrollScan, SegmentStore};
use crate::error::Result;
use crate::http::{Auth, RestClient, env_var, flatten_metadata};
use crate::metadata::SegmentRecord;

const BACKEND: &str = "weaviate";

/// A [`SegmentStore`] backed by [Weaviate](https://weaviate.io/).
///
/// The collection name is the Weaviate class name.
pub struct WeaviateScanStore {
    client: RestClient,
}

impl WeaviateScanStore {
    /// Create a store talking to the Weaviate instance at `url`.
    pub fn new(url: &str) -> Self {
        Self { client: RestClient::new(BACKEND, url) }
    }

    /// Create a store from `WEAVIATE_URL` and the optional `WEAVIATE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let store = Self::new(&env_var(BACKEND, "WEAVIATE_URL")?);
        Ok(match std::env::var("WEAVIATE_API_KEY") {
            Ok(key) => store.with_api_key(key),
            Err(_) => store,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.client = self.client.with_auth(Auth::Bearer(key.into()));
        self
    }
}

#[derive(Deserialize)]
struct ObjectsResponse {
    #[serde(default)]
    objects: Vec<WeaviateObject>,
}

#[derive(Deserialize)]
struct WeaviateObject {
    id: String,
    #[serde(default)]
    properties: Value,
}

#[async_trait]
impl ScrollScan for WeaviateScanStore {
    async fn scroll(
        &self,
        collection: &str,
        token: Option<&str>,
        batch_size: usize,
    ) -> Result<ScrollBatch> {
        let limit = batch_size.to_string();
        let mut params = vec![("class", collection), ("limit", limit.as_str())];
        if let Some(after) = token {
            params.push(("after", after));
        }

        let response: ObjectsResponse =
            self.client.send(self.client.get("v1/objects").query(&params)).await?;

        let records: Vec<SegmentRecord> = response
            .objects
            .into_iter()
            .map(|obj| SegmentRecord::new(obj.id, flatten_metadata(&obj.properties, "metadata")))
            .collect();
        let next_token = records.last().map(|r| r.embedding_id.clone());
        Ok(ScrollBatch { records, next_token })
    }
}

impl SegmentStore for WeaviateScanStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Weaviate
    }

    fn scroll_scan(self: Arc<Self>) -> Option<Arc<dyn ScrollScan>> {
        Some(self)
    }
}
