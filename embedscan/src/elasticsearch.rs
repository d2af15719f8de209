//! Elasticsearch and OpenSearch segment store.
//!
//! Provides [`ElasticsearchScanStore`], which walks an index with the scroll
//! API sorted by `_doc`. The scroll context is cleared when the scan ends,
//! whether it finished or failed.
//!
//! This module is only available when the `elasticsearch` feature is enabled.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::backend::{BackendKind, ScrollBatch, ScrollScan, SegmentStore};
use crate::error::Result;
use crate::http::{Auth, RestClient, env_var, flatten_metadata};
use crate::metadata::{SegmentRecord, fields};

const DEFAULT_KEEP_ALIVE: &str = "2m";

/// A [`SegmentStore`] backed by Elasticsearch or OpenSearch.
///
/// Segment metadata is read from `_source`, either as top-level fields or
/// nested under a `metadata` object.
pub struct ElasticsearchScanStore {
    client: RestClient,
    kind: BackendKind,
    keep_alive: String,
}

impl ElasticsearchScanStore {
    /// Create a store talking to the Elasticsearch cluster at `url`.
    pub fn new(url: &str) -> Self {
        Self::with_kind(BackendKind::Elasticsearch, "elasticsearch", url)
    }

    /// Create a store talking to the OpenSearch cluster at `url`.
    pub fn opensearch(url: &str) -> Self {
        Self::with_kind(BackendKind::OpenSearch, "opensearch", url)
    }

    fn with_kind(kind: BackendKind, backend: &'static str, url: &str) -> Self {
        Self {
            client: RestClient::new(backend, url),
            kind,
            keep_alive: DEFAULT_KEEP_ALIVE.to_string(),
        }
    }

    /// Create a store from `ELASTICSEARCH_URL` and the optional
    /// `ELASTICSEARCH_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let store = Self::new(&env_var("elasticsearch", "ELASTICSEARCH_URL")?);
        Ok(match std::env::var("ELASTICSEARCH_API_KEY") {
            Ok(key) => store.with_api_key(key),
            Err(_) => store,
        })
    }

    /// Authenticate with an `Authorization: ApiKey ...` header.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.client = self.client.with_auth(Auth::Header {
            name: "authorization",
            value: format!("ApiKey {}", key.into()),
        });
        self
    }

    /// Authenticate with HTTP basic auth.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.client = self.client.with_auth(Auth::Basic {
            username: username.into(),
            password: Some(password.into()),
        });
        self
    }

    /// How long the server keeps a scroll context alive between batches.
    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = keep_alive.into();
        self
    }

    fn open_body(batch_size: usize) -> Value {
        let mut source = vec!["metadata".to_string()];
        source.extend(fields::ALL.iter().map(|f| f.to_string()));
        json!({
            "size": batch_size,
            "sort": ["_doc"],
            "_source": source,
            "query": { "match_all": {} },
        })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[async_trait]
impl ScrollScan for ElasticsearchScanStore {
    async fn scroll(
        &self,
        collection: &str,
        token: Option<&str>,
        batch_size: usize,
    ) -> Result<ScrollBatch> {
        let request = match token {
            None => self
                .client
                .post(&format!("{collection}/_search"))
                .query(&[("scroll", self.keep_alive.as_str())])
                .json(&Self::open_body(batch_size)),
            Some(scroll_id) => self
                .client
                .post("_search/scroll")
                .json(&json!({ "scroll": self.keep_alive, "scroll_id": scroll_id })),
        };
        let response: SearchResponse = self.client.send(request).await?;

        let records: Vec<SegmentRecord> = response
            .hits
            .hits
            .into_iter()
            .map(|hit| SegmentRecord::new(hit.id, flatten_metadata(&hit.source, "metadata")))
            .collect();
        debug!(
            backend = self.client.backend(),
            index = collection,
            hits = records.len(),
            "scroll batch"
        );

        // The scroll id stays valid after the last batch; an empty batch ends
        // the iterator and the context is cleared through `release`.
        let next_token = response.scroll_id.or_else(|| token.map(str::to_string));
        Ok(ScrollBatch { records, next_token })
    }

    async fn release(&self, collection: &str, token: &str) -> Result<()> {
        debug!(backend = self.client.backend(), index = collection, "clearing scroll context");
        self.client
            .send_raw(self.client.delete("_search/scroll").json(&json!({ "scroll_id": token })))
            .await?;
        Ok(())
    }
}

impl SegmentStore for ElasticsearchScanStore {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn scroll_scan(self: Arc<Self>) -> Option<Arc<dyn ScrollScan>> {
        Some(self)
    }
}
