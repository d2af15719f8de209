//! Chroma segment store.
//!
//! Provides [`ChromaScanStore`], which pages through a Chroma collection with
//! the REST v2 API: one `count` call followed by `get` requests with
//! `limit`/`offset`, asking for metadatas only.
//!
//! This module is only available when the `chroma` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use embedscan::chroma::ChromaScanStore;
//! use embedscan::list_sources;
//!
//! let store = Arc::new(ChromaScanStore::new("http://localhost:8000"));
//! let listing = list_sources("docs", store, 500).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::{BackendKind, CountedOffsetScan, OffsetScan, SegmentStore};
use crate::error::Result;
use crate::http::{Auth, RestClient, env_var};
use crate::metadata::{Metadata, SegmentRecord};

const BACKEND: &str = "chroma";
const DEFAULT_TENANT: &str = "default_tenant";
const DEFAULT_DATABASE: &str = "default_database";

/// A [`SegmentStore`] backed by [Chroma](https://www.trychroma.com/).
///
/// Collection names are resolved to Chroma collection ids once and cached.
pub struct ChromaScanStore {
    client: RestClient,
    tenant: String,
    database: String,
    collection_ids: RwLock<HashMap<String, String>>,
}

impl ChromaScanStore {
    /// Create a store talking to the Chroma server at `url`.
    pub fn new(url: &str) -> Self {
        Self {
            client: RestClient::new(BACKEND, url),
            tenant: DEFAULT_TENANT.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            collection_ids: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store from `CHROMA_URL` and the optional `CHROMA_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let store = Self::new(&env_var(BACKEND, "CHROMA_URL")?);
        Ok(match std::env::var("CHROMA_TOKEN") {
            Ok(token) => store.with_token(token),
            Err(_) => store,
        })
    }

    /// Authenticate with an `x-chroma-token` header.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.client =
            self.client.with_auth(Auth::Header { name: "x-chroma-token", value: token.into() });
        self
    }

    /// Use a tenant and database other than Chroma's defaults.
    pub fn with_database(mut self, tenant: impl Into<String>, database: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self.database = database.into();
        self
    }

    fn collections_path(&self) -> String {
        format!("api/v2/tenants/{}/databases/{}/collections", self.tenant, self.database)
    }

    async fn collection_id(&self, name: &str) -> Result<String> {
        if let Some(id) = self.collection_ids.read().await.get(name) {
            return Ok(id.clone());
        }

        let path = format!("{}/{name}", self.collections_path());
        let collection: CollectionResponse = self.client.send(self.client.get(&path)).await?;
        debug!(collection = name, id = %collection.id, "resolved chroma collection");

        self.collection_ids.write().await.insert(name.to_string(), collection.id.clone());
        Ok(collection.id)
    }
}

// ── Chroma API request/response types ──────────────────────────────

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Serialize)]
struct GetRequest {
    limit: usize,
    offset: u64,
    include: [&'static str; 1],
}

#[derive(Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    metadatas: Option<Vec<Option<serde_json::Map<String, serde_json::Value>>>>,
}

// ── Scan primitives ────────────────────────────────────────────────

#[async_trait]
impl OffsetScan for ChromaScanStore {
    async fn fetch_offset(
        &self,
        collection: &str,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<SegmentRecord>> {
        let id = self.collection_id(collection).await?;
        let path = format!("{}/{id}/get", self.collections_path());
        let body = GetRequest { limit, offset, include: ["metadatas"] };
        let response: GetResponse = self.client.send(self.client.post(&path).json(&body)).await?;

        let metadatas = response.metadatas.unwrap_or_default();
        Ok(response
            .ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| {
                let metadata = metadatas
                    .get(i)
                    .and_then(Option::as_ref)
                    .map(Metadata::from_json_object)
                    .unwrap_or_default();
                SegmentRecord::new(id, metadata)
            })
            .collect())
    }
}

#[async_trait]
impl CountedOffsetScan for ChromaScanStore {
    async fn count(&self, collection: &str) -> Result<u64> {
        let id = self.collection_id(collection).await?;
        let path = format!("{}/{id}/count", self.collections_path());
        self.client.send(self.client.get(&path)).await
    }
}

impl SegmentStore for ChromaScanStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Chroma
    }

    fn offset_scan(self: Arc<Self>) -> Option<Arc<dyn OffsetScan>> {
        Some(self)
    }

    fn counted_offset_scan(self: Arc<Self>) -> Option<Arc<dyn CountedOffsetScan>> {
        Some(self)
    }
}
