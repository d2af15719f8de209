//! Azure AI Search segment store.
//!
//! AI Search has no listing primitive that survives large indexes, so
//! [`AiSearchScanStore`] implements [`FilteredQueryScan`] and is walked with
//! the keyset cursor. Each page is a search request whose OData filter keeps
//! only documents after the current `(ingestion_datetime, index, id)`
//! boundary, ordered ascending on the same triple.
//!
//! This module is only available when the `ai-search` feature is enabled.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::backend::{BackendKind, FilteredQueryScan, KeysetQuery, SegmentStore};
use crate::cursor::KeysetBoundary;
use crate::error::Result;
use crate::http::{Auth, RestClient, env_var};
use crate::metadata::{Metadata, SegmentRecord, fields};

const BACKEND: &str = "ai-search";
const DEFAULT_API_VERSION: &str = "2024-07-01";
const DEFAULT_KEY_FIELD: &str = "id";

/// A [`SegmentStore`] backed by an Azure AI Search index.
///
/// The index must expose `ingestion_datetime` (as an `Edm.String` holding
/// RFC 3339 UTC timestamps) and `index` as filterable and sortable fields.
pub struct AiSearchScanStore {
    client: RestClient,
    api_version: String,
    key_field: String,
}

impl AiSearchScanStore {
    /// Create a store for the search service at `endpoint`, authenticated
    /// with an admin or query key.
    pub fn new(endpoint: &str, api_key: impl Into<String>) -> Self {
        Self {
            client: RestClient::new(BACKEND, endpoint)
                .with_auth(Auth::Header { name: "api-key", value: api_key.into() }),
            api_version: DEFAULT_API_VERSION.to_string(),
            key_field: DEFAULT_KEY_FIELD.to_string(),
        }
    }

    /// Create a store from `AZURE_SEARCH_ENDPOINT` and `AZURE_SEARCH_API_KEY`.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            &env_var(BACKEND, "AZURE_SEARCH_ENDPOINT")?,
            env_var(BACKEND, "AZURE_SEARCH_API_KEY")?,
        ))
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Name of the index's key field. Defaults to `id`.
    pub fn with_key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = field.into();
        self
    }

    fn search_body(&self, query: &KeysetQuery) -> Value {
        let mut select = vec![self.key_field.clone()];
        select.extend(fields::ALL.iter().map(|f| f.to_string()));

        let mut body = json!({
            "search": "*",
            "orderby": format!(
                "{} asc, {} asc, {} asc",
                fields::INGESTION_DATETIME,
                fields::INDEX,
                self.key_field
            ),
            "top": query.limit,
            "select": select.join(","),
        });
        if let Some(after) = &query.after {
            body["filter"] = Value::String(self.after_filter(after));
        }
        body
    }

    /// OData filter selecting documents strictly after `after`.
    fn after_filter(&self, after: &KeysetBoundary) -> String {
        let at = odata_string(&after.ingestion_datetime);
        let id = odata_string(&after.embedding_id);
        let (dt, idx, key) = (fields::INGESTION_DATETIME, fields::INDEX, &self.key_field);
        format!(
            "({dt} gt {at}) or ({dt} eq {at} and {idx} gt {index}) \
             or ({dt} eq {at} and {idx} eq {index} and {key} gt {id})",
            index = after.index,
        )
    }

    fn record(&self, mut document: Map<String, Value>) -> Option<SegmentRecord> {
        let id = match document.remove(&self.key_field)? {
            Value::String(id) => id,
            other => other.to_string(),
        };
        Some(SegmentRecord::new(id, Metadata::from_json_object(&document)))
    }
}

/// Quote a string literal for an OData expression.
fn odata_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[derive(Deserialize)]
struct SearchResponse {
    value: Vec<Map<String, Value>>,
}

#[async_trait]
impl FilteredQueryScan for AiSearchScanStore {
    /// The zero query vector carries no ranking information, so this issues a
    /// plain filtered search and ignores `query.vector` and `query.min_score`.
    async fn query(&self, collection: &str, query: &KeysetQuery) -> Result<Vec<SegmentRecord>> {
        let request = self
            .client
            .post(&format!("indexes/{collection}/docs/search"))
            .query(&[("api-version", self.api_version.as_str())])
            .json(&self.search_body(query));
        let response: SearchResponse = self.client.send(request).await?;

        Ok(response.value.into_iter().filter_map(|doc| self.record(doc)).collect())
    }
}

impl SegmentStore for AiSearchScanStore {
    fn kind(&self) -> BackendKind {
        BackendKind::AiSearch
    }

    fn filtered_query_scan(self: Arc<Self>) -> Option<Arc<dyn FilteredQueryScan>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AiSearchScanStore {
        AiSearchScanStore::new("https://search.example.net", "key")
    }

    #[test]
    fn first_page_has_no_filter() {
        let query = KeysetQuery { vector: vec![0.0; 4], min_score: 0.0, limit: 100, after: None };
        let body = store().search_body(&query);
        assert!(body.get("filter").is_none());
        assert_eq!(body["top"], 100);
        assert_eq!(body["orderby"], "ingestion_datetime asc, index asc, id asc");
    }

    #[test]
    fn filter_escapes_quotes_and_uses_the_tiebreaker() {
        let after = KeysetBoundary::new("2024-05-01T10:00:00Z", 3, "o'brien");
        let filter = store().after_filter(&after);
        assert!(filter.contains("ingestion_datetime gt '2024-05-01T10:00:00Z'"));
        assert!(filter.contains("index gt 3"));
        assert!(filter.contains("id gt 'o''brien'"));
    }

    #[test]
    fn documents_without_a_key_are_dropped() {
        let store = store();
        let with_key = json!({"id": "seg-1", "url": "https://a"});
        let without_key = json!({"url": "https://b"});
        assert!(store.record(with_key.as_object().unwrap().clone()).is_some());
        assert!(store.record(without_key.as_object().unwrap().clone()).is_none());
    }
}
