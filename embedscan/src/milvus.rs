//! Milvus segment store.
//!
//! Provides [`MilvusScanStore`], which walks a collection with the REST v2
//! `entities/query` endpoint the way the Milvus query iterator does: each
//! request asks for the rows whose primary key is greater than the last key
//! seen, and Milvus returns limited query results in primary key order.
//! Requests never carry an `offset`, so the server's `offset + limit`
//! window (16384 by default) only bounds the batch size.
//!
//! This module is only available when the `milvus` feature is enabled.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::backend::{BackendKind, ScrollBatch, ScrollScan, SegmentStore};
use crate::error::{Result, ScanError};
use crate::http::{Auth, RestClient, env_var, flatten_metadata};
use crate::metadata::SegmentRecord;

const BACKEND: &str = "milvus";
const DEFAULT_ID_FIELD: &str = "id";
const DEFAULT_METADATA_FIELD: &str = "metadata";
const QUERY_RESULT_WINDOW: usize = 16_384;
const INT_PREFIX: &str = "int:";
const STR_PREFIX: &str = "str:";

/// A [`SegmentStore`] backed by [Milvus](https://milvus.io/).
pub struct MilvusScanStore {
    client: RestClient,
    database: Option<String>,
    id_field: String,
    metadata_field: String,
}

impl MilvusScanStore {
    /// Create a store talking to the Milvus server at `url`.
    pub fn new(url: &str) -> Self {
        Self {
            client: RestClient::new(BACKEND, url),
            database: None,
            id_field: DEFAULT_ID_FIELD.to_string(),
            metadata_field: DEFAULT_METADATA_FIELD.to_string(),
        }
    }

    /// Create a store from `MILVUS_URL` and the optional `MILVUS_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let store = Self::new(&env_var(BACKEND, "MILVUS_URL")?);
        Ok(match std::env::var("MILVUS_TOKEN") {
            Ok(token) => store.with_token(token),
            Err(_) => store,
        })
    }

    /// Authenticate with a bearer token (`user:password` or an API key).
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.client = self.client.with_auth(Auth::Bearer(token.into()));
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Names of the primary key and JSON metadata fields.
    pub fn with_fields(mut self, id: impl Into<String>, metadata: impl Into<String>) -> Self {
        self.id_field = id.into();
        self.metadata_field = metadata.into();
        self
    }

    fn query_request<'a>(
        &'a self,
        collection: &'a str,
        token: Option<&str>,
        batch_size: usize,
    ) -> Result<QueryRequest<'a>> {
        let filter = match token {
            Some(token) => self.after_filter(token)?,
            None => String::new(),
        };
        Ok(QueryRequest {
            db_name: self.database.as_deref(),
            collection_name: collection,
            filter,
            output_fields: [self.id_field.as_str(), self.metadata_field.as_str()],
            limit: batch_size.clamp(1, QUERY_RESULT_WINDOW),
        })
    }

    /// Boolean expression selecting rows after the key encoded in `token`.
    fn after_filter(&self, token: &str) -> Result<String> {
        if let Some(n) = token.strip_prefix(INT_PREFIX) {
            let n: i64 = n.parse().map_err(|_| invalid_token(token))?;
            return Ok(format!("{} > {n}", self.id_field));
        }
        match token.strip_prefix(STR_PREFIX) {
            Some(key) => Ok(format!("{} > {}", self.id_field, quote(key))),
            None => Err(invalid_token(token)),
        }
    }

    fn record(&self, mut entity: Map<String, Value>) -> Option<SegmentRecord> {
        let id = match entity.remove(&self.id_field)? {
            Value::String(id) => id,
            other => other.to_string(),
        };
        let metadata = flatten_metadata(&Value::Object(entity), &self.metadata_field);
        Some(SegmentRecord::new(id, metadata))
    }
}

/// Encode a primary key so the next filter keeps its int64 or varchar form.
fn encode_token(key: &Value) -> Option<String> {
    match key {
        Value::Number(n) => n.as_i64().map(|n| format!("{INT_PREFIX}{n}")),
        Value::String(s) => Some(format!("{STR_PREFIX}{s}")),
        _ => None,
    }
}

/// Quote a varchar literal for a Milvus boolean expression.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn invalid_token(token: &str) -> ScanError {
    ScanError::backend(BACKEND, format!("invalid iterator token '{token}'"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    db_name: Option<&'a str>,
    collection_name: &'a str,
    filter: String,
    output_fields: [&'a str; 2],
    limit: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<Map<String, Value>>,
}

#[async_trait]
impl ScrollScan for MilvusScanStore {
    async fn scroll(
        &self,
        collection: &str,
        token: Option<&str>,
        batch_size: usize,
    ) -> Result<ScrollBatch> {
        let body = self.query_request(collection, token, batch_size)?;
        let limit = body.limit;
        let response: QueryResponse =
            self.client.send(self.client.post("v2/vectordb/entities/query").json(&body)).await?;

        // Milvus reports failures in the body with HTTP 200.
        if response.code != 0 {
            return Err(self.client.error(format!(
                "query failed with code {}: {}",
                response.code,
                response.message.unwrap_or_default()
            )));
        }

        let next_token = if response.data.len() < limit {
            None
        } else {
            let last = response.data.last().and_then(|entity| entity.get(&self.id_field));
            let token = last.and_then(encode_token).ok_or_else(|| {
                self.client.error(format!(
                    "primary key '{}' is missing or not int64/varchar",
                    self.id_field
                ))
            })?;
            Some(token)
        };
        let records: Vec<SegmentRecord> =
            response.data.into_iter().filter_map(|entity| self.record(entity)).collect();
        debug!(collection, rows = records.len(), more = next_token.is_some(), "queried milvus");

        Ok(ScrollBatch { records, next_token })
    }
}

impl SegmentStore for MilvusScanStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Milvus
    }

    fn scroll_scan(self: Arc<Self>) -> Option<Arc<dyn ScrollScan>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fields;
    use serde_json::json;

    #[test]
    fn first_request_has_no_filter_and_no_offset() {
        let store = MilvusScanStore::new("http://localhost:19530");
        let body = store.query_request("docs", None, 100).unwrap();
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "collectionName": "docs",
                "filter": "",
                "outputFields": ["id", "metadata"],
                "limit": 100
            })
        );
    }

    #[test]
    fn requests_deep_into_a_collection_stay_inside_the_query_window() {
        let store = MilvusScanStore::new("http://localhost:19530");
        for token in [None, Some("int:1000000"), Some("str:seg-99999")] {
            let body = serde_json::to_value(store.query_request("docs", token, 50_000).unwrap())
                .unwrap();
            assert!(body.get("offset").is_none());
            assert!(body["limit"].as_u64().unwrap() <= QUERY_RESULT_WINDOW as u64);
        }
    }

    #[test]
    fn tokens_resume_after_the_last_primary_key() {
        let store = MilvusScanStore::new("http://localhost:19530").with_fields("pk", "meta");

        let token = encode_token(&json!(449)).unwrap();
        assert_eq!(store.after_filter(&token).unwrap(), "pk > 449");

        let token = encode_token(&json!("doc \"a\"")).unwrap();
        assert_eq!(store.after_filter(&token).unwrap(), r#"pk > "doc \"a\"""#);

        assert!(encode_token(&json!(1.5)).is_none());
        assert!(store.after_filter("449").is_err());
        assert!(store.after_filter("int:x").is_err());
    }

    #[test]
    fn numeric_primary_keys_become_strings() {
        let store = MilvusScanStore::new("http://localhost:19530");
        let entity = json!({"id": 449, "metadata": {"source_id": "doc", "index": 2}});
        let record = store.record(entity.as_object().unwrap().clone()).unwrap();
        assert_eq!(record.embedding_id, "449");
        assert_eq!(record.metadata.int_field(fields::INDEX), Some(2));
    }
}
