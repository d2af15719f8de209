//! Builds a backend adapter from command-line arguments.
//!
//! Each adapter is compiled in only with its cargo feature; asking for one
//! that is missing is reported instead of silently falling back.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use embedscan::{BackendKind, InMemorySegmentStore, Metadata, SegmentRecord, SegmentStore};
use serde::Deserialize;

/// Where and how to reach a backend.
#[derive(Debug, Default, Clone)]
pub struct Endpoint {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

impl Endpoint {
    fn url(&self, kind: BackendKind) -> Result<&str> {
        self.url.as_deref().ok_or_else(|| anyhow!("--url is required for the {kind} backend"))
    }
}

/// Connect to `kind`. `input` seeds the in-memory backend.
pub async fn connect(
    kind: BackendKind,
    endpoint: &Endpoint,
    store: &str,
    input: Option<&Path>,
) -> Result<Arc<dyn SegmentStore>> {
    match kind {
        BackendKind::InMemory => in_memory(store, input).await,
        BackendKind::PgVector => pgvector(endpoint).await,
        BackendKind::Qdrant => qdrant(endpoint),
        BackendKind::Chroma => chroma(endpoint),
        BackendKind::Elasticsearch | BackendKind::OpenSearch => elasticsearch(kind, endpoint),
        BackendKind::AiSearch => ai_search(endpoint),
        BackendKind::Weaviate => weaviate(endpoint),
        BackendKind::Milvus => milvus(endpoint),
        BackendKind::Pinecone => bail!("the pinecone backend cannot be enumerated"),
    }
}

#[derive(Deserialize)]
struct InputSegment {
    #[serde(alias = "id")]
    embedding_id: String,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

/// Parse JSON Lines of `{"embedding_id": .., "metadata": {..}}` objects.
pub fn parse_segments(text: &str) -> Result<Vec<SegmentRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let segment: InputSegment = serde_json::from_str(line)
                .with_context(|| format!("line {}: invalid segment", n + 1))?;
            let metadata = Metadata::from_json_object(&segment.metadata);
            Ok(SegmentRecord::new(segment.embedding_id, metadata))
        })
        .collect()
}

async fn in_memory(store: &str, input: Option<&Path>) -> Result<Arc<dyn SegmentStore>> {
    let memory = InMemorySegmentStore::new();
    memory.create_collection(store).await;
    if let Some(path) = input {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let segments = parse_segments(&text)?;
        tracing::debug!(path = %path.display(), segments = segments.len(), "loaded segments");
        memory.insert(store, segments).await;
    }
    Ok(Arc::new(memory))
}

#[cfg(not(all(
    feature = "pgvector",
    feature = "qdrant",
    feature = "chroma",
    feature = "elasticsearch",
    feature = "ai-search",
    feature = "weaviate",
    feature = "milvus"
)))]
fn not_compiled(feature: &str) -> anyhow::Error {
    anyhow!("this build does not include the `{feature}` backend (enable the `{feature}` feature)")
}

#[cfg(feature = "pgvector")]
async fn pgvector(endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    let url = endpoint.url(BackendKind::PgVector)?;
    let store = embedscan::pgvector::PgVectorScanStore::new(url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "pgvector"))]
async fn pgvector(_endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    Err(not_compiled("pgvector"))
}

#[cfg(feature = "qdrant")]
fn qdrant(endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    use embedscan::qdrant::QdrantScanStore;

    let url = endpoint.url(BackendKind::Qdrant)?;
    let store = match &endpoint.api_key {
        Some(key) => QdrantScanStore::with_api_key(url, key.clone())?,
        None => QdrantScanStore::new(url)?,
    };
    Ok(Arc::new(store))
}

#[cfg(not(feature = "qdrant"))]
fn qdrant(_endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    Err(not_compiled("qdrant"))
}

#[cfg(feature = "chroma")]
fn chroma(endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    let mut store = embedscan::chroma::ChromaScanStore::new(endpoint.url(BackendKind::Chroma)?);
    if let Some(token) = &endpoint.api_key {
        store = store.with_token(token.clone());
    }
    Ok(Arc::new(store))
}

#[cfg(not(feature = "chroma"))]
fn chroma(_endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    Err(not_compiled("chroma"))
}

#[cfg(feature = "elasticsearch")]
fn elasticsearch(kind: BackendKind, endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    use embedscan::elasticsearch::ElasticsearchScanStore;

    let url = endpoint.url(kind)?;
    let mut store = match kind {
        BackendKind::OpenSearch => ElasticsearchScanStore::opensearch(url),
        _ => ElasticsearchScanStore::new(url),
    };
    if let Some(key) = &endpoint.api_key {
        store = store.with_api_key(key.clone());
    }
    Ok(Arc::new(store))
}

#[cfg(not(feature = "elasticsearch"))]
fn elasticsearch(_kind: BackendKind, _endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    Err(not_compiled("elasticsearch"))
}

#[cfg(feature = "ai-search")]
fn ai_search(endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    let url = endpoint.url(BackendKind::AiSearch)?;
    let key =
        endpoint.api_key.clone().context("--api-key is required for the ai-search backend")?;
    Ok(Arc::new(embedscan::aisearch::AiSearchScanStore::new(url, key)))
}

#[cfg(not(feature = "ai-search"))]
fn ai_search(_endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    Err(not_compiled("ai-search"))
}

#[cfg(feature = "weaviate")]
fn weaviate(endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    let url = endpoint.url(BackendKind::Weaviate)?;
    let mut store = embedscan::weaviate::WeaviateScanStore::new(url);
    if let Some(key) = &endpoint.api_key {
        store = store.with_api_key(key.clone());
    }
    Ok(Arc::new(store))
}

#[cfg(not(feature = "weaviate"))]
fn weaviate(_endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    Err(not_compiled("weaviate"))
}

#[cfg(feature = "milvus")]
fn milvus(endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    let mut store = embedscan::milvus::MilvusScanStore::new(endpoint.url(BackendKind::Milvus)?);
    if let Some(token) = &endpoint.api_key {
        store = store.with_token(token.clone());
    }
    Ok(Arc::new(store))
}

#[cfg(not(feature = "milvus"))]
fn milvus(_endpoint: &Endpoint) -> Result<Arc<dyn SegmentStore>> {
    Err(not_compiled("milvus"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedscan::fields;

    #[test]
    fn parses_json_lines_and_skips_blank_lines() {
        let text = r#"
{"embedding_id": "a", "metadata": {"source_id": "doc", "index": 0}}

{"id": "b", "metadata": {"source_id": "doc", "index": 1.0}}
"#;
        let segments = parse_segments(text).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].embedding_id, "b");
        assert_eq!(segments[1].metadata.int_field(fields::INDEX), Some(1));
    }

    #[test]
    fn reports_the_offending_line() {
        let err = parse_segments("{\"embedding_id\": \"a\"}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn remote_backends_need_a_url() {
        let result = connect(BackendKind::Chroma, &Endpoint::default(), "docs", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn in_memory_backend_loads_input_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"embedding_id": "a", "metadata": {{"url": "https://x", "index": 2}}}}"#)
            .unwrap();

        let store = connect(BackendKind::InMemory, &Endpoint::default(), "docs", Some(file.path()))
            .await
            .unwrap();
        let listing = embedscan::list_sources("docs", store, 10).await.unwrap();
        assert_eq!(listing.source_count, 1);
        assert_eq!(listing.sources[0].segment_count, 3);
    }

    #[tokio::test]
    async fn pinecone_is_refused() {
        let result = connect(BackendKind::Pinecone, &Endpoint::default(), "docs", None).await;
        assert!(result.is_err());
    }
}
