//! Shared plumbing for the REST-based adapters.

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::error;

use crate::error::{Result, ScanError};

/// How requests are authenticated.
#[derive(Clone)]
pub(crate) enum Auth {
    None,
    Bearer(String),
    Header { name: &'static str, value: String },
    Basic { username: String, password: Option<String> },
}

/// A `reqwest` client bound to one backend's base URL.
#[derive(Clone)]
pub(crate) struct RestClient {
    client: reqwest::Client,
    base_url: String,
    backend: &'static str,
    auth: Auth,
}

impl RestClient {
    pub(crate) fn new(backend: &'static str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            backend,
            auth: Auth::None,
        }
    }

    pub(crate) fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub(crate) fn backend(&self) -> &'static str {
        self.backend
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(self.url(path)))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(self.url(path)))
    }

    pub(crate) fn delete(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.delete(self.url(path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::None => request,
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Header { name, value } => request.header(*name, value),
            Auth::Basic { username, password } => request.basic_auth(username, password.as_ref()),
        }
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> ScanError {
        ScanError::backend(self.backend, message)
    }

    /// Send a request and decode a JSON response body.
    pub(crate) async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send_raw(request).await?;
        response.json().await.map_err(|e| {
            error!(backend = self.backend, error = %e, "failed to parse response");
            self.error(format!("failed to parse response: {e}"))
        })
    }

    /// Send a request, failing on a non-success status.
    pub(crate) async fn send_raw(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            error!(backend = self.backend, error = %e, "request failed");
            self.error(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(backend = self.backend, %status, "API error");
            return Err(self.error(format!("API returned {status}: {body}")));
        }

        Ok(response)
    }
}

/// Read the required environment variable, naming the backend on failure.
pub(crate) fn env_var(backend: &'static str, name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| {
        ScanError::ConfigError(format!("{backend}: {name} environment variable not set"))
    })
}

/// Flatten a JSON document into segment metadata.
///
/// Scalar top-level fields are taken as-is and fields of a nested object
/// named `nested` (when present) override them.
pub(crate) fn flatten_metadata(
    document: &serde_json::Value,
    nested: &str,
) -> crate::metadata::Metadata {
    let mut metadata = document
        .as_object()
        .map(crate::metadata::Metadata::from_json_object)
        .unwrap_or_default();
    if let Some(inner) = document.get(nested).and_then(serde_json::Value::as_object) {
        for (key, value) in inner {
            if let Some(value) = crate::metadata::MetadataValue::from_json(value) {
                metadata.insert(key.clone(), value);
            }
        }
    }
    metadata
}
