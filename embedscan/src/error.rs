//! Error types for the `embedscan` crate.

use thiserror::Error;

/// Errors that can occur while listing sources from a vector store.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A backend page fetch, count, or handle release failed.
    #[error("Backend error ({backend}): {message}")]
    Backend {
        /// The backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A source listing scan failed as a whole. No partial result exists.
    #[error("Scan of store '{store}' on {backend} failed: {source}")]
    ScanFailed {
        /// The backend the scan ran against.
        backend: String,
        /// The store (collection, index, or table) being scanned.
        store: String,
        /// The underlying failure.
        #[source]
        source: Box<ScanError>,
    },

    /// The backend exposes no primitive able to enumerate its segments.
    #[error("Unsupported backend capability ({backend}): {reason}")]
    UnsupportedCapability {
        /// The rejected backend.
        backend: String,
        /// Why the backend cannot be scanned.
        reason: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serializing a listing failed.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl ScanError {
    /// Shorthand for a [`ScanError::Backend`] error.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend { backend: backend.into(), message: message.into() }
    }
}

/// A convenience result type for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;
