//! Configuration for source listing scans.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Default number of segments requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Configuration parameters for a source listing scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    /// Segments requested per page (a batch-size hint for iterator backends).
    pub page_size: usize,
    /// Dimensionality of the zero query vector used by keyset scans.
    pub embedding_dimensions: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { page_size: DEFAULT_PAGE_SIZE, embedding_dimensions: 0 }
    }
}

impl ScanConfig {
    /// Create a new builder for constructing a [`ScanConfig`].
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Check the parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::ConfigError`] if `page_size == 0`.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ScanError::ConfigError("page_size must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`ScanConfig`].
#[derive(Debug, Clone, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Set the number of segments requested per page.
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the embedding dimensionality used for keyset query vectors.
    pub fn embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.config.embedding_dimensions = dimensions;
        self
    }

    /// Build the [`ScanConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::ConfigError`] if `page_size == 0`.
    pub fn build(self) -> Result<ScanConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
