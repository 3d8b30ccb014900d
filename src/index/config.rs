//! Collection-level configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::kv::page_capacity;
use crate::vector::ElementWidth;

/// Configuration for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Page size of the document ID key pages.
    pub document_page_size: usize,

    /// Width of serialized vector values.
    pub element_width: ElementWidth,

    /// Embed and insert documents on the rayon pool in `put_documents`.
    pub parallel_embedding: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            document_page_size: 4096,
            element_width: ElementWidth::F32,
            parallel_embedding: true,
        }
    }
}

impl IndexConfig {
    /// Reject settings that cannot be used, before any I/O.
    pub fn validate(&self) -> Result<()> {
        page_capacity::<i64>(self.document_page_size)?;
        Ok(())
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: IndexConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
