//! Configuration for component derivation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PosattrError, Result};

/// Number of token positions between two checkpoints of a compressed stream.
pub const SYNC_INTERVAL: usize = 128;

/// Longest code the entropy coder may assign.
pub const MAX_CODE_LEN: usize = 31;

/// Number of per-length slots stored in a code descriptor.
pub const CODE_LEN_SLOTS: usize = 32;

/// Largest corpus position or file offset representable in the wire format.
pub const MAX_WIRE_VALUE: u64 = i32::MAX as u64;

/// Configuration for building and compressing attribute components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of postings the reversed-index builder may buffer per pass.
    pub memory_limit_items: usize,

    /// Block size (in tokens) of the frequency scan.
    pub frequency_block_items: usize,

    /// Whether to verify compressed components against their sources.
    pub validate: bool,

    /// Whether to delete uncompressed sources after a passing validation.
    pub delete_uncompressed: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            memory_limit_items: 16 * 1024 * 1024,
            frequency_block_items: 64 * 1024,
            validate: true,
            delete_uncompressed: false,
        }
    }
}

impl StoreConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| PosattrError::io_at(path, "read", e))?;
        let config: StoreConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the reversed-index buffer limit.
    pub fn with_memory_limit(mut self, items: usize) -> Self {
        self.memory_limit_items = items;
        self
    }

    /// Check the configuration for unusable values.
    pub fn validate(&self) -> Result<()> {
        if self.frequency_block_items == 0 {
            return Err(PosattrError::config(
                "frequency_block_items must be greater than zero",
            ));
        }
        if self.delete_uncompressed && !self.validate {
            return Err(PosattrError::config(
                "delete_uncompressed requires validate to be enabled",
            ));
        }
        Ok(())
    }

    /// Effective buffer limit, never below one item.
    pub fn buffer_limit(&self) -> usize {
        self.memory_limit_items.max(1)
    }
}
