//! Index configuration
//!
//! Settings can be built in code, through [`crate::TagIndexBuilder`], or read
//! from TOML:
//!
//! ```toml
//! backend = "sorted"
//! hash_bits = 10
//! initial_tag_capacity = 16
//! expr_cache_size = 128
//! ```
//!
//! Missing keys fall back to their defaults.

use crate::core::element::Backend;
use crate::core::table::hash::{MAX_HASH_BITS, MIN_HASH_BITS};
use crate::error::{Result, TagError};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_HASH_BITS: u32 = 8;
pub const DEFAULT_TAG_CAPACITY: usize = 2;
pub const DEFAULT_EXPR_CACHE_SIZE: usize = 64;

/// Tag index configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Set backend used for every tag bucket
    pub backend: Backend,

    /// Bucket count exponent; the table has `2^hash_bits` chains for its
    /// whole lifetime
    pub hash_bits: u32,

    /// Starting size of the tag id lookup array
    pub initial_tag_capacity: usize,

    /// Number of parsed expressions kept by [`crate::TagIndex`]; 0 disables
    /// the cache
    pub expr_cache_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            backend: Backend::default(),
            hash_bits: DEFAULT_HASH_BITS,
            initial_tag_capacity: DEFAULT_TAG_CAPACITY,
            expr_cache_size: DEFAULT_EXPR_CACHE_SIZE,
        }
    }
}

impl IndexConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: IndexConfig =
            toml::from_str(s).map_err(|e| TagError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| TagError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_HASH_BITS..=MAX_HASH_BITS).contains(&self.hash_bits) {
            return Err(TagError::Config(format!(
                "hash_bits must be in {}..={}, got {}",
                MIN_HASH_BITS, MAX_HASH_BITS, self.hash_bits
            )));
        }
        if self.initial_tag_capacity == 0 {
            return Err(TagError::Config(
                "initial_tag_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of hash chains
    pub fn bucket_count(&self) -> usize {
        1usize << self.hash_bits
    }
}
