//! World configuration
//!
//! Sizing inputs consumed by the storage core. Loadable from JSON; missing
//! fields fall back to the defaults below.

use serde::{Deserialize, Serialize};

use crate::bitset::MAX_COMPONENTS;
use crate::error::{EcsError, Result};

/// Default byte budget of one chunk (all arrays together)
pub const DEFAULT_CHUNK_BYTES: usize = 16 * 1024;

/// Largest accepted chunk budget
pub const MAX_CHUNK_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Target size of a chunk; capacity = chunk_bytes / per-entity width
    pub chunk_bytes: usize,
    /// Cap on distinct component types, at most the signature width
    pub max_component_types: usize,
    pub initial_entity_capacity: usize,
    pub initial_archetype_capacity: usize,
    /// Move emptied chunks to the tail of their archetype
    pub compact_empty_chunks: bool,
    /// Fire `ComponentRemoved` for every component of a despawned entity
    pub notify_removed_on_despawn: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            max_component_types: MAX_COMPONENTS,
            initial_entity_capacity: 1024,
            initial_archetype_capacity: 64,
            compact_empty_chunks: true,
            notify_removed_on_despawn: true,
        }
    }
}

impl WorldConfig {
    /// Parse a JSON document and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: WorldConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_bytes == 0 {
            tracing::warn!("rejected world config with zero chunk budget");
            return Err(EcsError::InvalidConfig("chunk_bytes must be non-zero".into()));
        }
        if self.chunk_bytes > MAX_CHUNK_BYTES {
            tracing::warn!(chunk_bytes = self.chunk_bytes, "rejected world config with oversized chunk budget");
            return Err(EcsError::InvalidConfig(format!(
                "chunk_bytes must be at most {MAX_CHUNK_BYTES}, got {}",
                self.chunk_bytes
            )));
        }
        if self.max_component_types == 0 || self.max_component_types > MAX_COMPONENTS {
            tracing::warn!(
                max_component_types = self.max_component_types,
                "rejected world config with out-of-range type cap"
            );
            return Err(EcsError::InvalidConfig(format!(
                "max_component_types must be in 1..={MAX_COMPONENTS}, got {}",
                self.max_component_types
            )));
        }
        Ok(())
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes;
        self
    }

    pub fn with_max_component_types(mut self, max: usize) -> Self {
        self.max_component_types = max;
        self
    }

    pub fn with_compaction(mut self, enabled: bool) -> Self {
        self.compact_empty_chunks = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = WorldConfig::from_json_str(r#"{ "chunk_bytes": 4096 }"#).unwrap();
        assert_eq!(config.chunk_bytes, 4096);
        assert_eq!(config.max_component_types, MAX_COMPONENTS);
        assert!(config.compact_empty_chunks);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(WorldConfig::from_json_str(r#"{ "chunk_bytes": 0 }"#).is_err());
        assert!(WorldConfig::default()
            .with_max_component_types(MAX_COMPONENTS + 1)
            .validate()
            .is_err());
        assert!(WorldConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_rejects_oversized_chunk_budget() {
        let err = WorldConfig::from_json_str(r#"{ "chunk_bytes": 18446744073709551615 }"#).unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig(_)));
        assert!(WorldConfig::default()
            .with_chunk_bytes(MAX_CHUNK_BYTES + 1)
            .validate()
            .is_err());
        assert!(WorldConfig::default()
            .with_chunk_bytes(MAX_CHUNK_BYTES)
            .validate()
            .is_ok());
    }
}
