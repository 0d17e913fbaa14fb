use serde::{Deserialize, Serialize};

use crate::error::{ValueError, ValueResult};

/// Tuning knobs for a [`ValueStore`](crate::ValueStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueStoreConfig {
    /// Pending-write bytes that trigger an automatic flush.
    pub pending_flush_bytes: u64,
    /// Decoded values kept in the LRU cache.
    pub value_cache_entries: usize,
    /// Leaf chunks prefetched per batch by forward iteration.
    pub read_ahead: usize,
    /// Threads in the fan-out pool for batched reads.
    pub workers: usize,
    /// Re-hash every chunk read from the backing store.
    pub validate_reads: bool,
}

impl Default for ValueStoreConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism().map_or(4, |n| n.get());
        Self {
            pending_flush_bytes: 64 * 1024 * 1024,
            value_cache_entries: 4096,
            read_ahead: 16,
            workers: parallelism.min(8),
            validate_reads: false,
        }
    }
}

impl ValueStoreConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> ValueResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ValueError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ValueResult<()> {
        if self.workers == 0 {
            return Err(ValueError::Config("workers must be at least 1".into()));
        }
        if self.value_cache_entries == 0 {
            return Err(ValueError::Config("value_cache_entries must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ValueStoreConfig::default();
        assert_eq!(c.pending_flush_bytes, 64 * 1024 * 1024);
        assert_eq!(c.value_cache_entries, 4096);
        assert_eq!(c.read_ahead, 16);
        assert!((1..=8).contains(&c.workers));
        assert!(!c.validate_reads);
    }

    #[test]
    fn toml_overrides_some_keys() {
        let c = ValueStoreConfig::from_toml_str("validate_reads = true\nread_ahead = 4\n").unwrap();
        assert!(c.validate_reads);
        assert_eq!(c.read_ahead, 4);
        assert_eq!(c.value_cache_entries, 4096);
    }

    #[test]
    fn toml_rejects_bad_values() {
        assert!(matches!(
            ValueStoreConfig::from_toml_str("workers = 0"),
            Err(ValueError::Config(_))
        ));
        assert!(ValueStoreConfig::from_toml_str("read_ahead = \"lots\"").is_err());
    }
}
