//! In-memory configuration (spec §9 ambient stack): a small TOML-deserialisable
//! struct mirroring the shape of `wasmtime-internal-cache`'s on-disk
//! `CacheConfig`, scoped down to the two knobs this core actually reads.

use serde::{Deserialize, Serialize};

/// Default throttle: a fingerprint must be observed strictly more than this
/// many times before it is compiled (spec §6 "Tuning knob").
pub const DEFAULT_MIN_COUNT_TO_COMPILE: u32 = 3;

/// Default compiled-function cache capacity, in bytes.
pub const DEFAULT_CACHE_CAPACITY_BYTES: usize = 512 * 1024 * 1024;

/// Configuration for one process's expression-JIT core. Deserialisable from
/// TOML; every field has a documented default so a partial config file
/// (or none at all) is valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitConfig {
    /// See `min_count_to_compile_expression` in spec §6.
    pub min_count_to_compile: u32,
    /// Absolute byte budget for the compiled-function cache's aggregate
    /// module weight (spec §4.4, §6).
    pub cache_capacity_bytes: usize,
}

impl Default for JitConfig {
    fn default() -> Self {
        JitConfig {
            min_count_to_compile: DEFAULT_MIN_COUNT_TO_COMPILE,
            cache_capacity_bytes: DEFAULT_CACHE_CAPACITY_BYTES,
        }
    }
}

impl JitConfig {
    /// Parses a `JitConfig` from a TOML document; missing fields fall back
    /// to their defaults (`#[serde(default)]`).
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = JitConfig::from_toml_str("").unwrap();
        assert_eq!(config, JitConfig::default());
    }

    #[test]
    fn partial_document_overrides_only_named_fields() {
        let config = JitConfig::from_toml_str("min_count_to_compile = 10\n").unwrap();
        assert_eq!(config.min_count_to_compile, 10);
        assert_eq!(config.cache_capacity_bytes, DEFAULT_CACHE_CAPACITY_BYTES);
    }

    #[test]
    fn loads_from_a_config_file_on_disk() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expr-jit.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "min_count_to_compile = 5\ncache_capacity_bytes = 1024").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let config = JitConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.min_count_to_compile, 5);
        assert_eq!(config.cache_capacity_bytes, 1024);
    }
}
