use crate::core::{MetaError, Result};

const DEFAULT_CACHE_PREFIX: &str = "nc";
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Metadata layer configuration
///
/// Controls the cache sitting in front of the metadata store. The store
/// itself is configured by whoever constructs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaConfig {
    /// When false every cache read misses and every cache write is dropped
    pub cache_enabled: bool,

    /// Namespace prepended to every cache key
    pub cache_prefix: String,

    /// Maximum number of entries held by the LRU backend
    pub cache_capacity: usize,
}

impl MetaConfig {
    pub fn new() -> Self {
        Self {
            cache_enabled: true,
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Enable or disable caching
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Set the cache key namespace
    pub fn cache_prefix(mut self, prefix: &str) -> Self {
        self.cache_prefix = prefix.to_string();
        self
    }

    /// Set the LRU capacity
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Build a configuration from environment variables
    ///
    /// - `METACACHE_DISABLE_CACHE`: `true`/`1` disables the cache
    /// - `METACACHE_CACHE_PREFIX`: cache key namespace
    /// - `METACACHE_CACHE_CAPACITY`: LRU entry budget
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new();

        if let Ok(flag) = std::env::var("METACACHE_DISABLE_CACHE") {
            let flag = flag.trim().to_ascii_lowercase();
            config.cache_enabled = !(flag == "true" || flag == "1");
        }

        if let Ok(prefix) = std::env::var("METACACHE_CACHE_PREFIX") {
            config.cache_prefix = prefix.trim().to_string();
        }

        if let Ok(capacity) = std::env::var("METACACHE_CACHE_CAPACITY") {
            config.cache_capacity = capacity.trim().parse().map_err(|_| {
                MetaError::Config(format!("Invalid METACACHE_CACHE_CAPACITY '{}'", capacity))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_prefix.is_empty() {
            return Err(MetaError::Config("cache_prefix cannot be empty".to_string()));
        }

        if self
            .cache_prefix
            .chars()
            .any(|c| matches!(c, ':' | '*' | '?' | '[' | ']' | '\\'))
        {
            return Err(MetaError::Config(format!(
                "cache_prefix '{}' cannot contain ':', '\\' or glob characters",
                self.cache_prefix
            )));
        }

        if self.cache_capacity == 0 {
            return Err(MetaError::Config("cache_capacity must be > 0".to_string()));
        }

        Ok(())
    }
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self::new()
    }
}
