//! Session options.

use std::time::Duration;

use crate::config::global_config;

/// Options for a [`Session`](super::Session).
///
/// The defaults are read from the [global configuration](crate::config::Config).
#[derive(Debug, Clone)]
pub struct SessionOptions {
    cache_capacity_bytes: usize,
    node_cache_capacity: u64,
    fetch_timeout: Duration,
    fetch_concurrent_limit: usize,
    validate_checksums: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptionsBuilder::new().build()
    }
}

impl SessionOptions {
    /// Create a new session options builder.
    #[must_use]
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::new()
    }

    /// Return the memory ceiling of the byte-range cache.
    #[must_use]
    pub fn cache_capacity_bytes(&self) -> usize {
        self.cache_capacity_bytes
    }

    /// Return the maximum number of cached structural nodes.
    #[must_use]
    pub fn node_cache_capacity(&self) -> u64 {
        self.node_cache_capacity
    }

    /// Return the per-fetch deadline.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Return the maximum number of fetches in flight for one batch.
    #[must_use]
    pub fn fetch_concurrent_limit(&self) -> usize {
        self.fetch_concurrent_limit
    }

    /// Returns true if checksums are validated.
    #[must_use]
    pub fn validate_checksums(&self) -> bool {
        self.validate_checksums
    }
}

/// Builder for [`SessionOptions`].
#[derive(Debug, Clone)]
pub struct SessionOptionsBuilder {
    cache_capacity_bytes: usize,
    node_cache_capacity: u64,
    fetch_timeout: Duration,
    fetch_concurrent_limit: usize,
    validate_checksums: bool,
}

impl Default for SessionOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionOptionsBuilder {
    /// Create a new session options builder with defaults from the global configuration.
    #[must_use]
    pub fn new() -> Self {
        let config = global_config();
        Self {
            cache_capacity_bytes: config.cache_capacity_bytes(),
            node_cache_capacity: config.node_cache_capacity(),
            fetch_timeout: config.fetch_timeout(),
            fetch_concurrent_limit: config.fetch_concurrent_limit(),
            validate_checksums: config.validate_checksums(),
        }
    }

    /// Build into session options.
    #[must_use]
    pub fn build(&self) -> SessionOptions {
        SessionOptions {
            cache_capacity_bytes: self.cache_capacity_bytes,
            node_cache_capacity: self.node_cache_capacity,
            fetch_timeout: self.fetch_timeout,
            fetch_concurrent_limit: self.fetch_concurrent_limit.max(1),
            validate_checksums: self.validate_checksums,
        }
    }

    /// Set the memory ceiling of the byte-range cache.
    #[must_use]
    pub fn cache_capacity_bytes(mut self, cache_capacity_bytes: usize) -> Self {
        self.cache_capacity_bytes = cache_capacity_bytes;
        self
    }

    /// Set the maximum number of cached structural nodes.
    #[must_use]
    pub fn node_cache_capacity(mut self, node_cache_capacity: u64) -> Self {
        self.node_cache_capacity = node_cache_capacity;
        self
    }

    /// Set the per-fetch deadline.
    #[must_use]
    pub fn fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Set the maximum number of fetches in flight for one batch.
    #[must_use]
    pub fn fetch_concurrent_limit(mut self, fetch_concurrent_limit: usize) -> Self {
        self.fetch_concurrent_limit = fetch_concurrent_limit;
        self
    }

    /// Enable or disable checksum validation.
    #[must_use]
    pub fn validate_checksums(mut self, validate_checksums: bool) -> Self {
        self.validate_checksums = validate_checksums;
        self
    }
}
