//! Global configuration options.

use std::{
    sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

/// Global configuration options for the `cloud_asdf` crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
/// Options are read when a [`SessionOptions`](crate::session::SessionOptions) is built, so changes do not affect sessions that are already open.
///
/// # Cache Configuration Options
///
/// ## Cache Capacity
/// > default: `268_435_456` (256 MiB)
///
/// The memory ceiling in bytes of the per-session byte-range cache.
/// Least recently used entries are evicted once the ceiling is exceeded.
/// A single fetched range larger than the ceiling is returned to the caller but not cached.
///
/// ## Node Cache Capacity
/// > default: `4096`
///
/// The maximum number of decoded structural nodes (object headers, groups, global heap collections) kept per session.
///
/// # Fetch Configuration Options
///
/// ## Fetch Timeout
/// > default: `30` seconds
///
/// The deadline applied to each byte-range fetch.
/// A fetch exceeding its deadline fails with an [`IOFailure::Timeout`](crate::error::IOFailure::Timeout).
///
/// ## Fetch Concurrent Limit
/// > default: `16`
///
/// The maximum number of byte-range fetches in flight for a single batched fetch.
/// A value of zero is treated as one.
///
/// # Miscellaneous Configuration Options
///
/// ## Validate Checksums
/// > default: [`true`]
///
/// If enabled, the Jenkins lookup3 checksums of version 2 metadata structures and the `fletcher32` filter checksums of chunks are validated.
#[derive(Debug)]
pub struct Config {
    cache_capacity_bytes: usize,
    node_cache_capacity: u64,
    fetch_timeout: Duration,
    fetch_concurrent_limit: usize,
    validate_checksums: bool,
}

#[allow(clippy::derivable_impls)]
impl Default for Config {
    fn default() -> Self {
        Config {
            cache_capacity_bytes: 256 * 1024 * 1024,
            node_cache_capacity: 4096,
            fetch_timeout: Duration::from_secs(30),
            fetch_concurrent_limit: 16,
            validate_checksums: true,
        }
    }
}

impl Config {
    /// Get the [cache capacity](#cache-capacity) configuration.
    #[must_use]
    pub fn cache_capacity_bytes(&self) -> usize {
        self.cache_capacity_bytes
    }

    /// Set the [cache capacity](#cache-capacity) configuration.
    pub fn set_cache_capacity_bytes(&mut self, cache_capacity_bytes: usize) {
        self.cache_capacity_bytes = cache_capacity_bytes;
    }

    /// Get the [node cache capacity](#node-cache-capacity) configuration.
    #[must_use]
    pub fn node_cache_capacity(&self) -> u64 {
        self.node_cache_capacity
    }

    /// Set the [node cache capacity](#node-cache-capacity) configuration.
    pub fn set_node_cache_capacity(&mut self, node_cache_capacity: u64) {
        self.node_cache_capacity = node_cache_capacity;
    }

    /// Get the [fetch timeout](#fetch-timeout) configuration.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Set the [fetch timeout](#fetch-timeout) configuration.
    pub fn set_fetch_timeout(&mut self, fetch_timeout: Duration) {
        self.fetch_timeout = fetch_timeout;
    }

    /// Get the [fetch concurrent limit](#fetch-concurrent-limit) configuration.
    #[must_use]
    pub fn fetch_concurrent_limit(&self) -> usize {
        self.fetch_concurrent_limit
    }

    /// Set the [fetch concurrent limit](#fetch-concurrent-limit) configuration.
    pub fn set_fetch_concurrent_limit(&mut self, concurrent_limit: usize) {
        self.fetch_concurrent_limit = concurrent_limit;
    }

    /// Get the [validate checksums](#validate-checksums) configuration.
    #[must_use]
    pub fn validate_checksums(&self) -> bool {
        self.validate_checksums
    }

    /// Set the [validate checksums](#validate-checksums) configuration.
    pub fn set_validate_checksums(&mut self, validate_checksums: bool) {
        self.validate_checksums = validate_checksums;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}
