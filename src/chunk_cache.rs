//! Caching of fetched byte ranges and decoded structural nodes.
//!
//! [`ChunkCache`] memoises fetched byte ranges keyed by (object, offset, length):
//!  - a request is served from any cached entry whose range contains it,
//!  - at most one fetch per distinct key is in flight at once, later concurrent requests await it, and
//!  - least recently used entries are evicted once the memory ceiling is exceeded.
//!
//! Cached values are reference counted [`Bytes`], so eviction only drops the cache's own handle and never invalidates bytes held by an in-progress read.
//!
//! [`NodeCache`] holds decoded structural nodes, and [`CachedFetcher`] combines a [`ChunkCache`] with a [`RangeFetcher`](crate::range_fetcher::RangeFetcher).

mod cached_fetcher;
mod node_cache;

use std::{
    collections::{BTreeSet, HashMap},
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::{byte_range::ByteRange, storage::ObjectKey};

pub use cached_fetcher::CachedFetcher;
pub use node_cache::NodeCache;

/// The key of a [`ChunkCache`] entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    object: ObjectKey,
    byte_range: ByteRange,
}

impl CacheKey {
    /// Create a new cache key.
    #[must_use]
    pub fn new(object: ObjectKey, byte_range: ByteRange) -> Self {
        Self { object, byte_range }
    }

    /// Return the object key.
    #[must_use]
    pub fn object(&self) -> &ObjectKey {
        &self.object
    }

    /// Return the byte range.
    #[must_use]
    pub fn byte_range(&self) -> ByteRange {
        self.byte_range
    }
}

/// Cache statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// The number of cached entries.
    pub entries: usize,
    /// The total size of cached entries in bytes.
    pub size_bytes: usize,
    /// The number of requests served from the cache.
    pub hits: usize,
    /// The number of requests that invoked a loader.
    pub misses: usize,
    /// The number of entries evicted.
    pub evictions: usize,
}

#[derive(Debug)]
struct CacheState {
    lru: LruCache<CacheKey, Bytes>,
    /// Cached keys in (object, offset, length) order for containing-range lookups.
    index: BTreeSet<CacheKey>,
    size: usize,
    max_length: u64,
}

type InFlightSlot = Arc<async_lock::Mutex<Option<Bytes>>>;

/// A byte-range cache with a memory ceiling and per-key fetch deduplication.
#[derive(Debug)]
pub struct ChunkCache {
    state: Mutex<CacheState>,
    in_flight: Mutex<HashMap<CacheKey, InFlightSlot>>,
    size_limit: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
    evictions: AtomicUsize,
}

impl ChunkCache {
    /// Create a new [`ChunkCache`] with a memory ceiling of `size_limit_bytes`.
    #[must_use]
    pub fn new(size_limit_bytes: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                lru: LruCache::unbounded(),
                index: BTreeSet::new(),
                size: 0,
                max_length: 0,
            }),
            in_flight: Mutex::default(),
            size_limit: size_limit_bytes,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            evictions: AtomicUsize::new(0),
        }
    }

    /// Return the memory ceiling in bytes.
    #[must_use]
    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    /// Return the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().lru.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the total size of cached entries in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.lock().size
    }

    /// Return the cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let (entries, size_bytes) = {
            let state = self.state.lock();
            (state.lru.len(), state.size)
        };
        CacheStats {
            entries,
            size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.lru.clear();
        state.index.clear();
        state.size = 0;
        state.max_length = 0;
    }

    /// Retrieve `byte_range` of `object` from an equal or containing cached entry.
    #[must_use]
    pub fn retrieve(&self, object: &ObjectKey, byte_range: ByteRange) -> Option<Bytes> {
        let mut state = self.state.lock();
        let exact = CacheKey::new(object.clone(), byte_range);
        if let Some(bytes) = state.lru.get(&exact) {
            return Some(bytes.clone());
        }

        // Only entries starting within max_length before the request can contain it.
        let lower = CacheKey::new(
            object.clone(),
            ByteRange::new(byte_range.offset().saturating_sub(state.max_length), 0),
        );
        let upper = CacheKey::new(object.clone(), ByteRange::new(byte_range.offset(), u64::MAX));
        let container = state
            .index
            .range(lower..=upper)
            .find(|key| key.byte_range.contains(&byte_range))
            .cloned()?;
        let relative = container.byte_range.relative(&byte_range)?;
        let bytes = state.lru.get(&container)?;
        tracing::trace!(%byte_range, container = %container.byte_range, "cache hit (containing)");
        Some(bytes.slice(relative))
    }

    /// Insert `bytes` for `key`, evicting least recently used entries until the cache is under its memory ceiling.
    ///
    /// Values larger than the memory ceiling are not cached.
    pub fn insert(&self, key: CacheKey, bytes: Bytes) {
        if bytes.len() > self.size_limit {
            tracing::trace!(byte_range = %key.byte_range, "not caching, larger than the cache capacity");
            return;
        }
        let mut state = self.state.lock();
        state.size += bytes.len();
        state.max_length = state.max_length.max(key.byte_range.length());
        state.index.insert(key.clone());
        let replaced = state.lru.put(key, bytes);
        if let Some(old) = replaced {
            state.size -= old.len();
        }
        while state.size > self.size_limit {
            let Some((evicted, bytes)) = state.lru.pop_lru() else {
                break;
            };
            state.index.remove(&evicted);
            state.size -= bytes.len();
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(byte_range = %evicted.byte_range, "cache eviction");
        }
    }

    fn slot(&self, key: &CacheKey) -> InFlightSlot {
        self.in_flight
            .lock()
            .entry(key.clone())
            .or_default()
            .clone()
    }

    fn release_slot(&self, key: &CacheKey, slot: &InFlightSlot) {
        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            in_flight.remove(key);
        }
    }

    /// Return the cached bytes for `byte_range` of `object` if an equal or containing entry exists, otherwise invoke `loader` and cache its result.
    ///
    /// Concurrent callers for the same key await a single in-flight `loader` rather than invoking their own.
    /// A failed load is not cached; callers awaiting it retry with their own loader.
    ///
    /// # Errors
    /// Returns the error of `loader`.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        object: &ObjectKey,
        byte_range: ByteRange,
        loader: F,
    ) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        if let Some(bytes) = self.retrieve(object, byte_range) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(bytes);
        }

        let key = CacheKey::new(object.clone(), byte_range);
        let slot = self.slot(&key);
        let mut guard = slot.lock().await;
        if let Some(bytes) = (*guard)
            .clone()
            .or_else(|| self.retrieve(object, byte_range))
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            drop(guard);
            self.release_slot(&key, &slot);
            return Ok(bytes);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = loader().await;
        if let Ok(bytes) = &result {
            *guard = Some(bytes.clone());
            self.insert(key.clone(), bytes.clone());
        }
        drop(guard);
        self.release_slot(&key, &slot);
        result
    }

    /// Return the bytes of each of `byte_ranges` of `object`, loading all missing ranges with a single call of `loader`.
    ///
    /// `loader` receives the distinct missing byte ranges in ascending order and must return their bytes positionally.
    /// The per-key deduplication of [`get_or_fetch`](Self::get_or_fetch) applies to every range.
    ///
    /// # Errors
    /// Returns the error of `loader`.
    pub async fn get_or_fetch_many<F, Fut, E>(
        &self,
        object: &ObjectKey,
        byte_ranges: &[ByteRange],
        loader: F,
    ) -> Result<Vec<Bytes>, E>
    where
        F: FnOnce(Vec<ByteRange>) -> Fut,
        Fut: Future<Output = Result<Vec<Bytes>, E>>,
    {
        let mut out: Vec<Option<Bytes>> = byte_ranges
            .iter()
            .map(|byte_range| self.retrieve(object, *byte_range))
            .collect();
        let hits = out.iter().filter(|bytes| bytes.is_some()).count();
        self.hits.fetch_add(hits, Ordering::Relaxed);

        let missing: BTreeSet<ByteRange> = std::iter::zip(byte_ranges, &out)
            .filter(|(_, bytes)| bytes.is_none())
            .map(|(byte_range, _)| *byte_range)
            .collect();
        if missing.is_empty() {
            return Ok(out.into_iter().flatten().collect());
        }

        // Slots are locked in ascending key order so that concurrent batches cannot deadlock
        let mut claimed = Vec::with_capacity(missing.len());
        for byte_range in missing {
            let key = CacheKey::new(object.clone(), byte_range);
            let slot = self.slot(&key);
            let guard = slot.lock_arc().await;
            claimed.push((key, slot, guard));
        }

        let mut resolved = HashMap::with_capacity(claimed.len());
        let mut to_load = Vec::new();
        for (key, _, guard) in &claimed {
            match (**guard)
                .clone()
                .or_else(|| self.retrieve(object, key.byte_range))
            {
                Some(bytes) => {
                    resolved.insert(key.byte_range, bytes);
                }
                None => to_load.push(key.byte_range),
            }
        }

        let result = if to_load.is_empty() {
            Ok(())
        } else {
            self.misses.fetch_add(to_load.len(), Ordering::Relaxed);
            loader(to_load.clone()).await.map(|loaded| {
                debug_assert_eq!(loaded.len(), to_load.len());
                for (byte_range, bytes) in std::iter::zip(to_load, loaded) {
                    resolved.insert(byte_range, bytes);
                }
            })
        };

        for (key, slot, mut guard) in claimed {
            if let Some(bytes) = resolved.get(&key.byte_range) {
                if guard.is_none() {
                    *guard = Some(bytes.clone());
                    self.insert(key.clone(), bytes.clone());
                }
            }
            drop(guard);
            self.release_slot(&key, &slot);
        }
        result?;

        for (bytes, byte_range) in std::iter::zip(&mut out, byte_ranges) {
            if bytes.is_none() {
                *bytes = resolved.get(byte_range).cloned();
            }
        }
        Ok(out.into_iter().flatten().collect())
    }
}
