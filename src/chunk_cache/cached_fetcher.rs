use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::{byte_range::ByteRange, error::FetchError, range_fetcher::RangeFetcher};

use super::ChunkCache;

/// A [`RangeFetcher`] whose fetches are memoised in a [`ChunkCache`].
#[derive(Clone, Debug)]
pub struct CachedFetcher {
    fetcher: RangeFetcher,
    cache: Arc<ChunkCache>,
}

impl CachedFetcher {
    /// Create a new cached fetcher.
    #[must_use]
    pub fn new(fetcher: RangeFetcher, cache: Arc<ChunkCache>) -> Self {
        Self { fetcher, cache }
    }

    /// Return the underlying range fetcher.
    #[must_use]
    pub fn fetcher(&self) -> &RangeFetcher {
        &self.fetcher
    }

    /// Return the cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ChunkCache> {
        &self.cache
    }

    /// Return the size of the remote object.
    #[must_use]
    pub fn object_size(&self) -> u64 {
        self.fetcher.object().size()
    }

    /// Read `byte_range`, from the cache if possible.
    ///
    /// # Errors
    /// Returns [`FetchError::Cancelled`] if `cancel` has been cancelled, otherwise the error of the fetch.
    pub async fn read(
        &self,
        byte_range: ByteRange,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes, FetchError> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(FetchError::Cancelled);
        }
        self.cache
            .get_or_fetch(self.fetcher.object().key(), byte_range, || {
                self.fetcher.fetch(byte_range)
            })
            .await
    }

    /// Read `byte_ranges`, from the cache where possible, fetching the missing ranges concurrently.
    ///
    /// # Errors
    /// Returns [`FetchError::Cancelled`] if `cancel` has been cancelled, otherwise the first error of any fetch.
    pub async fn read_many(
        &self,
        byte_ranges: &[ByteRange],
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<Bytes>, FetchError> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(FetchError::Cancelled);
        }
        self.cache
            .get_or_fetch_many(
                self.fetcher.object().key(),
                byte_ranges,
                |missing| async move {
                    self.fetcher
                        .fetch_many_cancellable(&missing, cancel)
                        .await
                },
            )
            .await
    }
}
