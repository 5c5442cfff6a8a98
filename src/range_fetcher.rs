//! Byte-range fetching from a remote object.
//!
//! A [`RangeFetcher`] issues byte-range reads against one [`RemoteObject`].
//! Every fetch is bounds checked against the object size, runs under a deadline, and batched fetches are overlapped up to a concurrency limit.

use std::time::Duration;

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::{
    byte_range::ByteRange,
    error::{FetchError, IOFailure},
    storage::RemoteObject,
};

/// Issues byte-range reads against a remote object.
#[derive(Clone, Debug)]
pub struct RangeFetcher {
    object: RemoteObject,
    timeout: Duration,
    concurrent_limit: usize,
}

impl RangeFetcher {
    /// Create a new range fetcher for `object`.
    ///
    /// `timeout` is the default deadline of each fetch and `concurrent_limit` the maximum number of fetches in flight for [`fetch_many`](Self::fetch_many).
    #[must_use]
    pub fn new(object: RemoteObject, timeout: Duration, concurrent_limit: usize) -> Self {
        Self {
            object,
            timeout,
            concurrent_limit: concurrent_limit.max(1),
        }
    }

    /// Return the remote object.
    #[must_use]
    pub fn object(&self) -> &RemoteObject {
        &self.object
    }

    /// Fetch `byte_range` with the default deadline.
    ///
    /// # Errors
    /// Returns [`FetchError::OutOfRange`] if `byte_range` exceeds the object size, or [`FetchError::IOFailure`] if the storage backend fails or the deadline expires.
    pub async fn fetch(&self, byte_range: ByteRange) -> Result<Bytes, FetchError> {
        self.fetch_with_deadline(byte_range, self.timeout).await
    }

    /// Fetch `byte_range`, failing with [`IOFailure::Timeout`] if it does not complete within `deadline`.
    ///
    /// # Errors
    /// Returns [`FetchError::OutOfRange`] if `byte_range` exceeds the object size, or [`FetchError::IOFailure`] if the storage backend fails or the deadline expires.
    pub async fn fetch_with_deadline(
        &self,
        byte_range: ByteRange,
        deadline: Duration,
    ) -> Result<Bytes, FetchError> {
        byte_range.validate(self.object.size())?;
        if byte_range.length() == 0 {
            return Ok(Bytes::new());
        }
        tracing::trace!(object = %self.object.key(), %byte_range, "fetch");

        let read = self.object.storage().read(self.object.key(), byte_range);
        let bytes = tokio::time::timeout(deadline, read)
            .await
            .map_err(|_| IOFailure::Timeout {
                byte_range,
                deadline,
            })?
            .map_err(|err| IOFailure::from_storage(byte_range, err))?;

        if bytes.len() as u64 == byte_range.length() {
            Ok(bytes)
        } else {
            Err(IOFailure::Transient {
                byte_range,
                source: format!(
                    "short read, expected {} bytes, got {}",
                    byte_range.length(),
                    bytes.len()
                )
                .into(),
            }
            .into())
        }
    }

    /// Fetch `byte_ranges` concurrently.
    ///
    /// The result at position `i` holds the bytes of `byte_ranges[i]` regardless of the order in which the fetches complete.
    /// At most the concurrent limit of fetches are in flight at once.
    ///
    /// # Errors
    /// Returns the first error of any constituent fetch.
    pub async fn fetch_many(&self, byte_ranges: &[ByteRange]) -> Result<Vec<Bytes>, FetchError> {
        self.fetch_many_cancellable(byte_ranges, None).await
    }

    /// Fetch `byte_ranges` concurrently, issuing no further fetches once `cancel` is cancelled.
    ///
    /// Fetches already in flight when cancellation is observed are allowed to complete, but the call fails with [`FetchError::Cancelled`].
    ///
    /// # Errors
    /// Returns the first error of any constituent fetch or [`FetchError::Cancelled`].
    pub async fn fetch_many_cancellable(
        &self,
        byte_ranges: &[ByteRange],
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<Bytes>, FetchError> {
        futures::stream::iter(byte_ranges.iter().copied())
            .map(|byte_range| async move {
                if cancel.is_some_and(CancellationToken::is_cancelled) {
                    return Err(FetchError::Cancelled);
                }
                self.fetch(byte_range).await
            })
            .buffered(self.concurrent_limit)
            .try_collect()
            .await
    }
}
