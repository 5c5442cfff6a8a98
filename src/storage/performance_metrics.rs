//! A storage wrapper which records performance metrics.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use bytes::Bytes;

use crate::byte_range::ByteRange;

use super::{AsyncReadableStorageTraits, ObjectKey, StorageError};

/// A storage wrapper that accumulates metrics, such as bytes read and the number of read requests.
///
/// It is intended to aid in testing and diagnostics by allowing the application to validate that metrics (e.g. reads issued by a cached read) match expected values.
#[derive(Debug)]
pub struct PerformanceMetricsStorage<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    bytes_read: AtomicUsize,
    reads: AtomicUsize,
    size_requests: AtomicUsize,
}

impl<TStorage: ?Sized> PerformanceMetricsStorage<TStorage> {
    /// Wrap `storage` with performance metrics.
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self {
            storage,
            bytes_read: AtomicUsize::default(),
            reads: AtomicUsize::default(),
            size_requests: AtomicUsize::default(),
        }
    }

    /// Returns the number of bytes read.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Returns the number of read requests.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of size requests.
    pub fn size_requests(&self) -> usize {
        self.size_requests.load(Ordering::Relaxed)
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.bytes_read.store(0, Ordering::Relaxed);
        self.reads.store(0, Ordering::Relaxed);
        self.size_requests.store(0, Ordering::Relaxed);
    }
}

#[async_trait::async_trait]
impl<TStorage: ?Sized + AsyncReadableStorageTraits> AsyncReadableStorageTraits
    for PerformanceMetricsStorage<TStorage>
{
    async fn size(&self, key: &ObjectKey) -> Result<u64, StorageError> {
        self.size_requests.fetch_add(1, Ordering::Relaxed);
        self.storage.size(key).await
    }

    async fn read(&self, key: &ObjectKey, byte_range: ByteRange) -> Result<Bytes, StorageError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let bytes = self.storage.read(key, byte_range).await?;
        self.bytes_read.fetch_add(bytes.len(), Ordering::Relaxed);
        Ok(bytes)
    }
}
