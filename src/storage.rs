//! Storage backends for remote objects.
//!
//! A storage backend is anything that can report the size of an object and read a byte range of it.
//! This is the only capability the rest of the crate relies on: local files ([`AsyncFilesystemStore`](store::AsyncFilesystemStore)), object storage ([`AsyncObjectStore`](store::AsyncObjectStore)) and in-memory data ([`AsyncMemoryStore`](store::AsyncMemoryStore)) are interchangeable implementations of [`AsyncReadableStorageTraits`].
//!
//! Backends distinguish a missing object ([`StorageError::NotFound`]) from any other failure, which is treated as transient.

mod object_key;
mod performance_metrics;
mod remote_object;
pub mod store;

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::byte_range::{ByteRange, InvalidByteRangeError};

pub use object_key::{ObjectKey, ObjectKeyError};
pub use performance_metrics::PerformanceMetricsStorage;
pub use remote_object::RemoteObject;

/// [`Arc`] wrapped asynchronous readable storage.
pub type AsyncReadableStorage = Arc<dyn AsyncReadableStorageTraits>;

/// Async readable storage traits.
#[async_trait::async_trait]
pub trait AsyncReadableStorageTraits: Send + Sync {
    /// Return the size in bytes of the object at `key`.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if the object does not exist, or another [`StorageError`] if there is an underlying error with the store.
    async fn size(&self, key: &ObjectKey) -> Result<u64, StorageError>;

    /// Read `byte_range` of the object at `key`.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if the object does not exist, or another [`StorageError`] if there is an underlying error with the store or the byte range is invalid.
    async fn read(&self, key: &ObjectKey, byte_range: ByteRange) -> Result<Bytes, StorageError>;
}

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The object does not exist.
    #[error("object {0} not found")]
    NotFound(ObjectKey),
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An invalid byte range.
    #[error("invalid byte range {0}")]
    InvalidByteRangeError(#[from] InvalidByteRangeError),
    /// An invalid object key.
    #[error("invalid object key {0}")]
    InvalidObjectKey(#[from] ObjectKeyError),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Returns true if the error indicates that the object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::IOError(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}
