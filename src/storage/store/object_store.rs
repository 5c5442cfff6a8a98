use bytes::Bytes;

use crate::{
    byte_range::ByteRange,
    storage::{AsyncReadableStorageTraits, ObjectKey, StorageError},
};

/// Maps an [`ObjectKey`] to an [`object_store`] path.
fn key_to_path(key: &ObjectKey) -> object_store::path::Path {
    object_store::path::Path::from(key.as_str())
}

/// Map [`object_store::Error::NotFound`] to [`StorageError::NotFound`], pass through other errors.
fn handle_error(key: &ObjectKey, err: object_store::Error) -> StorageError {
    if matches!(err, object_store::Error::NotFound { .. }) {
        StorageError::NotFound(key.clone())
    } else {
        StorageError::Other(err.to_string())
    }
}

/// An asynchronous store backed by an [`object_store::ObjectStore`].
///
/// Byte ranges are read with ranged `GET` requests (HTTP range requests for cloud object stores).
pub struct AsyncObjectStore<T> {
    object_store: T,
}

impl<T: object_store::ObjectStore> AsyncObjectStore<T> {
    /// Create a new [`AsyncObjectStore`].
    #[must_use]
    pub fn new(object_store: T) -> Self {
        Self { object_store }
    }
}

#[async_trait::async_trait]
impl<T: object_store::ObjectStore> AsyncReadableStorageTraits for AsyncObjectStore<T> {
    async fn size(&self, key: &ObjectKey) -> Result<u64, StorageError> {
        let meta = self
            .object_store
            .head(&key_to_path(key))
            .await
            .map_err(|err| handle_error(key, err))?;
        Ok(meta.size as u64)
    }

    async fn read(&self, key: &ObjectKey, byte_range: ByteRange) -> Result<Bytes, StorageError> {
        let range = byte_range.to_range_usize()?;
        let expected = range.len();
        let bytes = self
            .object_store
            .get_range(&key_to_path(key), range)
            .await
            .map_err(|err| handle_error(key, err))?;
        if bytes.len() == expected {
            Ok(bytes)
        } else {
            Err(StorageError::Other(format!(
                "Unexpected length of bytes returned, expected {expected}, got {}",
                bytes.len()
            )))
        }
    }
}
