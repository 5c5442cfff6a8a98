//! An in-memory store.

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::{
    byte_range::ByteRange,
    storage::{AsyncReadableStorageTraits, ObjectKey, StorageError},
};

/// An in-memory store.
///
/// Values are reference counted, so reads are zero-copy slices of the stored value.
#[derive(Debug, Default)]
pub struct AsyncMemoryStore {
    data_map: RwLock<BTreeMap<ObjectKey, Bytes>>,
}

impl AsyncMemoryStore {
    /// Create a new empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` at `key`, replacing any existing value.
    pub fn set(&self, key: &ObjectKey, value: impl Into<Bytes>) {
        self.data_map.write().insert(key.clone(), value.into());
    }

    /// Erase the value at `key`.
    pub fn erase(&self, key: &ObjectKey) {
        self.data_map.write().remove(key);
    }

    fn get(&self, key: &ObjectKey) -> Result<Bytes, StorageError> {
        self.data_map
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.clone()))
    }
}

#[async_trait::async_trait]
impl AsyncReadableStorageTraits for AsyncMemoryStore {
    async fn size(&self, key: &ObjectKey) -> Result<u64, StorageError> {
        Ok(self.get(key)?.len() as u64)
    }

    async fn read(&self, key: &ObjectKey, byte_range: ByteRange) -> Result<Bytes, StorageError> {
        let value = self.get(key)?;
        byte_range.validate(value.len() as u64)?;
        Ok(value.slice(byte_range.to_range_usize()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[tokio::test]
    async fn memory() -> Result<(), Box<dyn Error>> {
        let store = AsyncMemoryStore::new();
        store.set(
            &super::super::test_util::object_key(),
            super::super::test_util::object_value(),
        );
        super::super::test_util::store_read(&store).await?;

        store.erase(&super::super::test_util::object_key());
        assert!(store
            .size(&super::super::test_util::object_key())
            .await
            .unwrap_err()
            .is_not_found());
        Ok(())
    }
}
