use super::{AsyncReadableStorage, ObjectKey};

/// An object in a storage backend opened for reading.
///
/// The size is fetched once when the object is opened and is immutable for the lifetime of the object handle.
#[derive(Clone)]
pub struct RemoteObject {
    storage: AsyncReadableStorage,
    key: ObjectKey,
    size: u64,
}

impl RemoteObject {
    /// Create a new remote object handle with a known `size`.
    #[must_use]
    pub fn new(storage: AsyncReadableStorage, key: ObjectKey, size: u64) -> Self {
        Self { storage, key, size }
    }

    /// Return the storage backend.
    #[must_use]
    pub fn storage(&self) -> &AsyncReadableStorage {
        &self.storage
    }

    /// Return the object key.
    #[must_use]
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Return the size of the object in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("key", &self.key)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
