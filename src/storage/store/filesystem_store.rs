//! A filesystem store.

use std::{
    io::SeekFrom,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::{
    byte_range::ByteRange,
    storage::{AsyncReadableStorageTraits, ObjectKey, StorageError},
};

/// An asynchronous file system store.
///
/// Objects are files below a base directory, addressed by their path relative to it.
/// Byte ranges are read with positional reads, so only the requested bytes are read from disk.
#[derive(Debug)]
pub struct AsyncFilesystemStore {
    base_path: PathBuf,
}

impl AsyncFilesystemStore {
    /// Create a new file system store at a given `base_path`.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_path`:
    ///   - is not valid UTF-8, or
    ///   - points to an existing file rather than a directory.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, FilesystemStoreCreateError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.to_str().is_none() || base_path.is_file() {
            return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
        }
        Ok(Self { base_path })
    }

    /// Maps an [`ObjectKey`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn key_to_fspath(&self, key: &ObjectKey) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(key.as_str());
        path
    }
}

/// Map a missing file to [`StorageError::NotFound`], pass through other errors.
fn handle_io_error(key: &ObjectKey, err: std::io::Error) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.clone())
    } else {
        err.into()
    }
}

#[async_trait::async_trait]
impl AsyncReadableStorageTraits for AsyncFilesystemStore {
    async fn size(&self, key: &ObjectKey) -> Result<u64, StorageError> {
        let metadata = tokio::fs::metadata(self.key_to_fspath(key))
            .await
            .map_err(|err| handle_io_error(key, err))?;
        if metadata.is_file() {
            Ok(metadata.len())
        } else {
            Err(StorageError::NotFound(key.clone()))
        }
    }

    async fn read(&self, key: &ObjectKey, byte_range: ByteRange) -> Result<Bytes, StorageError> {
        let mut file = tokio::fs::File::open(self.key_to_fspath(key))
            .await
            .map_err(|err| handle_io_error(key, err))?;
        let size = file.metadata().await?.len();
        byte_range.validate(size)?;

        let length = usize::try_from(byte_range.length())
            .map_err(|_| StorageError::from("byte range length exceeds usize::MAX"))?;
        let mut buffer = vec![0; length];
        file.seek(SeekFrom::Start(byte_range.offset())).await?;
        file.read_exact(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An invalid base path.
    #[error("base path {0} is not valid")]
    InvalidBasePath(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[tokio::test]
    #[cfg_attr(miri, ignore)]
    async fn filesystem() -> Result<(), Box<dyn Error>> {
        let path = tempfile::TempDir::new()?;
        let store = AsyncFilesystemStore::new(path.path())?;
        let fspath = store.key_to_fspath(&super::super::test_util::object_key());
        std::fs::create_dir_all(fspath.parent().unwrap())?;
        std::fs::write(&fspath, super::super::test_util::object_value())?;
        super::super::test_util::store_read(&store).await?;
        Ok(())
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn filesystem_base_path_is_file() -> Result<(), Box<dyn Error>> {
        let file = tempfile::NamedTempFile::new()?;
        assert!(AsyncFilesystemStore::new(file.path()).is_err());
        Ok(())
    }
}
