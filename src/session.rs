//! Sessions.
//!
//! A [`Session`] owns one open remote object and exposes the public read API.
//! Its state machine is `Closed → Opening → Open → Closed`:
//!  - [`Session::connect`] (or [`open`]) fetches the object size and the superblock and decodes the root group while `Opening`,
//!  - reads are permitted while `Open`, concurrently and without serialisation against each other,
//!  - [`Session::close`] releases the cached bytes and nodes, and later reads fail with [`ReadError::SessionClosed`].
//!
//! Concurrent reads share the session [`ChunkCache`], which deduplicates their fetches.

mod session_options;

use std::sync::Arc;

use derive_more::Display;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

pub use session_options::{SessionOptions, SessionOptionsBuilder};

use crate::{
    array::Array,
    array_subset::SliceRequest,
    byte_range::ByteRange,
    chunk_cache::{CacheStats, CachedFetcher, ChunkCache, NodeCache},
    dataset::{decode_elements, DatasetInfo, DatasetReader},
    error::{IOFailure, ReadError},
    format::{read_superblock, FormatError, FormatParser, Superblock},
    node::{NodePath, StructuralNode},
    range_fetcher::RangeFetcher,
    storage::{AsyncReadableStorage, ObjectKey, RemoteObject},
};

/// The state of a [`Session`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum SessionState {
    /// The object is not open.
    #[display("closed")]
    Closed,
    /// The object is being opened.
    #[display("opening")]
    Opening,
    /// The object is open for reads.
    #[display("open")]
    Open,
}

/// A decoded attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// A numeric or opaque attribute.
    Array(Array),
    /// A scalar string attribute.
    String(String),
    /// A string attribute with one or more dimensions.
    Strings(Vec<String>),
}

impl AttributeValue {
    fn from_array(array: Array) -> Self {
        if let Some(strings) = array.strings() {
            return match strings {
                [string] if array.dimensionality() == 0 => Self::String(string.clone()),
                _ => Self::Strings(strings.to_vec()),
            };
        }
        Self::Array(array)
    }

    /// Return the value as a string, if it is a scalar string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(string) => Some(string),
            _ => None,
        }
    }
}

/// The resources of an open object.
#[derive(Debug)]
struct OpenObject {
    fetcher: CachedFetcher,
    nodes: NodeCache,
    superblock: Superblock,
    validate_checksums: bool,
}

impl OpenObject {
    fn parser<'a>(&'a self, cancel: Option<&'a CancellationToken>) -> FormatParser<'a> {
        FormatParser::new(
            &self.fetcher,
            &self.nodes,
            &self.superblock,
            self.validate_checksums,
        )
        .with_cancellation(cancel)
    }
}

#[derive(Debug)]
enum Phase {
    Closed,
    Opening,
    Open(Arc<OpenObject>),
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Self::Closed => SessionState::Closed,
            Self::Opening => SessionState::Opening,
            Self::Open(_) => SessionState::Open,
        }
    }
}

/// An open HDF5 container in a storage backend.
///
/// Reads take `&self` and may be issued concurrently, for example with [`futures::future::try_join_all`].
pub struct Session {
    storage: AsyncReadableStorage,
    key: ObjectKey,
    options: SessionOptions,
    phase: RwLock<Phase>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Open the object at `key` in `storage`.
///
/// # Errors
/// See [`Session::connect`].
pub async fn open(
    storage: AsyncReadableStorage,
    key: ObjectKey,
    options: SessionOptions,
) -> Result<Session, ReadError> {
    Session::open(storage, key, options).await
}

impl Session {
    /// Create a session for the object at `key` in `storage` in the [`SessionState::Closed`] state.
    #[must_use]
    pub fn new(storage: AsyncReadableStorage, key: ObjectKey, options: SessionOptions) -> Self {
        Self {
            storage,
            key,
            options,
            phase: RwLock::new(Phase::Closed),
        }
    }

    /// Create a session for the object at `key` in `storage` and [`connect`](Self::connect) it.
    ///
    /// # Errors
    /// See [`Session::connect`].
    pub async fn open(
        storage: AsyncReadableStorage,
        key: ObjectKey,
        options: SessionOptions,
    ) -> Result<Self, ReadError> {
        let session = Self::new(storage, key, options);
        session.connect().await?;
        Ok(session)
    }

    /// Open the object: fetch its size and superblock and decode the root group.
    ///
    /// On failure the session returns to [`SessionState::Closed`].
    ///
    /// # Errors
    /// Returns a [`ReadError`] if
    ///  - the session is not closed ([`ReadError::InvalidSessionState`]),
    ///  - the object does not exist or cannot be fetched ([`ReadError::IOFailure`]),
    ///  - the object is not a valid HDF5 container ([`ReadError::FormatError`]), or
    ///  - the session was closed while opening ([`ReadError::SessionClosed`]).
    pub async fn connect(&self) -> Result<(), ReadError> {
        {
            let mut phase = self.phase.write();
            if !matches!(*phase, Phase::Closed) {
                return Err(ReadError::InvalidSessionState(phase.state()));
            }
            *phase = Phase::Opening;
        }
        tracing::debug!(key = %self.key, "opening session");
        let result = self.open_object().await;

        let mut phase = self.phase.write();
        if !matches!(*phase, Phase::Opening) {
            return Err(ReadError::SessionClosed);
        }
        match result {
            Ok(object) => {
                tracing::debug!(
                    key = %self.key,
                    size = object.fetcher.object_size(),
                    "session open"
                );
                *phase = Phase::Open(Arc::new(object));
                Ok(())
            }
            Err(err) => {
                tracing::debug!(key = %self.key, %err, "failed to open session");
                *phase = Phase::Closed;
                Err(err)
            }
        }
    }

    async fn open_object(&self) -> Result<OpenObject, ReadError> {
        let options = &self.options;
        let size = tokio::time::timeout(options.fetch_timeout(), self.storage.size(&self.key))
            .await
            .map_err(|_| IOFailure::Timeout {
                byte_range: ByteRange::new(0, 0),
                deadline: options.fetch_timeout(),
            })?
            .map_err(|err| IOFailure::from_storage(ByteRange::new(0, 0), err))?;

        let object = RemoteObject::new(self.storage.clone(), self.key.clone(), size);
        let fetcher = CachedFetcher::new(
            RangeFetcher::new(
                object,
                options.fetch_timeout(),
                options.fetch_concurrent_limit(),
            ),
            Arc::new(ChunkCache::new(options.cache_capacity_bytes())),
        );
        let superblock = read_superblock(&fetcher, options.validate_checksums(), None).await?;
        let object = OpenObject {
            fetcher,
            nodes: NodeCache::new(options.node_cache_capacity()),
            superblock,
            validate_checksums: options.validate_checksums(),
        };

        let root = NodePath::root();
        let (_, node) = object.parser(None).resolve(&root).await?;
        if !matches!(node, StructuralNode::Group(_)) {
            return Err(ReadError::format(
                root.to_string(),
                FormatError::Invalid(format!("the root object is a {}", node.kind())),
            ));
        }
        Ok(object)
    }

    /// Return the session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.phase.read().state()
    }

    /// Return the object key.
    #[must_use]
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Return the session options.
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    fn object(&self) -> Result<Arc<OpenObject>, ReadError> {
        match &*self.phase.read() {
            Phase::Open(object) => Ok(object.clone()),
            Phase::Closed | Phase::Opening => Err(ReadError::SessionClosed),
        }
    }

    /// Return the size in bytes of the open object.
    ///
    /// # Errors
    /// Returns [`ReadError::SessionClosed`] if the session is not open.
    pub fn object_size(&self) -> Result<u64, ReadError> {
        Ok(self.object()?.fetcher.object_size())
    }

    /// Return the names of the children of the group at `group_path`, in storage order.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the session is not open, `group_path` does not exist or is not a group, or resolving it fails.
    pub async fn list(&self, group_path: &str) -> Result<Vec<String>, ReadError> {
        let path = NodePath::new(group_path)?;
        let object = self.object()?;
        let (_, node) = object.parser(None).resolve(&path).await?;
        match node {
            StructuralNode::Group(group) => Ok(group.child_names()),
            _ => Err(ReadError::UnexpectedNodeKind {
                path: path.to_string(),
                expected: "group",
            }),
        }
    }

    /// Returns true if `path` resolves to a dataset.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the session is not open or resolving `path` fails for a reason other than it not existing.
    pub async fn is_dataset(&self, path: &str) -> Result<bool, ReadError> {
        let path = NodePath::new(path)?;
        let object = self.object()?;
        match object.parser(None).resolve(&path).await {
            Ok((_, node)) => Ok(matches!(node, StructuralNode::Dataset(_))),
            Err(ReadError::PathNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Read `slice` of the dataset at `path`, or the whole dataset if `slice` is [`None`].
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the session is not open, the dataset does not exist, the slice is out of bounds, the dataset cannot be decoded or a fetch fails.
    /// A failed read returns no data.
    pub async fn read_dataset(
        &self,
        path: &str,
        slice: Option<&SliceRequest>,
    ) -> Result<Array, ReadError> {
        let path = NodePath::new(path)?;
        let object = self.object()?;
        DatasetReader::open(object.parser(None), &path)
            .await?
            .read(slice)
            .await
    }

    /// Read `slice` of the dataset at `path`, abandoning the read once `cancel` is cancelled.
    ///
    /// Fetches already in flight when cancellation is observed may complete and populate the cache, but no further fetches are issued for the read.
    ///
    /// # Errors
    /// Returns [`ReadError::Cancelled`] if `cancel` is cancelled before the read completes, otherwise see [`read_dataset`](Self::read_dataset).
    pub async fn read_dataset_cancellable(
        &self,
        path: &str,
        slice: Option<&SliceRequest>,
        cancel: &CancellationToken,
    ) -> Result<Array, ReadError> {
        let path = NodePath::new(path)?;
        let object = self.object()?;
        let read = async {
            DatasetReader::open(object.parser(Some(cancel)), &path)
                .await?
                .read(slice)
                .await
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(%path, "read cancelled");
                Err(ReadError::Cancelled)
            }
            result = read => result,
        }
    }

    /// Return a summary of the dataset at `path`.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the session is not open, the dataset does not exist or resolving it fails.
    pub async fn dataset_info(&self, path: &str) -> Result<DatasetInfo, ReadError> {
        let path = NodePath::new(path)?;
        let object = self.object()?;
        DatasetReader::open(object.parser(None), &path)
            .await?
            .info()
    }

    /// Return the attribute names of the group or dataset at `path`.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the session is not open, `path` does not exist or resolving it fails.
    pub async fn attribute_names(&self, path: &str) -> Result<Vec<String>, ReadError> {
        let path = NodePath::new(path)?;
        let object = self.object()?;
        let (_, node) = object.parser(None).resolve(&path).await?;
        Ok(node
            .attributes()
            .iter()
            .map(|attribute| attribute.name.clone())
            .collect())
    }

    /// Read the attribute `name` of the group or dataset at `path`.
    ///
    /// # Errors
    /// Returns [`ReadError::PathNotFound`] if `path` or the attribute does not exist, or another [`ReadError`] if the session is not open or the attribute cannot be decoded.
    pub async fn read_attribute(&self, path: &str, name: &str) -> Result<AttributeValue, ReadError> {
        let path = NodePath::new(path)?;
        let object = self.object()?;
        let parser = object.parser(None);
        let (_, node) = parser.resolve(&path).await?;
        let attribute = node
            .attributes()
            .iter()
            .find(|attribute| attribute.name == name)
            .cloned()
            .ok_or_else(|| ReadError::PathNotFound(format!("attribute {name} of {path}")))?;

        let needed = attribute
            .shape
            .iter()
            .try_fold(1u64, |acc, dim| acc.checked_mul(*dim))
            .and_then(|n| n.checked_mul(attribute.datatype.size() as u64))
            .and_then(|needed| usize::try_from(needed).ok())
            .filter(|needed| *needed <= attribute.data.len())
            .ok_or_else(|| {
                ReadError::format(
                    format!("attribute {name} of {path}"),
                    FormatError::Invalid(format!(
                        "attribute of shape {:?} has {} bytes",
                        attribute.shape,
                        attribute.data.len()
                    )),
                )
            })?;
        let array = decode_elements(
            &parser,
            &path,
            &attribute.datatype,
            attribute.shape.clone(),
            &attribute.data[..needed],
        )
        .await?;
        Ok(AttributeValue::from_array(array))
    }

    /// Return the byte-range cache statistics, or default statistics if the session is not open.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.object()
            .map(|object| object.fetcher.cache().stats())
            .unwrap_or_default()
    }

    /// Close the session, releasing cached bytes and nodes.
    ///
    /// Reads in progress complete, later reads fail with [`ReadError::SessionClosed`].
    /// Closing a closed session has no effect.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.phase.write(), Phase::Closed);
        if let Phase::Open(object) = previous {
            object.fetcher.cache().clear();
            object.nodes.clear();
            tracing::debug!(key = %self.key, "session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::store::AsyncMemoryStore;

    use super::*;

    #[tokio::test]
    async fn session_open_invalid_signature() {
        let store = AsyncMemoryStore::new();
        let key = ObjectKey::new("a.h5").unwrap();
        store.set(&key, vec![0u8; 4096]);
        let session = Session::new(Arc::new(store), key, SessionOptions::default());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.connect().await,
            Err(ReadError::FormatError {
                source: FormatError::SignatureNotFound,
                ..
            })
        ));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.list("/").await,
            Err(ReadError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn session_open_not_found() {
        let store = Arc::new(AsyncMemoryStore::new());
        let err = open(store, ObjectKey::new("a.h5").unwrap(), SessionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::IOFailure(IOFailure::NotFound(_))));
        assert!(!err.is_retryable());
    }

    #[test]
    fn attribute_value_from_array() {
        let scalar = Array::new(vec![], vec!["BHZ".to_string()]).unwrap();
        assert_eq!(AttributeValue::from_array(scalar).as_str(), Some("BHZ"));
        let strings = Array::new(vec![2], vec!["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(
            AttributeValue::from_array(strings),
            AttributeValue::Strings(vec!["a".to_string(), "b".to_string()])
        );
        let numbers = Array::new(vec![1], vec![1.5f64]).unwrap();
        assert!(matches!(
            AttributeValue::from_array(numbers),
            AttributeValue::Array(_)
        ));
    }
}
