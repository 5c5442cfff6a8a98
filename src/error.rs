//! Errors surfaced by the public read API.
//!
//! Every public operation returns a [`ReadError`]. Lower level errors (storage, parsing, filters) are wrapped with the structural context that was being resolved when they occurred.

use std::time::Duration;

use thiserror::Error;

use crate::{
    array::ArrayError,
    byte_range::{ByteRange, InvalidByteRangeError},
    filter::FilterError,
    format::FormatError,
    node::{NodePath, NodePathError},
    session::SessionState,
    storage::StorageError,
};

/// A failure to fetch bytes from a storage backend.
#[derive(Debug, Error)]
pub enum IOFailure {
    /// The object does not exist.
    #[error("object {0} not found")]
    NotFound(String),
    /// A fetch did not complete before its deadline.
    #[error("fetch of bytes {byte_range} timed out after {deadline:?}")]
    Timeout {
        /// The byte range being fetched.
        byte_range: ByteRange,
        /// The deadline that expired.
        deadline: Duration,
    },
    /// Any other storage failure. The fetch may succeed if retried.
    #[error("fetch of bytes {byte_range} failed: {source}")]
    Transient {
        /// The byte range being fetched.
        byte_range: ByteRange,
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },
}

impl IOFailure {
    /// Classify a storage error raised while fetching `byte_range`.
    #[must_use]
    pub fn from_storage(byte_range: ByteRange, source: StorageError) -> Self {
        if source.is_not_found() {
            Self::NotFound(source.to_string())
        } else {
            Self::Transient { byte_range, source }
        }
    }
}

/// An error fetching a byte range.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The storage backend failed.
    #[error(transparent)]
    IOFailure(#[from] IOFailure),
    /// The byte range exceeds the object size.
    #[error(transparent)]
    OutOfRange(#[from] InvalidByteRangeError),
    /// The fetch was not issued because the read was cancelled.
    #[error("the read was cancelled")]
    Cancelled,
}

/// The cause of an [`ReadError::OutOfRange`] error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutOfRangeCause {
    /// A structural pointer in the file refers to bytes beyond the end of the object.
    ///
    /// This indicates a corrupt or truncated file.
    #[error("structural pointer to bytes {byte_range} exceeds the object size {object_size}")]
    CorruptPointer {
        /// The byte range referenced by the pointer.
        byte_range: ByteRange,
        /// The size of the object.
        object_size: u64,
    },
    /// A requested slice lies outside the bounds of a dataset dimension.
    #[error("slice {start}:{stop}:{step} of dimension {dimension} is out of bounds for extent {extent}")]
    Slice {
        /// The dimension index.
        dimension: usize,
        /// The slice start.
        start: u64,
        /// The slice stop.
        stop: u64,
        /// The slice step.
        step: u64,
        /// The extent of the dimension.
        extent: u64,
    },
    /// A requested slice has a different number of dimensions to the dataset.
    #[error("slice has {slice_rank} dimensions, dataset has {rank}")]
    SliceRank {
        /// The dataset rank.
        rank: usize,
        /// The slice rank.
        slice_rank: usize,
    },
}

impl From<InvalidByteRangeError> for OutOfRangeCause {
    fn from(err: InvalidByteRangeError) -> Self {
        Self::CorruptPointer {
            byte_range: err.byte_range(),
            object_size: err.bytes_len(),
        }
    }
}

/// A read error.
#[derive(Debug, Error)]
pub enum ReadError {
    /// A fetch from the storage backend failed. The whole call may be retried.
    #[error(transparent)]
    IOFailure(#[from] IOFailure),
    /// The object is not a valid or supported HDF5 container.
    #[error("format error resolving {context}: {source}")]
    FormatError {
        /// The structure or path being resolved.
        context: String,
        /// The underlying error.
        #[source]
        source: FormatError,
    },
    /// A dataset, group or attribute does not exist.
    #[error("{0} not found")]
    PathNotFound(String),
    /// Decoding a dataset requires a filter that is not implemented.
    #[error("dataset {path} requires unsupported filter {name} (id {id})")]
    UnsupportedFilter {
        /// The dataset path.
        path: String,
        /// The filter identifier.
        id: u16,
        /// The filter name.
        name: String,
    },
    /// A byte range or slice is out of range.
    #[error("out of range: {0}")]
    OutOfRange(#[from] OutOfRangeCause),
    /// The session is closed.
    #[error("the session is closed")]
    SessionClosed,
    /// The session cannot be opened from its current state.
    #[error("the session cannot be opened while it is {0}")]
    InvalidSessionState(SessionState),
    /// The read was cancelled.
    #[error("the read was cancelled")]
    Cancelled,
    /// An invalid node path.
    #[error(transparent)]
    InvalidPath(#[from] NodePathError),
    /// A node is not of the kind required by the operation.
    #[error("{path} is not a {expected}")]
    UnexpectedNodeKind {
        /// The node path.
        path: String,
        /// The required node kind.
        expected: &'static str,
    },
    /// An array error.
    #[error(transparent)]
    ArrayError(#[from] ArrayError),
}

impl ReadError {
    /// Returns true if the failed call may succeed if retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IOFailure(IOFailure::Timeout { .. } | IOFailure::Transient { .. })
        )
    }

    /// Wrap a [`FormatError`] with the structure or path being resolved.
    #[must_use]
    pub fn format(context: impl Into<String>, source: FormatError) -> Self {
        Self::FormatError {
            context: context.into(),
            source,
        }
    }

    /// Prefix the context of a [`ReadError::FormatError`] with the path being resolved.
    #[must_use]
    pub fn in_path(self, path: &NodePath) -> Self {
        match self {
            Self::FormatError { context, source } if !context.starts_with(path.as_str()) => {
                Self::FormatError {
                    context: format!("{path}: {context}"),
                    source,
                }
            }
            err => err,
        }
    }

    /// Wrap a [`FilterError`] raised while decoding a chunk of the dataset at `path`.
    #[must_use]
    pub fn filter(path: &str, err: FilterError) -> Self {
        match err {
            FilterError::Unsupported { id, name } => Self::UnsupportedFilter {
                path: path.to_string(),
                id,
                name,
            },
            err => Self::format(path, FormatError::Filter(err)),
        }
    }
}

impl From<FetchError> for ReadError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::IOFailure(err) => Self::IOFailure(err),
            FetchError::OutOfRange(err) => Self::OutOfRange(err.into()),
            FetchError::Cancelled => Self::Cancelled,
        }
    }
}
