use derive_more::{Display, From};
use thiserror::Error;

/// The key of an object in a storage backend.
///
/// For a filesystem backend this is a path relative to the base directory, for object storage it is the object path within the bucket.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct ObjectKey(String);

/// An invalid object key.
#[derive(Debug, From, Error)]
#[error("invalid object key {0}")]
pub struct ObjectKeyError(String);

impl ObjectKey {
    /// Create a new object key from `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectKeyError`] if `key` is not valid according to [`ObjectKey::validate()`].
    pub fn new(key: impl Into<String>) -> Result<Self, ObjectKeyError> {
        let key = key.into();
        if Self::validate(&key) {
            Ok(Self(key))
        } else {
            Err(ObjectKeyError(key))
        }
    }

    /// Extracts a string slice of the underlying key [`String`].
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a key.
    ///
    /// A key is a non-empty string that does not start or end with `/` and has no empty or `..` segments.
    #[must_use]
    pub fn validate(key: &str) -> bool {
        !key.is_empty()
            && !key.starts_with('/')
            && !key.ends_with('/')
            && key.split('/').all(|segment| !segment.is_empty() && segment != "..")
    }
}

impl TryFrom<&str> for ObjectKey {
    type Error = ObjectKeyError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}
