//! Storage backends.
//!
//! All backends implement [`AsyncReadableStorageTraits`](super::AsyncReadableStorageTraits) and can be selected when a session is opened.

mod filesystem_store;
mod memory_store;

#[cfg(feature = "object_store")]
mod object_store;

pub use filesystem_store::{AsyncFilesystemStore, FilesystemStoreCreateError};
pub use memory_store::AsyncMemoryStore;

#[cfg(feature = "object_store")]
pub use self::object_store::AsyncObjectStore;
