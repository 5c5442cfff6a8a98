//! A rust library for reading [HDF5](https://www.hdfgroup.org/solutions/hdf5/) containers, and the [ASDF](https://seismic-data.org) seismic convention layered on them, directly from object storage.
//!
//! Datasets are read without downloading the whole file.
//! Only the structural bytes needed to resolve a path (superblock, object headers, group and chunk B-trees) and the chunks intersecting a requested slice are fetched, using targeted byte-range reads that are overlapped for throughput and memoised in a per-session cache.
//!
//! ## Getting Started
//! - A [`Session`](session::Session) owns one open object and exposes the read API: [`list`](session::Session::list), [`read_dataset`](session::Session::read_dataset), [`read_attribute`](session::Session::read_attribute) and [`close`](session::Session::close).
//! - Storage backends implement [`AsyncReadableStorageTraits`](storage::AsyncReadableStorageTraits). See [`storage::store`] for the bundled backends.
//! - [`asdf::AsdfDataSet`] adds seismic conveniences (waveform traces, `QuakeML`, `StationXML`) on top of a session.
//!
//! ## Example
//! ```rust,ignore
//! # use std::sync::Arc;
//! use cloud_asdf::{array_subset::SliceRequest, session, storage::{store::AsyncFilesystemStore, ObjectKey}};
//!
//! let store = Arc::new(AsyncFilesystemStore::new("/path/to/data")?);
//! let session = session::open(store, ObjectKey::new("events.h5")?, Default::default()).await?;
//! println!("{:?}", session.list("/Waveforms").await?);
//!
//! let slice = SliceRequest::new(vec![(20, 30, 1), (0, 10, 1)])?;
//! let array = session.read_dataset("/Waveforms/UW.OSD/trace", Some(&slice)).await?;
//! println!("{:?} {:?}", array.shape(), array.data_type());
//! session.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Format Support
//! - Superblock versions 0 to 3, object header versions 1 and 2.
//! - Old-style (symbol table) groups and compact new-style (link message) groups.
//! - Compact, contiguous and chunked layouts. Chunk indexes: version 1 B-trees, single chunk and implicit.
//! - Filters: `deflate`, `shuffle`, `fletcher32` and `zstd`. Any other filter fails with [`ReadError::UnsupportedFilter`](error::ReadError::UnsupportedFilter).
//!
//! ## Crate Features
//! #### Default
//!  - `ndarray`: [`ndarray`] utility functions for [`Array`](crate::array::Array).
//!  - `object_store`: the [`AsyncObjectStore`](storage::store::AsyncObjectStore) backend.
//!  - Filters: `deflate`, `zstd`.
//!
//! ## Logging
//! Events are emitted with [`tracing`]. Install a subscriber in the application to see them.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod array;
pub mod array_subset;
pub mod asdf;
pub mod byte_range;
pub mod chunk_cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod format;
pub mod node;
pub mod range_fetcher;
pub mod session;
pub mod storage;

pub use error::ReadError;
pub use session::{open, Session};
