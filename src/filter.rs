//! Chunk filters.
//!
//! A [`FilterPipeline`] is built from the filter pipeline message of a dataset and decodes stored chunks by applying its filters in reverse order.
//!
//! Supported filters:
//!  - `deflate` (id 1, feature `deflate`)
//!  - `shuffle` (id 2)
//!  - `fletcher32` (id 3)
//!  - `zstd` (id 32015, feature `zstd`)
//!
//! Any other filter fails pipeline construction with [`FilterError::Unsupported`], so stored bytes are never passed through undecoded.

#[cfg(feature = "deflate")]
mod deflate;
mod fletcher32;
mod shuffle;
#[cfg(feature = "zstd")]
mod zstd;

use thiserror::Error;

use crate::format::FilterDescription;

#[cfg(feature = "deflate")]
pub use deflate::DeflateFilter;
pub use fletcher32::{fletcher32, Fletcher32Filter};
pub use shuffle::ShuffleFilter;
#[cfg(feature = "zstd")]
pub use self::zstd::ZstdFilter;

/// The `deflate` filter identifier.
pub const FILTER_DEFLATE: u16 = 1;
/// The `shuffle` filter identifier.
pub const FILTER_SHUFFLE: u16 = 2;
/// The `fletcher32` filter identifier.
pub const FILTER_FLETCHER32: u16 = 3;
/// The `zstd` filter identifier.
pub const FILTER_ZSTD: u16 = 32015;

/// A filter error.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The filter is not supported.
    #[error("unsupported filter {name} (id {id})")]
    Unsupported {
        /// The filter identifier.
        id: u16,
        /// The filter name.
        name: String,
    },
    /// The stored chunk could not be decoded.
    #[error("corrupt chunk: {0}")]
    Corrupt(String),
    /// A stored checksum does not match the chunk.
    #[error("chunk checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// The stored checksum.
        stored: u32,
        /// The computed checksum.
        computed: u32,
    },
}

impl From<std::io::Error> for FilterError {
    fn from(err: std::io::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

/// Return the well-known name of a filter identifier.
#[must_use]
pub fn filter_name(id: u16) -> &'static str {
    match id {
        1 => "deflate",
        2 => "shuffle",
        3 => "fletcher32",
        4 => "szip",
        5 => "nbit",
        6 => "scaleoffset",
        307 => "bzip2",
        32000 => "lzf",
        32001 => "blosc",
        32004 => "lz4",
        32008 => "bitshuffle",
        32015 => "zstd",
        _ => "unknown",
    }
}

/// Options for decoding chunks.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    validate_checksums: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            validate_checksums: crate::config::global_config().validate_checksums(),
        }
    }
}

impl DecodeOptions {
    /// Create decode options.
    #[must_use]
    pub fn new(validate_checksums: bool) -> Self {
        Self { validate_checksums }
    }

    /// Returns true if checksums are validated.
    #[must_use]
    pub fn validate_checksums(&self) -> bool {
        self.validate_checksums
    }
}

/// Traits for a filter that decodes stored chunk bytes.
pub trait FilterTraits: std::fmt::Debug + Send + Sync {
    /// Return the filter identifier.
    fn id(&self) -> u16;

    /// Decode `encoded` bytes.
    ///
    /// # Errors
    /// Returns a [`FilterError`] if the bytes are corrupt.
    fn decode(&self, encoded: Vec<u8>, options: &DecodeOptions) -> Result<Vec<u8>, FilterError>;
}

/// Create the filter for a filter description.
///
/// `element_size` is the dataset element size, used by the `shuffle` filter if its client data does not declare one.
///
/// # Errors
/// Returns [`FilterError::Unsupported`] if the filter is not supported.
pub fn create_filter(
    description: &FilterDescription,
    element_size: usize,
) -> Result<Box<dyn FilterTraits>, FilterError> {
    match description.id {
        #[cfg(feature = "deflate")]
        FILTER_DEFLATE => Ok(Box::new(DeflateFilter)),
        FILTER_SHUFFLE => {
            let element_size = description
                .client_data
                .first()
                .map_or(element_size, |size| *size as usize);
            Ok(Box::new(ShuffleFilter::new(element_size)))
        }
        FILTER_FLETCHER32 => Ok(Box::new(Fletcher32Filter)),
        #[cfg(feature = "zstd")]
        FILTER_ZSTD => Ok(Box::new(ZstdFilter)),
        id => {
            let name = description
                .name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| filter_name(id).to_string());
            tracing::warn!(id, name, "unsupported filter");
            Err(FilterError::Unsupported { id, name })
        }
    }
}

/// The decoding side of a dataset filter pipeline.
#[derive(Debug, Default)]
pub struct FilterPipeline {
    filters: Vec<Box<dyn FilterTraits>>,
}

impl FilterPipeline {
    /// Create a filter pipeline from filter descriptions in the order they were applied when writing.
    ///
    /// # Errors
    /// Returns [`FilterError::Unsupported`] if any filter is not supported.
    pub fn new(descriptions: &[FilterDescription], element_size: usize) -> Result<Self, FilterError> {
        let filters = descriptions
            .iter()
            .map(|description| create_filter(description, element_size))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { filters })
    }

    /// Returns true if the pipeline has no filters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Return the identifiers of the filters in the order they were applied when writing.
    #[must_use]
    pub fn ids(&self) -> Vec<u16> {
        self.filters.iter().map(|filter| filter.id()).collect()
    }

    /// Decode a stored chunk.
    ///
    /// Filters are applied in reverse order. Filter `i` is skipped if bit `i` of `filter_mask` is set.
    ///
    /// # Errors
    /// Returns a [`FilterError`] if any filter fails.
    pub fn decode_chunk(
        &self,
        encoded: Vec<u8>,
        filter_mask: u32,
        options: &DecodeOptions,
    ) -> Result<Vec<u8>, FilterError> {
        self.filters
            .iter()
            .enumerate()
            .rev()
            .filter(|(i, _)| *i >= 32 || filter_mask & (1 << i) == 0)
            .try_fold(encoded, |bytes, (_, filter)| filter.decode(bytes, options))
    }
}
