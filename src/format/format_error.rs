use thiserror::Error;

use crate::filter::FilterError;

/// An error decoding HDF5 structural bytes.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The HDF5 signature was not found at any valid superblock offset.
    #[error("HDF5 signature not found at any valid superblock offset")]
    SignatureNotFound,
    /// A structure has a version that is not supported.
    #[error("unsupported {structure} version {version}")]
    UnsupportedVersion {
        /// The structure kind.
        structure: &'static str,
        /// The version found.
        version: u8,
    },
    /// A structure ended before a field could be read.
    #[error("truncated {structure}: need {needed} bytes at position {position}, have {available}")]
    Truncated {
        /// The structure kind.
        structure: &'static str,
        /// The position of the field within the structure.
        position: usize,
        /// The number of bytes needed.
        needed: usize,
        /// The number of bytes available.
        available: usize,
    },
    /// A structure does not start with its expected signature.
    #[error("invalid {structure} signature at address {address}")]
    InvalidSignature {
        /// The structure kind.
        structure: &'static str,
        /// The address of the structure.
        address: u64,
    },
    /// A length field implies a read past the end of the object.
    #[error("{structure} at address {address} declares {length} bytes, past the object size {object_size}")]
    LengthPastEnd {
        /// The structure kind.
        structure: &'static str,
        /// The address of the structure.
        address: u64,
        /// The declared length.
        length: u64,
        /// The size of the object.
        object_size: u64,
    },
    /// A stored checksum does not match the computed checksum.
    #[error("{structure} checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// The structure kind.
        structure: &'static str,
        /// The stored checksum.
        stored: u32,
        /// The computed checksum.
        computed: u32,
    },
    /// An unknown header message is flagged as one that must be understood.
    #[error("unknown header message type {0:#06x} is marked as must-understand")]
    UnknownRequiredMessage(u16),
    /// A valid but unsupported format feature.
    #[error("unsupported format feature: {0}")]
    Unsupported(String),
    /// An invalid field value.
    #[error("{0}")]
    Invalid(String),
    /// A chunk could not be decoded by its filter pipeline.
    #[error(transparent)]
    Filter(FilterError),
}
