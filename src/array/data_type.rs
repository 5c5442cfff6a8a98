//! Element data types.

use serde::{Deserialize, Serialize};

/// The data type of the elements of an [`Array`](super::Array).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[rustfmt::skip]
pub enum DataType {
    /// `int8` Integer in `[-2^7, 2^7-1]`.
    Int8,
    /// `int16` Integer in `[-2^15, 2^15-1]`.
    Int16,
    /// `int32` Integer in `[-2^31, 2^31-1]`.
    Int32,
    /// `int64` Integer in `[-2^63, 2^63-1]`.
    Int64,
    /// `uint8` Integer in `[0, 2^8-1]`.
    UInt8,
    /// `uint16` Integer in `[0, 2^16-1]`.
    UInt16,
    /// `uint32` Integer in `[0, 2^32-1]`.
    UInt32,
    /// `uint64` Integer in `[0, 2^64-1]`.
    UInt64,
    /// `float16` IEEE 754 half-precision floating point: sign bit, 5 bits exponent, 10 bits mantissa.
    Float16,
    /// `float32` IEEE 754 single-precision floating point: sign bit, 8 bits exponent, 23 bits mantissa.
    Float32,
    /// `float64` IEEE 754 double-precision floating point: sign bit, 11 bits exponent, 52 bits mantissa.
    Float64,
    /// A fixed-length string of `size` bytes, padded with nul bytes.
    FixedString {
        /// The string size in bytes.
        size: usize,
    },
    /// A variable-length string.
    VarString,
    /// Opaque elements of `size` bytes.
    Opaque {
        /// The element size in bytes.
        size: usize,
    },
}

impl DataType {
    /// Returns the identifier.
    #[must_use]
    pub const fn identifier(&self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float16 => "float16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::FixedString { .. } => "fixed_string",
            Self::VarString => "string",
            Self::Opaque { .. } => "opaque",
        }
    }

    /// Returns the size in bytes of an element, or [`None`] for variable-length strings.
    #[must_use]
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 | Self::Float16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(4),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(8),
            Self::FixedString { size } | Self::Opaque { size } => Some(*size),
            Self::VarString => None,
        }
    }

    /// Returns true if elements are numbers.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        !matches!(
            self,
            Self::FixedString { .. } | Self::VarString | Self::Opaque { .. }
        )
    }

    /// Returns true if elements are strings.
    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::FixedString { .. } | Self::VarString)
    }
}

impl core::fmt::Display for DataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FixedString { size } => write!(f, "fixed_string({size})"),
            Self::Opaque { size } => write!(f, "opaque({size})"),
            data_type => f.write_str(data_type.identifier()),
        }
    }
}
