use serde::Serialize;

use super::{
    cursor::{null_terminated, ByteCursor},
    FormatError,
};
use crate::array::DataType;

/// The byte order of numeric elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ByteOrder {
    /// Little endian.
    LittleEndian,
    /// Big endian.
    BigEndian,
}

impl ByteOrder {
    fn from_bit(bit_field: u32) -> Self {
        if bit_field & 1 == 0 {
            Self::LittleEndian
        } else {
            Self::BigEndian
        }
    }
}

/// The character set of a string datatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CharacterSet {
    /// ASCII.
    Ascii,
    /// UTF-8.
    Utf8,
}

impl CharacterSet {
    fn decode(value: u32) -> Result<Self, FormatError> {
        match value {
            0 => Ok(Self::Ascii),
            1 => Ok(Self::Utf8),
            value => Err(FormatError::Invalid(format!(
                "invalid character set {value}"
            ))),
        }
    }
}

/// A decoded datatype message (type 0x0003).
///
/// Classes that cannot be read into an [`Array`](crate::array::Array) are retained as [`Datatype::Unsupported`] so that the object header still decodes, and fail when read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Datatype {
    /// A fixed-point (integer) datatype.
    FixedPoint {
        /// The element size in bytes.
        size: u32,
        /// The byte order.
        byte_order: ByteOrder,
        /// Whether the integer is signed.
        signed: bool,
    },
    /// A floating-point datatype.
    FloatingPoint {
        /// The element size in bytes.
        size: u32,
        /// The byte order.
        byte_order: ByteOrder,
    },
    /// A fixed-length string.
    String {
        /// The string size in bytes.
        size: u32,
        /// The character set.
        charset: CharacterSet,
    },
    /// A variable-length string stored in a global heap.
    VarString {
        /// The size of a heap reference in bytes.
        size: u32,
        /// The character set.
        charset: CharacterSet,
    },
    /// A bit field, read as an unsigned integer.
    BitField {
        /// The element size in bytes.
        size: u32,
        /// The byte order.
        byte_order: ByteOrder,
    },
    /// Opaque bytes.
    Opaque {
        /// The element size in bytes.
        size: u32,
        /// The opaque tag.
        tag: String,
    },
    /// An enumeration, read as its base integer type.
    Enumeration {
        /// The base datatype.
        base: Box<Datatype>,
        /// The member names.
        members: Vec<String>,
    },
    /// A datatype class that is not supported.
    Unsupported {
        /// The datatype class.
        class: u8,
        /// The element size in bytes.
        size: u32,
    },
}

fn class_name(class: u8) -> &'static str {
    match class {
        2 => "time",
        6 => "compound",
        7 => "reference",
        9 => "variable-length sequence",
        10 => "array",
        _ => "unknown",
    }
}

impl Datatype {
    /// Decode a datatype message.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the message is truncated or invalid.
    pub fn decode(data: &[u8]) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "datatype message", (8, 8));
        Self::decode_cursor(&mut cursor)
    }

    fn decode_cursor(cursor: &mut ByteCursor) -> Result<Self, FormatError> {
        let class_and_version = cursor.u8()?;
        let class = class_and_version & 0x0f;
        let version = class_and_version >> 4;
        if !(1..=4).contains(&version) {
            return Err(FormatError::UnsupportedVersion {
                structure: "datatype message",
                version,
            });
        }
        let bit_field = {
            let [b0, b1, b2] = cursor.array::<3>()?;
            u32::from_le_bytes([b0, b1, b2, 0])
        };
        let size = cursor.u32()?;

        let datatype = match class {
            0 => {
                // bit offset, precision
                cursor.skip(4)?;
                Self::FixedPoint {
                    size,
                    byte_order: ByteOrder::from_bit(bit_field),
                    signed: bit_field & 0b1000 != 0,
                }
            }
            1 => {
                if bit_field & 0b100_0000 != 0 {
                    return Err(FormatError::Unsupported(
                        "VAX floating-point byte order".to_string(),
                    ));
                }
                // bit offset, precision, exponent and mantissa fields, exponent bias
                cursor.skip(12)?;
                Self::FloatingPoint {
                    size,
                    byte_order: ByteOrder::from_bit(bit_field),
                }
            }
            3 => Self::String {
                size,
                charset: CharacterSet::decode((bit_field >> 4) & 0x0f)?,
            },
            4 => {
                cursor.skip(4)?;
                Self::BitField {
                    size,
                    byte_order: ByteOrder::from_bit(bit_field),
                }
            }
            5 => {
                let tag_length = (bit_field & 0xff) as usize;
                let tag = null_terminated(cursor.bytes(tag_length)?);
                Self::Opaque { size, tag }
            }
            8 => {
                let base = Self::decode_cursor(cursor)?;
                let count = bit_field & 0xffff;
                let mut members = Vec::new();
                for _ in 0..count {
                    let name = null_terminated(cursor.rest());
                    let mut consumed = name.len() + 1;
                    if version < 3 {
                        consumed = consumed.next_multiple_of(8);
                    }
                    cursor.skip(consumed)?;
                    members.push(name);
                }
                // member values follow the names and are not needed
                Self::Enumeration {
                    base: Box::new(base),
                    members,
                }
            }
            9 if bit_field & 0x0f == 1 => {
                // the base type (a one byte character) follows and is implied
                Self::VarString {
                    size,
                    charset: CharacterSet::decode((bit_field >> 8) & 0x0f)?,
                }
            }
            class => Self::Unsupported { class, size },
        };
        Ok(datatype)
    }

    /// Return the element size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::FixedPoint { size, .. }
            | Self::FloatingPoint { size, .. }
            | Self::String { size, .. }
            | Self::VarString { size, .. }
            | Self::BitField { size, .. }
            | Self::Opaque { size, .. }
            | Self::Unsupported { size, .. } => *size as usize,
            Self::Enumeration { base, .. } => base.size(),
        }
    }

    /// Return the byte order of numeric elements.
    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        match self {
            Self::FixedPoint { byte_order, .. }
            | Self::FloatingPoint { byte_order, .. }
            | Self::BitField { byte_order, .. } => *byte_order,
            Self::Enumeration { base, .. } => base.byte_order(),
            _ => ByteOrder::LittleEndian,
        }
    }

    /// Return the [`DataType`] of elements read with this datatype.
    ///
    /// # Errors
    /// Returns [`FormatError::Unsupported`] for datatype classes and sizes that cannot be read.
    pub fn data_type(&self) -> Result<DataType, FormatError> {
        let unsupported = || FormatError::Unsupported(format!("datatype {self:?}"));
        match self {
            Self::FixedPoint { size, signed, .. } => match (size, signed) {
                (1, true) => Ok(DataType::Int8),
                (2, true) => Ok(DataType::Int16),
                (4, true) => Ok(DataType::Int32),
                (8, true) => Ok(DataType::Int64),
                (1, false) => Ok(DataType::UInt8),
                (2, false) => Ok(DataType::UInt16),
                (4, false) => Ok(DataType::UInt32),
                (8, false) => Ok(DataType::UInt64),
                _ => Err(unsupported()),
            },
            Self::BitField { size, .. } => match size {
                1 => Ok(DataType::UInt8),
                2 => Ok(DataType::UInt16),
                4 => Ok(DataType::UInt32),
                8 => Ok(DataType::UInt64),
                _ => Err(unsupported()),
            },
            Self::FloatingPoint { size, .. } => match size {
                2 => Ok(DataType::Float16),
                4 => Ok(DataType::Float32),
                8 => Ok(DataType::Float64),
                _ => Err(unsupported()),
            },
            Self::String { size, .. } => Ok(DataType::FixedString {
                size: *size as usize,
            }),
            Self::VarString { .. } => Ok(DataType::VarString),
            Self::Opaque { size, .. } => Ok(DataType::Opaque {
                size: *size as usize,
            }),
            Self::Enumeration { base, .. } => base.data_type(),
            Self::Unsupported { class, .. } => Err(FormatError::Unsupported(format!(
                "{} datatype (class {class})",
                class_name(*class)
            ))),
        }
    }
}
