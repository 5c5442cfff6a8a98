use bytes::Bytes;
use serde::Serialize;

use super::{cursor::ByteCursor, FormatError, UNDEFINED_ADDRESS};

/// The chunk index of a chunked layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChunkIndex {
    /// A version 1 B-tree of chunks (layout version 3).
    BTreeV1 {
        /// The address of the root node.
        address: u64,
    },
    /// The dataset has a single chunk.
    SingleChunk {
        /// The address of the chunk.
        address: u64,
        /// The size of the filtered chunk, if the dataset has filters.
        filtered_size: Option<u64>,
        /// The filter mask of the chunk.
        filter_mask: u32,
    },
    /// Chunks are stored contiguously in row-major chunk order without an index.
    Implicit {
        /// The address of the first chunk.
        address: u64,
    },
}

impl ChunkIndex {
    /// Returns true if no chunks have been allocated.
    #[must_use]
    pub fn is_unallocated(&self) -> bool {
        let (Self::BTreeV1 { address }
        | Self::SingleChunk { address, .. }
        | Self::Implicit { address }) = self;
        *address == UNDEFINED_ADDRESS
    }
}

/// A decoded data layout message (type 0x0008).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DataLayout {
    /// Raw data stored in the object header.
    Compact {
        /// The raw data.
        #[serde(skip)]
        data: Bytes,
    },
    /// Raw data stored in one contiguous region of the file.
    Contiguous {
        /// The address of the data, or [`UNDEFINED_ADDRESS`] if unallocated.
        address: u64,
        /// The size of the data in bytes.
        size: u64,
    },
    /// Raw data stored in equally shaped chunks.
    Chunked {
        /// The chunk shape as stored, possibly including a trailing element size dimension.
        chunk_dims: Vec<u64>,
        /// The chunk index.
        index: ChunkIndex,
    },
}

fn index_name(index_type: u8) -> &'static str {
    match index_type {
        3 => "fixed array",
        4 => "extensible array",
        5 => "version 2 B-tree",
        _ => "unknown",
    }
}

impl DataLayout {
    /// Return the layout name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Compact { .. } => "compact",
            Self::Contiguous { .. } => "contiguous",
            Self::Chunked { .. } => "chunked",
        }
    }

    /// Decode a data layout message.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the version, layout class or chunk index is unsupported, or the message is truncated.
    pub fn decode(data: &Bytes, sizes: (u8, u8)) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "data layout message", sizes);
        let version = cursor.u8()?;
        if !matches!(version, 3 | 4) {
            return Err(FormatError::UnsupportedVersion {
                structure: "data layout message",
                version,
            });
        }
        match cursor.u8()? {
            0 => {
                let size = usize::from(cursor.u16()?);
                let start = cursor.position();
                cursor.skip(size)?;
                Ok(Self::Compact {
                    data: data.slice(start..start + size),
                })
            }
            1 => Ok(Self::Contiguous {
                address: cursor.address()?,
                size: cursor.length()?,
            }),
            2 if version == 3 => {
                let dimensionality = cursor.u8()?;
                let address = cursor.address()?;
                let chunk_dims = (0..dimensionality)
                    .map(|_| cursor.u32().map(u64::from))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Chunked {
                    chunk_dims,
                    index: ChunkIndex::BTreeV1 { address },
                })
            }
            2 => {
                let flags = cursor.u8()?;
                let dimensionality = cursor.u8()?;
                let dim_size = cursor.u8()?;
                if !(1..=8).contains(&dim_size) {
                    return Err(FormatError::Invalid(format!(
                        "invalid chunk dimension size width {dim_size}"
                    )));
                }
                let chunk_dims = (0..dimensionality)
                    .map(|_| cursor.uint(dim_size))
                    .collect::<Result<Vec<_>, _>>()?;
                let index = match cursor.u8()? {
                    1 => {
                        let (filtered_size, filter_mask) = if flags & 0b10 != 0 {
                            (Some(cursor.length()?), cursor.u32()?)
                        } else {
                            (None, 0)
                        };
                        ChunkIndex::SingleChunk {
                            address: cursor.address()?,
                            filtered_size,
                            filter_mask,
                        }
                    }
                    2 => ChunkIndex::Implicit {
                        address: cursor.address()?,
                    },
                    index_type => {
                        tracing::warn!(index_type, "unsupported chunk index");
                        return Err(FormatError::Unsupported(format!(
                            "{} chunk index (type {index_type})",
                            index_name(index_type)
                        )));
                    }
                };
                Ok(Self::Chunked { chunk_dims, index })
            }
            3 => Err(FormatError::Unsupported(
                "virtual dataset layout".to_string(),
            )),
            class => Err(FormatError::Invalid(format!(
                "invalid data layout class {class}"
            ))),
        }
    }
}
