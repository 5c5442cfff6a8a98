//! Object headers and their header messages.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::{
    attribute::AttributeMessage,
    checksum,
    cursor::ByteCursor,
    data_layout::DataLayout,
    dataspace::Dataspace,
    datatype::Datatype,
    fill_value::FillValue,
    filter_pipeline::{decode_filter_pipeline, FilterDescription},
    link::{Link, LinkInfo},
    symbol_table::SymbolTableMessage,
    FormatError,
};

/// The number of bytes fetched to decode an object header prefix.
///
/// This covers the largest version 2 prefix. Small object headers are often contained entirely in this fetch.
pub const OBJECT_HEADER_PREFIX_FETCH_SIZE: u64 = 64;

/// The header message flag marking a shared message.
const MESSAGE_FLAG_SHARED: u8 = 0b10;
/// The header message flag requiring readers that do not understand the message to fail.
const MESSAGE_FLAG_FAIL_IF_UNKNOWN: u8 = 0b1000_0000;

/// A decoded object header prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeaderPrefix {
    /// The object header version (1 or 2).
    pub version: u8,
    /// The object header flags (version 2).
    pub flags: u8,
    /// The size of the prefix in bytes.
    pub prefix_size: u64,
    /// The size of the first block of header messages in bytes.
    pub block_size: u64,
}

impl ObjectHeaderPrefix {
    /// Decode an object header prefix at `address`.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the version is unsupported or the prefix is truncated.
    pub fn decode(data: &[u8], address: u64) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "object header", (8, 8));
        if data.starts_with(b"OHDR") {
            cursor.skip(4)?;
            let version = cursor.u8()?;
            if version != 2 {
                return Err(FormatError::UnsupportedVersion {
                    structure: "object header",
                    version,
                });
            }
            let flags = cursor.u8()?;
            if flags & 0b10_0000 != 0 {
                // access, modification, change and birth times
                cursor.skip(16)?;
            }
            if flags & 0b1_0000 != 0 {
                // maximum compact and minimum dense attribute counts
                cursor.skip(4)?;
            }
            let block_size = cursor.uint(1 << (flags & 0b11))?;
            Ok(Self {
                version,
                flags,
                prefix_size: cursor.position() as u64,
                block_size,
            })
        } else {
            let version = cursor.u8()?;
            if version != 1 {
                tracing::debug!(address, version, "invalid object header version");
                return Err(FormatError::UnsupportedVersion {
                    structure: "object header",
                    version,
                });
            }
            cursor.skip(1)?;
            let _message_count = cursor.u16()?;
            let _reference_count = cursor.u32()?;
            let block_size = u64::from(cursor.u32()?);
            Ok(Self {
                version,
                flags: 0,
                prefix_size: 16,
                block_size,
            })
        }
    }

    /// Return the size of the first header block, including the prefix and any checksum.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.prefix_size + self.block_size + self.checksum_size()
    }

    fn checksum_size(&self) -> u64 {
        if self.version == 2 {
            4
        } else {
            0
        }
    }

    /// Return the header messages of the first header block.
    ///
    /// `data` holds the whole first block (see [`total_size`](Self::total_size)).
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the checksum does not match or a message is truncated.
    pub fn first_block_messages(
        &self,
        data: &Bytes,
        validate_checksum: bool,
    ) -> Result<Vec<RawMessage>, FormatError> {
        if self.version == 2 && validate_checksum {
            checksum::verify_trailing(data, "object header")?;
        }
        let start = usize::try_from(self.prefix_size).unwrap_or(usize::MAX);
        let end = data.len().saturating_sub(self.checksum_size() as usize);
        if start > end {
            return Err(FormatError::Truncated {
                structure: "object header",
                position: 0,
                needed: start,
                available: data.len(),
            });
        }
        decode_messages(&data.slice(start..end), self.version, self.flags)
    }

    /// Return the header messages of a continuation block at `address`.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the signature or checksum is invalid, or a message is truncated.
    pub fn continuation_messages(
        &self,
        data: &Bytes,
        address: u64,
        validate_checksum: bool,
    ) -> Result<Vec<RawMessage>, FormatError> {
        if self.version == 1 {
            return decode_messages(data, self.version, self.flags);
        }
        let mut cursor = ByteCursor::new(data, "object header continuation block", (8, 8));
        cursor.signature(b"OCHK", address)?;
        if validate_checksum {
            checksum::verify_trailing(data, "object header continuation block")?;
        }
        let end = data.len().saturating_sub(4).max(4);
        decode_messages(&data.slice(4..end), self.version, self.flags)
    }
}

/// An undecoded header message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// The message type.
    pub kind: u16,
    /// The message flags.
    pub flags: u8,
    /// The message data.
    pub data: Bytes,
}

fn decode_messages(
    block: &Bytes,
    version: u8,
    header_flags: u8,
) -> Result<Vec<RawMessage>, FormatError> {
    let mut cursor = ByteCursor::new(block, "object header message", (8, 8));
    let header_size = match version {
        1 => 8,
        _ if header_flags & 0b100 != 0 => 6,
        _ => 4,
    };
    let mut messages = Vec::new();
    while cursor.remaining() >= header_size {
        let (kind, size, flags) = if version == 1 {
            let kind = cursor.u16()?;
            let size = cursor.u16()?;
            let flags = cursor.u8()?;
            cursor.skip(3)?;
            (kind, size, flags)
        } else {
            let kind = u16::from(cursor.u8()?);
            let size = cursor.u16()?;
            let flags = cursor.u8()?;
            if header_flags & 0b100 != 0 {
                let _creation_order = cursor.u16()?;
            }
            (kind, size, flags)
        };
        let start = cursor.position();
        cursor.skip(usize::from(size))?;
        messages.push(RawMessage {
            kind,
            flags,
            data: block.slice(start..start + usize::from(size)),
        });
        if version == 1 {
            cursor.align(8)?;
        }
    }
    Ok(messages)
}

/// A decoded header message.
///
/// Message types that are not needed to read groups and datasets decode to [`HeaderMessage::Unknown`] and are skipped.
#[derive(Debug, Clone)]
pub enum HeaderMessage {
    /// A nil (padding) message.
    Nil,
    /// The dataspace of a dataset.
    Dataspace(Dataspace),
    /// The link info of a new-style group.
    LinkInfo(LinkInfo),
    /// The datatype of a dataset.
    Datatype(Datatype),
    /// An old-style fill value.
    FillValueOld(FillValue),
    /// The fill value of a dataset.
    FillValue(FillValue),
    /// A link of a compact new-style group.
    Link(Link),
    /// The data layout of a dataset.
    DataLayout(DataLayout),
    /// The filter pipeline of a chunked dataset.
    FilterPipeline(Vec<FilterDescription>),
    /// An attribute.
    Attribute(AttributeMessage),
    /// A continuation of the object header at another address.
    Continuation {
        /// The address of the continuation block.
        address: u64,
        /// The length of the continuation block.
        length: u64,
    },
    /// The symbol table of an old-style group.
    SymbolTable(SymbolTableMessage),
    /// The object modification time.
    ModificationTime(DateTime<Utc>),
    /// A message type that is not decoded.
    Unknown {
        /// The message type.
        kind: u16,
        /// The message flags.
        flags: u8,
    },
}

impl HeaderMessage {
    /// Decode a raw header message.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the message is invalid, shared, or is an unknown message that must be understood.
    pub fn decode(raw: &RawMessage, sizes: (u8, u8)) -> Result<Self, FormatError> {
        let data = &raw.data;
        if raw.flags & MESSAGE_FLAG_SHARED != 0 && raw.kind != 0 {
            return Err(FormatError::Unsupported(format!(
                "shared header message type {:#06x}",
                raw.kind
            )));
        }
        let message = match raw.kind {
            0x0000 => Self::Nil,
            0x0001 => Self::Dataspace(Dataspace::decode(data, sizes)?),
            0x0002 => Self::LinkInfo(LinkInfo::decode(data, sizes)?),
            0x0003 => Self::Datatype(Datatype::decode(data)?),
            0x0004 => Self::FillValueOld(FillValue::decode_old(data)?),
            0x0005 => Self::FillValue(FillValue::decode(data)?),
            0x0006 => Self::Link(Link::decode(data, sizes)?),
            0x0008 => Self::DataLayout(DataLayout::decode(data, sizes)?),
            0x000B => Self::FilterPipeline(decode_filter_pipeline(data)?),
            0x000C => Self::Attribute(AttributeMessage::decode(data, sizes)?),
            0x0010 => {
                let mut cursor = ByteCursor::new(data, "continuation message", sizes);
                Self::Continuation {
                    address: cursor.address()?,
                    length: cursor.length()?,
                }
            }
            0x0011 => Self::SymbolTable(SymbolTableMessage::decode(data, sizes)?),
            0x0012 => {
                let mut cursor = ByteCursor::new(data, "modification time message", sizes);
                let version = cursor.u8()?;
                if version != 1 {
                    return Err(FormatError::UnsupportedVersion {
                        structure: "modification time message",
                        version,
                    });
                }
                cursor.skip(3)?;
                let seconds = cursor.u32()?;
                let time = DateTime::from_timestamp(i64::from(seconds), 0).ok_or_else(|| {
                    FormatError::Invalid(format!("invalid modification time {seconds}"))
                })?;
                Self::ModificationTime(time)
            }
            kind => {
                if raw.flags & MESSAGE_FLAG_FAIL_IF_UNKNOWN != 0 {
                    return Err(FormatError::UnknownRequiredMessage(kind));
                }
                tracing::debug!(kind, size = data.len(), "skipping header message");
                Self::Unknown {
                    kind,
                    flags: raw.flags,
                }
            }
        };
        Ok(message)
    }
}
