//! Old-style groups: the symbol table message, local heaps and symbol table nodes.

use super::{
    cursor::{null_terminated, ByteCursor},
    FormatError,
};

/// A decoded symbol table message (type 0x0011).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTableMessage {
    /// The address of the group B-tree (type 0).
    pub btree_address: u64,
    /// The address of the local heap holding link names.
    pub heap_address: u64,
}

impl SymbolTableMessage {
    /// Decode a symbol table message.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the message is truncated.
    pub fn decode(data: &[u8], sizes: (u8, u8)) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "symbol table message", sizes);
        Ok(Self {
            btree_address: cursor.address()?,
            heap_address: cursor.address()?,
        })
    }
}

/// A decoded local heap header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalHeap {
    /// The size of the heap data segment in bytes.
    pub data_size: u64,
    /// The address of the heap data segment.
    pub data_address: u64,
}

impl LocalHeap {
    /// Return the size of a local heap header.
    #[must_use]
    pub fn header_size(sizes: (u8, u8)) -> u64 {
        8 + 2 * u64::from(sizes.1) + u64::from(sizes.0)
    }

    /// Decode a local heap header at `address`.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the signature or version is invalid, or the header is truncated.
    pub fn decode(data: &[u8], address: u64, sizes: (u8, u8)) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "local heap", sizes);
        cursor.signature(b"HEAP", address)?;
        let version = cursor.u8()?;
        if version != 0 {
            return Err(FormatError::UnsupportedVersion {
                structure: "local heap",
                version,
            });
        }
        cursor.skip(3)?;
        let data_size = cursor.length()?;
        let _free_list_offset = cursor.length()?;
        let data_address = cursor.address()?;
        Ok(Self {
            data_size,
            data_address,
        })
    }
}

/// Read the null-terminated string at `offset` of a local heap data segment.
///
/// # Errors
/// Returns a [`FormatError`] if `offset` is outside the data segment.
pub fn local_heap_string(heap_data: &[u8], offset: u64) -> Result<String, FormatError> {
    usize::try_from(offset)
        .ok()
        .and_then(|offset| heap_data.get(offset..))
        .map(null_terminated)
        .ok_or_else(|| {
            FormatError::Invalid(format!(
                "local heap offset {offset} is outside the heap data segment of {} bytes",
                heap_data.len()
            ))
        })
}

/// The cache type of a symbol table entry that is a soft link.
const CACHE_TYPE_SOFT_LINK: u32 = 2;

/// An entry of a symbol table node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTableEntry {
    /// The offset of the link name in the local heap.
    pub name_offset: u64,
    /// The address of the child object header.
    pub object_header_address: u64,
    /// The offset of the soft link value in the local heap, if the entry is a soft link.
    pub soft_link_offset: Option<u64>,
}

/// The size of the symbol table node header.
pub const SYMBOL_NODE_HEADER_SIZE: u64 = 8;

/// Return the size of one symbol table entry.
#[must_use]
pub fn symbol_table_entry_size(sizes: (u8, u8)) -> u64 {
    2 * u64::from(sizes.0) + 24
}

/// Decode a symbol table node header at `address`, returning the number of entries.
///
/// # Errors
/// Returns a [`FormatError`] if the signature or version is invalid, or the header is truncated.
pub fn decode_symbol_node_header(data: &[u8], address: u64) -> Result<u16, FormatError> {
    let mut cursor = ByteCursor::new(data, "symbol table node", (8, 8));
    cursor.signature(b"SNOD", address)?;
    let version = cursor.u8()?;
    if version != 1 {
        return Err(FormatError::UnsupportedVersion {
            structure: "symbol table node",
            version,
        });
    }
    cursor.skip(1)?;
    cursor.u16()
}

/// Decode `count` symbol table entries.
///
/// # Errors
/// Returns a [`FormatError`] if the entries are truncated.
pub fn decode_symbol_table_entries(
    data: &[u8],
    count: u16,
    sizes: (u8, u8),
) -> Result<Vec<SymbolTableEntry>, FormatError> {
    let mut cursor = ByteCursor::new(data, "symbol table entry", sizes);
    (0..count)
        .map(|_| {
            let name_offset = cursor.uint(cursor.offset_size())?;
            let object_header_address = cursor.address()?;
            let cache_type = cursor.u32()?;
            cursor.skip(4)?;
            let scratch = cursor.bytes(16)?;
            let soft_link_offset = (cache_type == CACHE_TYPE_SOFT_LINK).then(|| {
                u64::from(u32::from_le_bytes([
                    scratch[0], scratch[1], scratch[2], scratch[3],
                ]))
            });
            Ok(SymbolTableEntry {
                name_offset,
                object_header_address,
                soft_link_offset,
            })
        })
        .collect()
}
