//! Version 1 B-trees indexing group symbol table nodes (type 0) and raw data chunks (type 1).

use super::{cursor::ByteCursor, FormatError};

/// The node type of a version 1 B-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BTreeV1Type {
    /// Group nodes. Children of leaves are symbol table nodes.
    Group,
    /// Raw data chunk nodes. Children of leaves are chunks.
    Chunk,
}

/// A decoded version 1 B-tree node header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreeV1Header {
    /// The node type.
    pub node_type: BTreeV1Type,
    /// The node level. Leaves are at level zero.
    pub level: u8,
    /// The number of children.
    pub entries_used: u16,
}

/// The key of a chunk B-tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkKey {
    /// The size of the stored (filtered) chunk in bytes.
    pub chunk_size: u32,
    /// The mask of filters skipped for the chunk.
    pub filter_mask: u32,
    /// The element offset of the chunk in each dimension, excluding the trailing element size dimension.
    pub offsets: Vec<u64>,
}

/// A decoded version 1 B-tree node body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeV1Node {
    /// The node header.
    pub header: BTreeV1Header,
    /// The child addresses.
    pub children: Vec<u64>,
    /// The keys of a chunk node. Key `i` is the lower bound of child `i`, key `entries_used` the upper bound of the node.
    ///
    /// Empty for group nodes.
    pub chunk_keys: Vec<ChunkKey>,
}

impl BTreeV1Header {
    /// Return the size of a node header.
    #[must_use]
    pub fn size(sizes: (u8, u8)) -> u64 {
        8 + 2 * u64::from(sizes.0)
    }

    /// Decode a node header at `address`.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the signature or node type is invalid, or the header is truncated.
    pub fn decode(data: &[u8], address: u64, sizes: (u8, u8)) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "version 1 B-tree node", sizes);
        cursor.signature(b"TREE", address)?;
        let node_type = match cursor.u8()? {
            0 => BTreeV1Type::Group,
            1 => BTreeV1Type::Chunk,
            node_type => {
                return Err(FormatError::Invalid(format!(
                    "invalid version 1 B-tree node type {node_type} at address {address}"
                )))
            }
        };
        let level = cursor.u8()?;
        let entries_used = cursor.u16()?;
        let _left_sibling = cursor.address()?;
        let _right_sibling = cursor.address()?;
        Ok(Self {
            node_type,
            level,
            entries_used,
        })
    }

    /// Return the size of the key of this node.
    ///
    /// `chunk_dimensionality` is the dimensionality of the chunk layout, including the element size dimension.
    #[must_use]
    pub fn key_size(&self, sizes: (u8, u8), chunk_dimensionality: usize) -> u64 {
        match self.node_type {
            BTreeV1Type::Group => u64::from(sizes.1),
            BTreeV1Type::Chunk => 8 + 8 * chunk_dimensionality as u64,
        }
    }

    /// Return the size of the node body (keys and children) that follows the header.
    #[must_use]
    pub fn body_size(&self, sizes: (u8, u8), chunk_dimensionality: usize) -> u64 {
        let entries = u64::from(self.entries_used);
        entries * u64::from(sizes.0) + (entries + 1) * self.key_size(sizes, chunk_dimensionality)
    }

    /// Decode the node body.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the body is truncated.
    pub fn decode_body(
        self,
        data: &[u8],
        sizes: (u8, u8),
        chunk_dimensionality: usize,
    ) -> Result<BTreeV1Node, FormatError> {
        let mut cursor = ByteCursor::new(data, "version 1 B-tree node", sizes);
        let entries = usize::from(self.entries_used);
        let mut children = Vec::with_capacity(entries);
        let mut chunk_keys = Vec::new();
        for i in 0..=entries {
            match self.node_type {
                BTreeV1Type::Group => {
                    let _heap_offset = cursor.length()?;
                }
                BTreeV1Type::Chunk => {
                    let chunk_size = cursor.u32()?;
                    let filter_mask = cursor.u32()?;
                    let mut offsets = (0..chunk_dimensionality)
                        .map(|_| cursor.u64())
                        .collect::<Result<Vec<_>, _>>()?;
                    offsets.pop();
                    chunk_keys.push(ChunkKey {
                        chunk_size,
                        filter_mask,
                        offsets,
                    });
                }
            }
            if i < entries {
                children.push(cursor.address()?);
            }
        }
        Ok(BTreeV1Node {
            header: self,
            children,
            chunk_keys,
        })
    }
}
