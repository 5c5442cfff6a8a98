use serde::Serialize;

use super::{checksum, cursor::ByteCursor, FormatError, UNDEFINED_ADDRESS};

/// The HDF5 format signature.
pub const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

/// The number of bytes fetched to decode a superblock.
///
/// This covers every superblock version with 8 byte offsets and lengths.
pub const SUPERBLOCK_FETCH_SIZE: u64 = 128;

/// The default indexed storage B-tree K of version 0 superblocks.
const DEFAULT_INDEXED_STORAGE_K: u16 = 32;

/// A decoded superblock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Superblock {
    /// The superblock version (0 to 3).
    pub version: u8,
    /// The address of the superblock (the signature offset).
    pub address: u64,
    /// The size of addresses in bytes.
    pub offset_size: u8,
    /// The size of lengths in bytes.
    pub length_size: u8,
    /// The base address that all other addresses are relative to.
    pub base_address: u64,
    /// The end of file address.
    pub eof_address: u64,
    /// The address of the root group object header.
    pub root_object_header_address: u64,
    /// The group leaf node K (versions 0 and 1).
    pub group_leaf_node_k: u16,
    /// The group internal node K (versions 0 and 1).
    pub group_internal_node_k: u16,
    /// The indexed storage internal node K.
    pub indexed_storage_k: u16,
}

fn validate_sizes(offset_size: u8, length_size: u8) -> Result<(), FormatError> {
    if !matches!(offset_size, 2 | 4 | 8) {
        return Err(FormatError::Invalid(format!(
            "invalid offset size {offset_size}, must be 2, 4 or 8"
        )));
    }
    if !matches!(length_size, 2 | 4 | 8) {
        return Err(FormatError::Invalid(format!(
            "invalid length size {length_size}, must be 2, 4 or 8"
        )));
    }
    Ok(())
}

impl Superblock {
    /// Returns true if `data` starts with the HDF5 signature.
    #[must_use]
    pub fn has_signature(data: &[u8]) -> bool {
        data.starts_with(&HDF5_SIGNATURE)
    }

    /// Return the candidate superblock addresses (0, 512, 1024, 2048, ...) of an object of `size` bytes.
    pub fn candidate_addresses(size: u64) -> impl Iterator<Item = u64> {
        std::iter::once(0)
            .chain(std::iter::successors(Some(512u64), |address| {
                address.checked_mul(2)
            }))
            .take_while(move |address| address.saturating_add(8) <= size)
    }

    /// Decode the sizes of offsets and lengths.
    #[must_use]
    pub fn sizes(&self) -> (u8, u8) {
        (self.offset_size, self.length_size)
    }

    /// Decode a superblock from `data`, which starts with the signature located at `address`.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the signature does not match, the version is unsupported, or `data` is truncated.
    pub fn decode(data: &[u8], address: u64, validate_checksum: bool) -> Result<Self, FormatError> {
        if !Self::has_signature(data) {
            return Err(FormatError::SignatureNotFound);
        }
        let mut cursor = ByteCursor::new(data, "superblock", (8, 8));
        cursor.skip(HDF5_SIGNATURE.len())?;
        let version = cursor.u8()?;
        match version {
            0 | 1 => Self::decode_v0_v1(cursor, version, address),
            2 | 3 => Self::decode_v2_v3(data, cursor, version, address, validate_checksum),
            version => Err(FormatError::UnsupportedVersion {
                structure: "superblock",
                version,
            }),
        }
    }

    fn decode_v0_v1(
        mut cursor: ByteCursor,
        version: u8,
        address: u64,
    ) -> Result<Self, FormatError> {
        // free-space, root group symbol table entry, reserved and shared header versions
        cursor.skip(4)?;
        let offset_size = cursor.u8()?;
        let length_size = cursor.u8()?;
        validate_sizes(offset_size, length_size)?;
        cursor.skip(1)?;
        let group_leaf_node_k = cursor.u16()?;
        let group_internal_node_k = cursor.u16()?;
        let _consistency_flags = cursor.u32()?;
        let indexed_storage_k = if version == 1 {
            let k = cursor.u16()?;
            cursor.skip(2)?;
            k
        } else {
            DEFAULT_INDEXED_STORAGE_K
        };

        cursor.set_sizes((offset_size, length_size));
        let base_address = cursor.address()?;
        let _free_space_address = cursor.address()?;
        let eof_address = cursor.address()?;
        let _driver_info_address = cursor.address()?;

        // root group symbol table entry
        let _link_name_offset = cursor.address()?;
        let root_object_header_address = cursor.address()?;
        if root_object_header_address == UNDEFINED_ADDRESS {
            return Err(FormatError::Invalid(
                "root group object header address is undefined".to_string(),
            ));
        }

        Ok(Self {
            version,
            address,
            offset_size,
            length_size,
            base_address: if base_address == UNDEFINED_ADDRESS {
                address
            } else {
                base_address
            },
            eof_address,
            root_object_header_address,
            group_leaf_node_k,
            group_internal_node_k,
            indexed_storage_k,
        })
    }

    fn decode_v2_v3(
        data: &[u8],
        mut cursor: ByteCursor,
        version: u8,
        address: u64,
        validate_checksum: bool,
    ) -> Result<Self, FormatError> {
        let offset_size = cursor.u8()?;
        let length_size = cursor.u8()?;
        validate_sizes(offset_size, length_size)?;
        let _flags = cursor.u8()?;

        cursor.set_sizes((offset_size, length_size));
        let base_address = cursor.address()?;
        let _extension_address = cursor.address()?;
        let eof_address = cursor.address()?;
        let root_object_header_address = cursor.address()?;
        let end = cursor.position() + 4;
        cursor.skip(4)?;
        if validate_checksum {
            checksum::verify_trailing(&data[..end], "superblock")?;
        }

        Ok(Self {
            version,
            address,
            offset_size,
            length_size,
            base_address,
            eof_address,
            root_object_header_address,
            group_leaf_node_k: 4,
            group_internal_node_k: 16,
            indexed_storage_k: DEFAULT_INDEXED_STORAGE_K,
        })
    }
}
