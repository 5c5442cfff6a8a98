use std::collections::HashMap;

use bytes::Bytes;

use super::{cursor::ByteCursor, FormatError};

/// A decoded global heap collection.
///
/// Global heaps hold the data of variable-length elements, such as variable-length strings.
#[derive(Debug, Clone, Default)]
pub struct GlobalHeapCollection {
    objects: HashMap<u16, Bytes>,
}

/// A reference to a global heap object, as stored in a variable-length element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalHeapReference {
    /// The length of the element in base type units.
    pub length: u32,
    /// The address of the global heap collection.
    pub collection_address: u64,
    /// The index of the object in the collection.
    pub index: u32,
}

impl GlobalHeapReference {
    /// Decode a variable-length element.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the element is truncated.
    pub fn decode(data: &[u8], sizes: (u8, u8)) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "variable-length element", sizes);
        Ok(Self {
            length: cursor.u32()?,
            collection_address: cursor.address()?,
            index: cursor.u32()?,
        })
    }

    /// Returns true if the reference is null (an empty element).
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.length == 0 || self.collection_address == 0
    }
}

impl GlobalHeapCollection {
    /// Return the size of a collection header.
    #[must_use]
    pub fn header_size(sizes: (u8, u8)) -> u64 {
        8 + u64::from(sizes.1)
    }

    /// Decode a collection header at `address`, returning the collection size (including the header).
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the signature or version is invalid, or the header is truncated.
    pub fn decode_size(data: &[u8], address: u64, sizes: (u8, u8)) -> Result<u64, FormatError> {
        let mut cursor = ByteCursor::new(data, "global heap collection", sizes);
        cursor.signature(b"GCOL", address)?;
        let version = cursor.u8()?;
        if version != 1 {
            return Err(FormatError::UnsupportedVersion {
                structure: "global heap collection",
                version,
            });
        }
        cursor.skip(3)?;
        cursor.length()
    }

    /// Decode a collection from its bytes, including the header.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the collection is invalid or truncated.
    pub fn decode(data: &Bytes, address: u64, sizes: (u8, u8)) -> Result<Self, FormatError> {
        Self::decode_size(data, address, sizes)?;
        let mut cursor = ByteCursor::new(data, "global heap collection", sizes);
        cursor.seek(usize::try_from(Self::header_size(sizes)).unwrap_or(usize::MAX))?;
        let object_header_size = 8 + usize::from(sizes.1);
        let mut objects = HashMap::new();
        while cursor.remaining() >= object_header_size {
            let index = cursor.u16()?;
            if index == 0 {
                // free space
                break;
            }
            let _reference_count = cursor.u16()?;
            cursor.skip(4)?;
            let size = cursor.length_usize()?;
            let start = cursor.position();
            cursor.skip(size)?;
            objects
                .entry(index)
                .or_insert_with(|| data.slice(start..start + size));
            cursor.align(8)?;
        }
        Ok(Self { objects })
    }

    /// Return the object at `index`.
    #[must_use]
    pub fn object(&self, index: u32) -> Option<&Bytes> {
        u16::try_from(index)
            .ok()
            .and_then(|index| self.objects.get(&index))
    }

    /// Return the number of objects in the collection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the collection has no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
