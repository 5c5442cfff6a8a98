use bytes::Bytes;

use super::{cursor::ByteCursor, FormatError};

/// A decoded fill value message (old type 0x0004 or new type 0x0005).
///
/// Elements of unallocated storage read as the fill value, or zero if it is undefined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillValue {
    /// The fill value bytes of one element, if defined.
    pub value: Option<Bytes>,
}

impl FillValue {
    /// Decode an old-style fill value message (type 0x0004).
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the message is truncated.
    pub fn decode_old(data: &Bytes) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "fill value message", (8, 8));
        let size = cursor.u32()? as usize;
        let start = cursor.position();
        cursor.skip(size)?;
        Ok(Self {
            value: (size > 0).then(|| data.slice(start..start + size)),
        })
    }

    /// Decode a fill value message (type 0x0005).
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the version is unsupported or the message is truncated.
    pub fn decode(data: &Bytes) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "fill value message", (8, 8));
        let version = cursor.u8()?;
        let defined = match version {
            1 | 2 => {
                // space allocation time, fill value write time
                cursor.skip(2)?;
                let defined = cursor.u8()? != 0;
                // version 1 always stores the size field
                version == 1 || defined
            }
            3 => {
                let flags = cursor.u8()?;
                flags & 0b10_0000 != 0
            }
            version => {
                return Err(FormatError::UnsupportedVersion {
                    structure: "fill value message",
                    version,
                })
            }
        };
        if !defined || cursor.remaining() == 0 {
            return Ok(Self::default());
        }
        let size = cursor.u32()? as usize;
        let start = cursor.position();
        cursor.skip(size)?;
        Ok(Self {
            value: (size > 0).then(|| data.slice(start..start + size)),
        })
    }

    /// Return the fill bytes of one element of `element_size` bytes.
    ///
    /// A fill value whose size differs from the element size is ignored and zeros are returned.
    #[must_use]
    pub fn element_bytes(&self, element_size: usize) -> Vec<u8> {
        match &self.value {
            Some(value) if value.len() == element_size => value.to_vec(),
            _ => vec![0; element_size],
        }
    }

    /// Returns true if the fill bytes of an element are all zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.value
            .as_ref()
            .map_or(true, |value| value.iter().all(|byte| *byte == 0))
    }
}
