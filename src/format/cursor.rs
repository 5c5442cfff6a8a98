use super::{FormatError, UNDEFINED_ADDRESS};

/// A little-endian reader over structural bytes.
///
/// Offsets and lengths are read with the widths declared by the superblock and widened to `u64`.
/// Reading past the end of the bytes fails with [`FormatError::Truncated`].
#[derive(Debug, Clone)]
pub(crate) struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
    structure: &'static str,
    offset_size: u8,
    length_size: u8,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(data: &'a [u8], structure: &'static str, sizes: (u8, u8)) -> Self {
        Self {
            data,
            position: 0,
            structure,
            offset_size: sizes.0,
            length_size: sizes.1,
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub(crate) fn offset_size(&self) -> u8 {
        self.offset_size
    }

    /// Change the widths of offsets and lengths for the remaining fields.
    pub(crate) fn set_sizes(&mut self, sizes: (u8, u8)) {
        self.offset_size = sizes.0;
        self.length_size = sizes.1;
    }

    pub(crate) fn seek(&mut self, position: usize) -> Result<(), FormatError> {
        if position > self.data.len() {
            return Err(self.truncated(position - self.position));
        }
        self.position = position;
        Ok(())
    }

    fn truncated(&self, needed: usize) -> FormatError {
        FormatError::Truncated {
            structure: self.structure,
            position: self.position,
            needed,
            available: self.remaining(),
        }
    }

    pub(crate) fn bytes(&mut self, length: usize) -> Result<&'a [u8], FormatError> {
        let end = self
            .position
            .checked_add(length)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| self.truncated(length))?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Return the remaining bytes without consuming them.
    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<(), FormatError> {
        self.bytes(length).map(|_| ())
    }

    /// Skip to the next multiple of `alignment` relative to the start of the bytes.
    pub(crate) fn align(&mut self, alignment: usize) -> Result<(), FormatError> {
        let padding = (alignment - self.position % alignment) % alignment;
        self.skip(padding)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut array = [0; N];
        array.copy_from_slice(self.bytes(N)?);
        Ok(array)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64, FormatError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Read an unsigned integer of `size` bytes.
    pub(crate) fn uint(&mut self, size: u8) -> Result<u64, FormatError> {
        let bytes = self.bytes(usize::from(size))?;
        if size > 8 {
            return Err(FormatError::Invalid(format!(
                "integer width {size} exceeds 8 bytes in {}",
                self.structure
            )));
        }
        let mut array = [0; 8];
        array[..bytes.len()].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(array))
    }

    /// Read an address. An all-ones address is returned as [`UNDEFINED_ADDRESS`].
    pub(crate) fn address(&mut self) -> Result<u64, FormatError> {
        let size = self.offset_size;
        let value = self.uint(size)?;
        if size < 8 && value == (1u64 << (u32::from(size) * 8)) - 1 {
            Ok(UNDEFINED_ADDRESS)
        } else {
            Ok(value)
        }
    }

    pub(crate) fn length(&mut self) -> Result<u64, FormatError> {
        self.uint(self.length_size)
    }

    /// Read a length and convert it to `usize`.
    pub(crate) fn length_usize(&mut self) -> Result<usize, FormatError> {
        let length = self.length()?;
        usize::try_from(length)
            .map_err(|_| FormatError::Invalid(format!("length {length} exceeds usize::MAX")))
    }

    pub(crate) fn signature(&mut self, expected: &[u8; 4], address: u64) -> Result<(), FormatError> {
        if &self.array::<4>()? == expected {
            Ok(())
        } else {
            Err(FormatError::InvalidSignature {
                structure: self.structure,
                address,
            })
        }
    }
}

/// Read a null-terminated string from `data`, stopping at the first NUL or the end.
pub(crate) fn null_terminated(data: &[u8]) -> String {
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}
