//! Byte ranges.
//!
//! A [`ByteRange`] is a request for `length` bytes starting at `offset` of a remote object.
//! Byte ranges are the unit of fetching and of caching: every read of a remote object is expressed as one or more byte ranges.

use std::ops::Range;

use thiserror::Error;

/// A byte offset.
pub type ByteOffset = u64;

/// A byte length.
pub type ByteLength = u64;

/// A byte range `[offset, offset + length)`.
///
/// Byte ranges order by offset, then length.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ByteRange {
    offset: ByteOffset,
    length: ByteLength,
}

impl ByteRange {
    /// Create a new byte range.
    #[must_use]
    pub const fn new(offset: ByteOffset, length: ByteLength) -> Self {
        Self { offset, length }
    }

    /// Return the start of the byte range.
    #[must_use]
    pub const fn offset(&self) -> ByteOffset {
        self.offset
    }

    /// Return the length of the byte range.
    #[must_use]
    pub const fn length(&self) -> ByteLength {
        self.length
    }

    /// Return the exclusive end of the byte range, or [`None`] if it overflows.
    #[must_use]
    pub const fn checked_end(&self) -> Option<ByteOffset> {
        self.offset.checked_add(self.length)
    }

    /// Return the exclusive end of the byte range, saturating at [`u64::MAX`].
    #[must_use]
    pub const fn end(&self) -> ByteOffset {
        self.offset.saturating_add(self.length)
    }

    /// Returns true if `other` lies entirely within this byte range.
    #[must_use]
    pub const fn contains(&self, other: &ByteRange) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    /// Convert the byte range to a [`Range<u64>`].
    #[must_use]
    pub const fn to_range(&self) -> Range<u64> {
        self.offset..self.end()
    }

    /// Convert the byte range to a [`Range<usize>`].
    ///
    /// # Errors
    /// Returns an [`InvalidByteRangeError`] if the byte range exceeds [`usize::MAX`].
    pub fn to_range_usize(&self) -> Result<Range<usize>, InvalidByteRangeError> {
        let start = usize::try_from(self.offset);
        let end = self.checked_end().map(usize::try_from);
        match (start, end) {
            (Ok(start), Some(Ok(end))) => Ok(start..end),
            _ => Err(InvalidByteRangeError::new(*self, u64::MAX)),
        }
    }

    /// Validate that the byte range lies within bytes of length `size`.
    ///
    /// # Errors
    /// Returns an [`InvalidByteRangeError`] if the byte range ends past `size`.
    pub fn validate(&self, size: u64) -> Result<(), InvalidByteRangeError> {
        match self.checked_end() {
            Some(end) if end <= size => Ok(()),
            _ => Err(InvalidByteRangeError::new(*self, size)),
        }
    }

    /// Return the position of `other` relative to the start of this byte range if it is contained within it.
    #[must_use]
    pub fn relative(&self, other: &ByteRange) -> Option<Range<usize>> {
        if self.contains(other) {
            let start = usize::try_from(other.offset - self.offset).ok()?;
            let length = usize::try_from(other.length).ok()?;
            Some(start..start + length)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}..{}", self.offset, self.end())
    }
}

impl From<Range<u64>> for ByteRange {
    fn from(range: Range<u64>) -> Self {
        Self::new(range.start, range.end.saturating_sub(range.start))
    }
}

/// An invalid byte range error.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid byte range {0} for bytes of length {1}")]
pub struct InvalidByteRangeError(ByteRange, u64);

impl InvalidByteRangeError {
    /// Create a new [`InvalidByteRangeError`].
    #[must_use]
    pub fn new(byte_range: ByteRange, bytes_len: u64) -> Self {
        Self(byte_range, bytes_len)
    }

    /// Return the offending byte range.
    #[must_use]
    pub const fn byte_range(&self) -> ByteRange {
        self.0
    }

    /// Return the length of the bytes the byte range was validated against.
    #[must_use]
    pub const fn bytes_len(&self) -> u64 {
        self.1
    }
}
