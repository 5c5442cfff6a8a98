use serde::Serialize;

use super::{
    cursor::{null_terminated, ByteCursor},
    FormatError,
};

/// One filter of a filter pipeline message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterDescription {
    /// The filter identifier.
    pub id: u16,
    /// The filter name, if stored.
    pub name: Option<String>,
    /// Whether the filter is optional. Optional filters may be skipped for individual chunks.
    pub optional: bool,
    /// The client data values.
    pub client_data: Vec<u32>,
}

/// Decode a filter pipeline message (type 0x000B).
///
/// Filters are returned in the order they were applied when writing.
///
/// # Errors
/// Returns a [`FormatError`] if the version is unsupported or the message is truncated.
pub fn decode_filter_pipeline(data: &[u8]) -> Result<Vec<FilterDescription>, FormatError> {
    let mut cursor = ByteCursor::new(data, "filter pipeline message", (8, 8));
    let version = cursor.u8()?;
    if !matches!(version, 1 | 2) {
        return Err(FormatError::UnsupportedVersion {
            structure: "filter pipeline message",
            version,
        });
    }
    let count = cursor.u8()?;
    if version == 1 {
        cursor.skip(6)?;
    }

    let mut filters = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let id = cursor.u16()?;
        let name_length = if version == 1 || id >= 256 {
            usize::from(cursor.u16()?)
        } else {
            0
        };
        let flags = cursor.u16()?;
        let num_values = usize::from(cursor.u16()?);
        let name = if name_length > 0 {
            let name = cursor.bytes(if version == 1 {
                name_length.next_multiple_of(8)
            } else {
                name_length
            })?;
            Some(null_terminated(name))
        } else {
            None
        };
        let client_data = (0..num_values)
            .map(|_| cursor.u32())
            .collect::<Result<Vec<_>, _>>()?;
        if version == 1 && num_values % 2 == 1 {
            cursor.skip(4)?;
        }
        filters.push(FilterDescription {
            id,
            name,
            optional: flags & 1 != 0,
            client_data,
        });
    }
    Ok(filters)
}
