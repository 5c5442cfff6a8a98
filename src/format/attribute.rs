use bytes::Bytes;

use super::{
    cursor::{null_terminated, ByteCursor},
    dataspace::Dataspace,
    datatype::Datatype,
    FormatError,
};

/// A decoded attribute message (type 0x000C).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMessage {
    /// The attribute name.
    pub name: String,
    /// The element datatype.
    pub datatype: Datatype,
    /// The attribute shape.
    pub dataspace: Dataspace,
    /// The raw element bytes.
    pub data: Bytes,
}

impl AttributeMessage {
    /// Decode an attribute message.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the version is unsupported, the datatype or dataspace is shared, or the message is truncated.
    pub fn decode(data: &Bytes, sizes: (u8, u8)) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "attribute message", sizes);
        let version = cursor.u8()?;
        if !(1..=3).contains(&version) {
            return Err(FormatError::UnsupportedVersion {
                structure: "attribute message",
                version,
            });
        }
        let flags = cursor.u8()?;
        if version >= 2 && flags & 0b11 != 0 {
            return Err(FormatError::Unsupported(
                "attributes with a shared datatype or dataspace".to_string(),
            ));
        }
        let name_size = usize::from(cursor.u16()?);
        let datatype_size = usize::from(cursor.u16()?);
        let dataspace_size = usize::from(cursor.u16()?);
        if version == 3 {
            let _charset = cursor.u8()?;
        }
        let padded = |size: usize| {
            if version == 1 {
                size.next_multiple_of(8)
            } else {
                size
            }
        };

        let name = null_terminated(cursor.bytes(padded(name_size))?);
        let datatype_bytes = cursor.bytes(padded(datatype_size))?;
        let datatype = Datatype::decode(&datatype_bytes[..datatype_size])?;
        let dataspace_bytes = cursor.bytes(padded(dataspace_size))?;
        let dataspace = Dataspace::decode(&dataspace_bytes[..dataspace_size], sizes)?;

        let data_size = usize::try_from(dataspace.num_elements())
            .ok()
            .and_then(|elements| elements.checked_mul(datatype.size()))
            .ok_or_else(|| {
                FormatError::Invalid(format!("attribute {name} data size overflows usize"))
            })?;
        let start = cursor.position();
        cursor.skip(data_size)?;
        Ok(Self {
            name,
            datatype,
            dataspace,
            data: data.slice(start..start + data_size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_v1() {
        let mut data = vec![1, 0];
        data.extend_from_slice(&6u16.to_le_bytes());
        data.extend_from_slice(&12u16.to_le_bytes());
        data.extend_from_slice(&16u16.to_le_bytes());
        data.extend_from_slice(b"units\0\0\0");
        // fixed-point u16 datatype padded to 16 bytes
        data.extend_from_slice(&[0x10, 0, 0, 0, 2, 0, 0, 0, 0, 0, 16, 0, 0, 0, 0, 0]);
        // dataspace v1 with one dimension of 2
        data.extend_from_slice(&[1, 1, 0, 0, 0, 0, 0, 0]);
        data.extend_from_slice(&2u64.to_le_bytes());
        data.extend_from_slice(&[5, 0, 6, 0]);
        let attribute = AttributeMessage::decode(&data.into(), (8, 8)).unwrap();
        assert_eq!(attribute.name, "units");
        assert_eq!(attribute.dataspace.shape, vec![2]);
        assert_eq!(attribute.datatype.size(), 2);
        assert_eq!(&attribute.data[..], &[5, 0, 6, 0]);
    }

    #[test]
    fn attribute_v3_truncated() {
        let mut data = vec![3, 0];
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&8u16.to_le_bytes());
        data.extend_from_slice(&4u16.to_le_bytes());
        data.push(0);
        data.extend_from_slice(b"a\0");
        data.extend_from_slice(&[0x13, 0, 0, 0, 4, 0, 0, 0]);
        data.extend_from_slice(&[2, 0, 0, 0]);
        data.extend_from_slice(&[1, 2]);
        assert!(matches!(
            AttributeMessage::decode(&data.into(), (8, 8)),
            Err(FormatError::Truncated { .. })
        ));
    }
}
