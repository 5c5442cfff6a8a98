use serde::Serialize;

use super::{cursor::ByteCursor, FormatError, UNDEFINED_ADDRESS};

/// The target of a link from a group to a child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LinkTarget {
    /// The address of the child object header.
    Hard(u64),
    /// A path to the child within the same file.
    Soft(String),
    /// An object in another file.
    External {
        /// The file name.
        file: String,
        /// The object path within the file.
        path: String,
    },
}

/// A decoded link message (type 0x0006).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// The link name.
    pub name: String,
    /// The link target.
    pub target: LinkTarget,
}

fn utf8(bytes: &[u8], field: &str) -> Result<String, FormatError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| FormatError::Invalid(format!("{field} is not valid UTF-8")))
}

impl Link {
    /// Decode a link message.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the version or link type is unsupported, or the message is truncated.
    pub fn decode(data: &[u8], sizes: (u8, u8)) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "link message", sizes);
        let version = cursor.u8()?;
        if version != 1 {
            return Err(FormatError::UnsupportedVersion {
                structure: "link message",
                version,
            });
        }
        let flags = cursor.u8()?;
        let link_type = if flags & 0b1000 != 0 { cursor.u8()? } else { 0 };
        if flags & 0b100 != 0 {
            let _creation_order = cursor.u64()?;
        }
        if flags & 0b1_0000 != 0 {
            let _charset = cursor.u8()?;
        }
        let name_length = cursor.uint(1 << (flags & 0b11))?;
        let name_length = usize::try_from(name_length)
            .map_err(|_| FormatError::Invalid(format!("link name length {name_length}")))?;
        let name = utf8(cursor.bytes(name_length)?, "link name")?;

        let target = match link_type {
            0 => LinkTarget::Hard(cursor.address()?),
            1 => {
                let length = usize::from(cursor.u16()?);
                LinkTarget::Soft(utf8(cursor.bytes(length)?, "soft link path")?)
            }
            64 => {
                let length = usize::from(cursor.u16()?);
                let info = cursor.bytes(length)?;
                let mut parts = info.get(1..).unwrap_or_default().split(|byte| *byte == 0);
                let file = utf8(parts.next().unwrap_or_default(), "external link file")?;
                let path = utf8(parts.next().unwrap_or_default(), "external link path")?;
                LinkTarget::External { file, path }
            }
            link_type => {
                return Err(FormatError::Unsupported(format!(
                    "user-defined link type {link_type}"
                )))
            }
        };
        Ok(Self { name, target })
    }
}

/// A decoded link info message (type 0x0002).
///
/// New-style groups with links in dense storage have a defined fractal heap address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkInfo {
    /// The address of the fractal heap holding dense links.
    pub fractal_heap_address: u64,
    /// The address of the name index B-tree of dense links.
    pub name_index_address: u64,
}

impl LinkInfo {
    /// Returns true if the links of the group are stored in dense storage.
    #[must_use]
    pub fn is_dense(&self) -> bool {
        self.fractal_heap_address != UNDEFINED_ADDRESS
    }

    /// Decode a link info message.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the version is unsupported or the message is truncated.
    pub fn decode(data: &[u8], sizes: (u8, u8)) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "link info message", sizes);
        let version = cursor.u8()?;
        if version != 0 {
            return Err(FormatError::UnsupportedVersion {
                structure: "link info message",
                version,
            });
        }
        let flags = cursor.u8()?;
        if flags & 1 != 0 {
            let _max_creation_index = cursor.u64()?;
        }
        Ok(Self {
            fractal_heap_address: cursor.address()?,
            name_index_address: cursor.address()?,
        })
    }
}
