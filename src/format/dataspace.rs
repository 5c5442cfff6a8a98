use serde::Serialize;

use super::{cursor::ByteCursor, FormatError};

/// The kind of a dataspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataspaceKind {
    /// A single element.
    Scalar,
    /// A regular N-dimensional array of elements.
    Simple,
    /// No elements.
    Null,
}

/// A decoded dataspace message (type 0x0001).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataspace {
    /// The dataspace kind.
    pub kind: DataspaceKind,
    /// The current dimensions. Empty for scalar and null dataspaces.
    pub shape: Vec<u64>,
}

impl Dataspace {
    /// Return the number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        match self.kind {
            DataspaceKind::Null => 0,
            DataspaceKind::Scalar => 1,
            DataspaceKind::Simple => self.shape.iter().product(),
        }
    }

    /// Decode a dataspace message.
    ///
    /// # Errors
    /// Returns a [`FormatError`] if the version is unsupported or the message is truncated.
    pub fn decode(data: &[u8], sizes: (u8, u8)) -> Result<Self, FormatError> {
        let mut cursor = ByteCursor::new(data, "dataspace message", sizes);
        let version = cursor.u8()?;
        let rank = cursor.u8()?;
        // maximum dimensions (flag bit 0) follow the current dimensions and are not needed
        let _flags = cursor.u8()?;
        let kind = match version {
            1 => {
                cursor.skip(5)?;
                if rank == 0 {
                    DataspaceKind::Scalar
                } else {
                    DataspaceKind::Simple
                }
            }
            2 => match cursor.u8()? {
                0 => DataspaceKind::Scalar,
                1 => DataspaceKind::Simple,
                2 => DataspaceKind::Null,
                kind => {
                    return Err(FormatError::Invalid(format!(
                        "invalid dataspace type {kind}"
                    )))
                }
            },
            version => {
                return Err(FormatError::UnsupportedVersion {
                    structure: "dataspace message",
                    version,
                })
            }
        };
        let shape = (0..rank)
            .map(|_| cursor.length())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            kind,
            shape: if kind == DataspaceKind::Simple {
                shape
            } else {
                Vec::new()
            },
        })
    }
}
