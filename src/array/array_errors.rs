use thiserror::Error;

use super::DataType;

/// Array errors.
#[derive(Debug, Error)]
pub enum ArrayError {
    /// An unexpected bytes input size.
    #[error("got bytes with size {_0}, expected {_1}")]
    InvalidBytesInputSize(usize, u64),
    /// An unexpected number of elements.
    #[error("got {_0} elements, expected {_1}")]
    InvalidElementCount(usize, u64),
    /// The requested element type does not match the array data type.
    #[error("cannot access {_0} elements as {_1}")]
    IncompatibleElementType(DataType, &'static str),
    /// A string element is not valid UTF-8.
    #[error("string element {_0} is not valid UTF-8")]
    InvalidString(u64),
    /// Variable-length elements cannot be created from fixed-size bytes.
    #[error("{_0} elements cannot be created from bytes")]
    VariableLength(DataType),
    /// The array shape cannot be represented.
    #[error("array shape {_0:?} is too large")]
    Shape(Vec<u64>),
}
