//! Typed arrays.
//!
//! An [`Array`] is the result of reading a dataset or attribute: a shape, a [`DataType`] and the decoded elements in row-major order.
//!
//! Numeric elements are accessed with [`Array::as_slice`] or [`Array::into_vec`] (or [`Array::to_ndarray`] with the `ndarray` feature), strings with [`Array::strings`].

mod array_errors;
mod data_type;
mod element;

pub use self::{array_errors::ArrayError, data_type::DataType, element::Element};

use half::f16;

use crate::format::ByteOrder;

/// The elements of an [`Array`].
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    /// `int8` elements.
    Int8(Vec<i8>),
    /// `int16` elements.
    Int16(Vec<i16>),
    /// `int32` elements.
    Int32(Vec<i32>),
    /// `int64` elements.
    Int64(Vec<i64>),
    /// `uint8` elements.
    UInt8(Vec<u8>),
    /// `uint16` elements.
    UInt16(Vec<u16>),
    /// `uint32` elements.
    UInt32(Vec<u32>),
    /// `uint64` elements.
    UInt64(Vec<u64>),
    /// `float16` elements.
    Float16(Vec<f16>),
    /// `float32` elements.
    Float32(Vec<f32>),
    /// `float64` elements.
    Float64(Vec<f64>),
    /// String elements.
    String(Vec<String>),
    /// The concatenated bytes of opaque elements.
    Opaque(Vec<u8>),
}

impl From<Vec<String>> for ArrayData {
    fn from(elements: Vec<String>) -> Self {
        Self::String(elements)
    }
}

/// An n-dimensional array of typed elements in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    shape: Vec<u64>,
    data_type: DataType,
    data: ArrayData,
}

fn num_elements(shape: &[u64]) -> Result<u64, ArrayError> {
    shape
        .iter()
        .try_fold(1u64, |count, extent| count.checked_mul(*extent))
        .ok_or_else(|| ArrayError::Shape(shape.to_vec()))
}

fn native_elements<T: Element>(bytes: &[u8], byte_order: ByteOrder) -> Vec<T> {
    let mut elements: Vec<T> = bytemuck::pod_collect_to_vec(bytes);
    let native = if cfg!(target_endian = "big") {
        ByteOrder::BigEndian
    } else {
        ByteOrder::LittleEndian
    };
    if byte_order != native && std::mem::size_of::<T>() > 1 {
        for element in &mut elements {
            bytemuck::bytes_of_mut(element).reverse();
        }
    }
    elements
}

fn fixed_strings(bytes: &[u8], count: usize, size: usize) -> Result<Vec<String>, ArrayError> {
    if size == 0 {
        return Ok(vec![String::new(); count]);
    }
    bytes
        .chunks_exact(size)
        .enumerate()
        .map(|(i, element)| {
            let end = element
                .iter()
                .position(|byte| *byte == 0)
                .unwrap_or(element.len());
            String::from_utf8(element[..end].to_vec())
                .map_err(|_| ArrayError::InvalidString(i as u64))
        })
        .collect()
}

impl Array {
    /// Create an array from elements.
    ///
    /// The data type is inferred from the elements: numeric elements give their numeric type, strings give [`DataType::VarString`] and opaque bytes give single byte [`DataType::Opaque`] elements.
    ///
    /// # Errors
    /// Returns [`ArrayError::InvalidElementCount`] if the number of elements does not match `shape`.
    pub fn new(shape: Vec<u64>, data: impl Into<ArrayData>) -> Result<Self, ArrayError> {
        let data = data.into();
        let (data_type, len) = match &data {
            ArrayData::Int8(elements) => (DataType::Int8, elements.len()),
            ArrayData::Int16(elements) => (DataType::Int16, elements.len()),
            ArrayData::Int32(elements) => (DataType::Int32, elements.len()),
            ArrayData::Int64(elements) => (DataType::Int64, elements.len()),
            ArrayData::UInt8(elements) => (DataType::UInt8, elements.len()),
            ArrayData::UInt16(elements) => (DataType::UInt16, elements.len()),
            ArrayData::UInt32(elements) => (DataType::UInt32, elements.len()),
            ArrayData::UInt64(elements) => (DataType::UInt64, elements.len()),
            ArrayData::Float16(elements) => (DataType::Float16, elements.len()),
            ArrayData::Float32(elements) => (DataType::Float32, elements.len()),
            ArrayData::Float64(elements) => (DataType::Float64, elements.len()),
            ArrayData::String(elements) => (DataType::VarString, elements.len()),
            ArrayData::Opaque(bytes) => (DataType::Opaque { size: 1 }, bytes.len()),
        };
        let expected = num_elements(&shape)?;
        if len as u64 != expected {
            return Err(ArrayError::InvalidElementCount(len, expected));
        }
        Ok(Self {
            shape,
            data_type,
            data,
        })
    }

    /// Create an array from the stored bytes of its elements.
    ///
    /// Numeric elements are converted from `byte_order` to native order.
    /// Fixed-length strings end at their first nul byte.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - the length of `bytes` does not match the shape and data type,
    ///  - `data_type` is [`DataType::VarString`], or
    ///  - a fixed-length string is not valid UTF-8.
    pub fn from_bytes(
        shape: Vec<u64>,
        data_type: DataType,
        bytes: &[u8],
        byte_order: ByteOrder,
    ) -> Result<Self, ArrayError> {
        let Some(element_size) = data_type.fixed_size() else {
            return Err(ArrayError::VariableLength(data_type));
        };
        let count = num_elements(&shape)?;
        let expected = count
            .checked_mul(element_size as u64)
            .ok_or_else(|| ArrayError::Shape(shape.clone()))?;
        if bytes.len() as u64 != expected {
            return Err(ArrayError::InvalidBytesInputSize(bytes.len(), expected));
        }
        let data = match &data_type {
            DataType::Int8 => ArrayData::Int8(native_elements(bytes, byte_order)),
            DataType::Int16 => ArrayData::Int16(native_elements(bytes, byte_order)),
            DataType::Int32 => ArrayData::Int32(native_elements(bytes, byte_order)),
            DataType::Int64 => ArrayData::Int64(native_elements(bytes, byte_order)),
            DataType::UInt8 => ArrayData::UInt8(bytes.to_vec()),
            DataType::UInt16 => ArrayData::UInt16(native_elements(bytes, byte_order)),
            DataType::UInt32 => ArrayData::UInt32(native_elements(bytes, byte_order)),
            DataType::UInt64 => ArrayData::UInt64(native_elements(bytes, byte_order)),
            DataType::Float16 => ArrayData::Float16(native_elements(bytes, byte_order)),
            DataType::Float32 => ArrayData::Float32(native_elements(bytes, byte_order)),
            DataType::Float64 => ArrayData::Float64(native_elements(bytes, byte_order)),
            DataType::FixedString { size } => {
                let count = usize::try_from(count).map_err(|_| ArrayError::Shape(shape.clone()))?;
                ArrayData::String(fixed_strings(bytes, count, *size)?)
            }
            DataType::Opaque { .. } => ArrayData::Opaque(bytes.to_vec()),
            DataType::VarString => return Err(ArrayError::VariableLength(data_type)),
        };
        Ok(Self {
            shape,
            data_type,
            data,
        })
    }

    /// Create an array of strings with a string `data_type`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the number of strings does not match `shape` or `data_type` is not a string data type.
    pub fn from_strings(
        shape: Vec<u64>,
        data_type: DataType,
        strings: Vec<String>,
    ) -> Result<Self, ArrayError> {
        if !data_type.is_string() {
            return Err(ArrayError::IncompatibleElementType(data_type, "string"));
        }
        let expected = num_elements(&shape)?;
        if strings.len() as u64 != expected {
            return Err(ArrayError::InvalidElementCount(strings.len(), expected));
        }
        Ok(Self {
            shape,
            data_type,
            data: ArrayData::String(strings),
        })
    }

    /// Return the array shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the dimensionality of the array.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.shape.len()
    }

    /// Return the data type.
    #[must_use]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Return the elements.
    #[must_use]
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Consume the array and return its elements.
    #[must_use]
    pub fn into_data(self) -> ArrayData {
        self.data
    }

    /// Return the number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Return the elements as a slice of `T`.
    ///
    /// # Errors
    /// Returns [`ArrayError::IncompatibleElementType`] if the elements are not of type `T`.
    pub fn as_slice<T: Element>(&self) -> Result<&[T], ArrayError> {
        T::slice(&self.data).ok_or_else(|| {
            ArrayError::IncompatibleElementType(self.data_type.clone(), T::DATA_TYPE.identifier())
        })
    }

    /// Consume the array and return its elements as a [`Vec`] of `T`.
    ///
    /// # Errors
    /// Returns [`ArrayError::IncompatibleElementType`] if the elements are not of type `T`.
    pub fn into_vec<T: Element>(self) -> Result<Vec<T>, ArrayError> {
        let data_type = self.data_type;
        T::into_vec(self.data).ok_or_else(|| {
            ArrayError::IncompatibleElementType(data_type, T::DATA_TYPE.identifier())
        })
    }

    /// Return the elements as strings, or [`None`] if the array does not hold strings.
    #[must_use]
    pub fn strings(&self) -> Option<&[String]> {
        match &self.data {
            ArrayData::String(strings) => Some(strings),
            _ => None,
        }
    }

    /// Return the raw bytes of opaque or `uint8` elements, or [`None`] for other data types.
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.data {
            ArrayData::Opaque(bytes) | ArrayData::UInt8(bytes) => Some(bytes),
            ArrayData::Int8(elements) => Some(bytemuck::cast_slice(elements)),
            _ => None,
        }
    }

    /// Return the elements as an [`ndarray::ArrayD`].
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the elements are not of type `T` or the shape exceeds `usize::MAX`.
    #[cfg(feature = "ndarray")]
    pub fn to_ndarray<T: Element>(&self) -> Result<ndarray::ArrayD<T>, ArrayError> {
        let elements = self.as_slice::<T>()?.to_vec();
        let shape = self
            .shape
            .iter()
            .map(|extent| usize::try_from(*extent))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ArrayError::Shape(self.shape.clone()))?;
        ndarray::ArrayD::from_shape_vec(shape, elements)
            .map_err(|_| ArrayError::Shape(self.shape.clone()))
    }
}
