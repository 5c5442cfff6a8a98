use half::f16;

use super::{ArrayData, DataType};

/// A numeric element type that an [`Array`](super::Array) can be accessed as.
pub trait Element: bytemuck::Pod + Send + Sync {
    /// The data type of elements of this type.
    const DATA_TYPE: DataType;

    /// Return the elements of `data` if they are of this type.
    fn slice(data: &ArrayData) -> Option<&[Self]>;

    /// Return the elements of `data` if they are of this type.
    fn into_vec(data: ArrayData) -> Option<Vec<Self>>;
}

macro_rules! impl_element {
    ($type:ty, $variant:ident) => {
        impl Element for $type {
            const DATA_TYPE: DataType = DataType::$variant;

            fn slice(data: &ArrayData) -> Option<&[Self]> {
                match data {
                    ArrayData::$variant(elements) => Some(elements),
                    _ => None,
                }
            }

            fn into_vec(data: ArrayData) -> Option<Vec<Self>> {
                match data {
                    ArrayData::$variant(elements) => Some(elements),
                    _ => None,
                }
            }
        }

        impl From<Vec<$type>> for ArrayData {
            fn from(elements: Vec<$type>) -> Self {
                Self::$variant(elements)
            }
        }
    };
}

impl_element!(i8, Int8);
impl_element!(i16, Int16);
impl_element!(i32, Int32);
impl_element!(i64, Int64);
impl_element!(u8, UInt8);
impl_element!(u16, UInt16);
impl_element!(u32, UInt32);
impl_element!(u64, UInt64);
impl_element!(f16, Float16);
impl_element!(f32, Float32);
impl_element!(f64, Float64);
