//! Element types and the typed seam between Rust slices and tensor bytes.

use tengra_abi::dtype as tag;

use crate::error::Result;
use crate::status::Status;

/// Data types supported by the engine boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    Bool,
    /// Variable-width byte strings; see `tengra_abi::strings`.
    String,
}

impl DataType {
    /// Fixed element width in bytes; `None` for variable-width types.
    pub fn size(&self) -> Option<usize> {
        match self {
            DataType::Float32 | DataType::Int32 => Some(4),
            DataType::Float64 | DataType::Int64 => Some(8),
            DataType::Int16 => Some(2),
            DataType::Int8 | DataType::UInt8 | DataType::Bool => Some(1),
            DataType::String => None,
        }
    }

    pub(crate) fn to_raw(self) -> i32 {
        match self {
            DataType::Float32 => tag::FLOAT32,
            DataType::Float64 => tag::FLOAT64,
            DataType::Int8 => tag::INT8,
            DataType::Int16 => tag::INT16,
            DataType::Int32 => tag::INT32,
            DataType::Int64 => tag::INT64,
            DataType::UInt8 => tag::UINT8,
            DataType::Bool => tag::BOOL,
            DataType::String => tag::STRING,
        }
    }

    pub(crate) fn from_raw(raw: i32) -> Result<DataType> {
        match raw {
            tag::FLOAT32 => Ok(DataType::Float32),
            tag::FLOAT64 => Ok(DataType::Float64),
            tag::INT8 => Ok(DataType::Int8),
            tag::INT16 => Ok(DataType::Int16),
            tag::INT32 => Ok(DataType::Int32),
            tag::INT64 => Ok(DataType::Int64),
            tag::UINT8 => Ok(DataType::UInt8),
            tag::BOOL => Ok(DataType::Bool),
            tag::STRING => Ok(DataType::String),
            other => Err(Status::invalid_argument(format!(
                "engine reported unknown dtype tag {other}"
            ))
            .into()),
        }
    }
}

/// Rust element types that can cross the tensor boundary.
///
/// Implementations convert whole slices at once; the raw-pointer copy
/// into engine memory stays inside `crate::mem`.
pub trait TensorType: Copy + 'static {
    const DTYPE: DataType;

    fn to_bytes(values: &[Self]) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Result<Vec<Self>>;
}

macro_rules! pod_tensor_type {
    ($ty:ty, $dtype:expr) => {
        impl TensorType for $ty {
            const DTYPE: DataType = $dtype;

            fn to_bytes(values: &[Self]) -> Vec<u8> {
                bytemuck::cast_slice(values).to_vec()
            }

            fn from_bytes(bytes: &[u8]) -> Result<Vec<Self>> {
                let width = std::mem::size_of::<Self>();
                if bytes.len() % width != 0 {
                    return Err(Status::invalid_argument(format!(
                        "byte length {} is not a multiple of the {}-byte element width",
                        bytes.len(),
                        width
                    ))
                    .into());
                }
                // Copy into a fresh, correctly aligned vector.
                let mut out = vec![<Self as bytemuck::Zeroable>::zeroed(); bytes.len() / width];
                bytemuck::cast_slice_mut::<Self, u8>(&mut out).copy_from_slice(bytes);
                Ok(out)
            }
        }
    };
}

pod_tensor_type!(f32, DataType::Float32);
pod_tensor_type!(f64, DataType::Float64);
pod_tensor_type!(i8, DataType::Int8);
pod_tensor_type!(i16, DataType::Int16);
pod_tensor_type!(i32, DataType::Int32);
pod_tensor_type!(i64, DataType::Int64);
pod_tensor_type!(u8, DataType::UInt8);

impl TensorType for bool {
    const DTYPE: DataType = DataType::Bool;

    fn to_bytes(values: &[Self]) -> Vec<u8> {
        values.iter().map(|&b| u8::from(b)).collect()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Vec<Self>> {
        Ok(bytes.iter().map(|&b| b != 0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_tags() {
        assert_eq!(DataType::Float32.size(), Some(4));
        assert_eq!(DataType::Int64.size(), Some(8));
        assert_eq!(DataType::Bool.size(), Some(1));
        assert_eq!(DataType::String.size(), None);
    }

    #[test]
    fn raw_tags_round_trip() {
        for dt in [
            DataType::Float32,
            DataType::Float64,
            DataType::Int8,
            DataType::Int16,
            DataType::Int32,
            DataType::Int64,
            DataType::UInt8,
            DataType::Bool,
            DataType::String,
        ] {
            assert_eq!(DataType::from_raw(dt.to_raw()).unwrap(), dt);
        }
        assert!(DataType::from_raw(0).is_err());
    }

    #[test]
    fn bool_conversion_is_lossless() {
        let values = [true, false, true];
        let bytes = bool::to_bytes(&values);
        assert_eq!(bytes, vec![1, 0, 1]);
        assert_eq!(bool::from_bytes(&bytes).unwrap(), values);
    }

    #[test]
    fn misaligned_source_bytes_still_decode() {
        // Deliberately unaligned view into a larger buffer.
        let backing: Vec<u8> = vec![0, 1, 0, 0, 0, 2, 0, 0, 0];
        let decoded = i32::from_bytes(&backing[1..]).unwrap();
        assert_eq!(decoded, vec![1, 2]);
    }
}
