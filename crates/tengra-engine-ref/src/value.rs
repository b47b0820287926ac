//! Engine-side tensor values.
//!
//! A [`Value`] is the engine's concrete tensor: a dtype tag, dims and a
//! flat byte buffer. The same triple backs attribute tensors, run feeds
//! and run results; [`TensorCell`] is the boxed form handed across the
//! ABI as an opaque tensor handle.

use serde::{Deserialize, Serialize};
use tengra_abi::dtype;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Value {
    pub dtype: i32,
    pub dims: Vec<i64>,
    pub bytes: Vec<u8>,
}

impl Value {
    pub fn new(dtype: i32, dims: Vec<i64>, bytes: Vec<u8>) -> Self {
        Value { dtype, dims, bytes }
    }

    pub fn from_typed<T: bytemuck::Pod>(dtype: i32, dims: Vec<i64>, values: &[T]) -> Self {
        Value {
            dtype,
            dims,
            bytes: bytemuck::cast_slice(values).to_vec(),
        }
    }

    /// Fixed element width in bytes; `None` for variable-width types.
    pub fn elem_width(dtype: i32) -> Option<usize> {
        match dtype {
            dtype::FLOAT32 | dtype::INT32 => Some(4),
            dtype::FLOAT64 | dtype::INT64 => Some(8),
            dtype::INT16 => Some(2),
            dtype::INT8 | dtype::UINT8 | dtype::BOOL => Some(1),
            _ => None,
        }
    }

    pub fn num_elements(&self) -> usize {
        self.dims.iter().map(|&d| d.max(0) as usize).product()
    }

    pub fn is_scalar_like(&self) -> bool {
        self.num_elements() == 1
    }

    /// Copies the buffer out as a typed vector. The copy keeps the read
    /// alignment-safe regardless of how the bytes arrived.
    pub fn typed<T: bytemuck::Pod>(&self) -> Result<Vec<T>> {
        let width = std::mem::size_of::<T>();
        if width == 0 || self.bytes.len() % width != 0 {
            return Err(EngineError::internal(format!(
                "tensor byte length {} does not match element width {}",
                self.bytes.len(),
                width
            )));
        }
        let mut out = vec![T::zeroed(); self.bytes.len() / width];
        bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(&self.bytes);
        Ok(out)
    }

    /// Reads a one-element integer tensor (Int32 or Int64) as i64.
    pub fn as_i64_scalar(&self) -> Result<i64> {
        if !self.is_scalar_like() {
            return Err(EngineError::invalid_argument(
                "expected a scalar integer tensor",
            ));
        }
        match self.dtype {
            dtype::INT32 => Ok(self.typed::<i32>()?[0] as i64),
            dtype::INT64 => Ok(self.typed::<i64>()?[0]),
            _ => Err(EngineError::invalid_argument(
                "expected an Int32 or Int64 tensor",
            )),
        }
    }

    /// True when every element of a boolean tensor is set.
    pub fn bool_all_true(&self) -> Result<bool> {
        if self.dtype != dtype::BOOL {
            return Err(EngineError::invalid_argument("expected a boolean tensor"));
        }
        Ok(self.bytes.iter().all(|&b| b != 0))
    }
}

/// The boxed ABI tensor object.
pub(crate) struct TensorCell {
    pub value: Value,
}

impl TensorCell {
    pub fn new(value: Value) -> Box<Self> {
        Box::new(TensorCell { value })
    }

    pub fn zeroed(dtype: i32, dims: Vec<i64>, byte_len: usize) -> Box<Self> {
        TensorCell::new(Value::new(dtype, dims, vec![0u8; byte_len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_round_trip() {
        let v = Value::from_typed(dtype::INT32, vec![3], &[1i32, 2, 3]);
        assert_eq!(v.typed::<i32>().unwrap(), vec![1, 2, 3]);
        assert_eq!(v.num_elements(), 3);
    }

    #[test]
    fn scalar_detection() {
        assert!(Value::from_typed(dtype::INT32, vec![], &[7i32]).is_scalar_like());
        assert!(Value::from_typed(dtype::INT32, vec![1, 1], &[7i32]).is_scalar_like());
        assert!(!Value::from_typed(dtype::INT32, vec![2], &[1i32, 2]).is_scalar_like());
    }

    #[test]
    fn bool_all_true_rejects_numeric() {
        let v = Value::from_typed(dtype::INT32, vec![], &[1i32]);
        assert!(v.bool_all_true().is_err());
    }
}
