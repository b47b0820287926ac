//! Typed, shaped, owned data buffers exchanged with the engine.

use std::sync::Arc;

use tengra_abi::{strings, RawTensor};

use crate::dtype::{DataType, TensorType};
use crate::error::Result;
use crate::mem;
use crate::platform::{Engine, Platform};
use crate::status::Status;

/// Which side is responsible for the underlying buffer's provenance.
///
/// Either way the handle is released exactly once, when the [`Tensor`]
/// drops; the tag records where the bytes came from and keeps
/// engine-produced results read-only by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    CallerOwned,
    EngineOwned,
}

/// Scalars and arbitrarily nested arrays, the value form accepted and
/// produced by tensor marshaling.
///
/// Nesting must be rectangular: every branch of a sequence carries the
/// same shape. Jagged input is rejected with `InvalidArgument`.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData<T> {
    Scalar(T),
    Seq(Vec<ArrayData<T>>),
}

impl<T: Copy> ArrayData<T> {
    /// A one-dimensional sequence of scalars.
    pub fn of(values: &[T]) -> ArrayData<T> {
        ArrayData::Seq(values.iter().map(|&v| ArrayData::Scalar(v)).collect())
    }

    pub fn seq(items: Vec<ArrayData<T>>) -> ArrayData<T> {
        ArrayData::Seq(items)
    }

    /// The rectangular shape of this value.
    pub fn shape(&self) -> Result<Vec<i64>> {
        match self {
            ArrayData::Scalar(_) => Ok(Vec::new()),
            ArrayData::Seq(items) => {
                let inner = match items.first() {
                    Some(first) => first.shape()?,
                    None => Vec::new(),
                };
                for item in &items[1..] {
                    if item.shape()? != inner {
                        return Err(Status::invalid_argument(
                            "jagged array: nested lengths are inconsistent",
                        )
                        .into());
                    }
                }
                let mut shape = Vec::with_capacity(inner.len() + 1);
                shape.push(items.len() as i64);
                shape.extend(inner);
                Ok(shape)
            }
        }
    }

    fn flatten_into(&self, out: &mut Vec<T>) {
        match self {
            ArrayData::Scalar(v) => out.push(*v),
            ArrayData::Seq(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }

    fn nest(flat: &[T], shape: &[i64]) -> ArrayData<T> {
        match shape.split_first() {
            None => ArrayData::Scalar(flat[0]),
            Some((&leading, rest)) => {
                let n = leading.max(0) as usize;
                let stride = if n == 0 { 0 } else { flat.len() / n };
                ArrayData::Seq(
                    (0..n)
                        .map(|i| Self::nest(&flat[i * stride..(i + 1) * stride], rest))
                        .collect(),
                )
            }
        }
    }
}

/// An owned, typed, shaped tensor backed by an engine-allocated buffer.
///
/// Not `Clone`: each value owns its native handle exclusively, so a
/// double release is unrepresentable.
pub struct Tensor {
    engine: Arc<Engine>,
    raw: *mut RawTensor,
    dtype: DataType,
    dims: Vec<i64>,
    ownership: Ownership,
}

// Buffers are written only during construction; afterwards a tensor is
// an immutable byte container, safe to share and send.
unsafe impl Send for Tensor {}
unsafe impl Sync for Tensor {}

impl Tensor {
    /// Allocates an engine buffer and copies `bytes` into it through the
    /// audited primitive.
    fn alloc(platform: &Platform, dtype: DataType, dims: &[i64], bytes: &[u8]) -> Result<Tensor> {
        let engine = platform.engine().clone();
        let raw = unsafe {
            (engine.api().tensor_alloc)(
                dtype.to_raw(),
                dims.as_ptr(),
                dims.len() as i32,
                bytes.len(),
            )
        };
        if raw.is_null() {
            return Err(Status::resource_exhausted(format!(
                "engine failed to allocate a {} byte tensor buffer",
                bytes.len()
            ))
            .into());
        }
        // Construct first so the handle is released even if the copy is
        // rejected.
        let tensor = Tensor {
            engine,
            raw,
            dtype,
            dims: dims.to_vec(),
            ownership: Ownership::CallerOwned,
        };
        let api = tensor.engine.api();
        let dst = unsafe { (api.tensor_data)(raw) } as *mut u8;
        let capacity = unsafe { (api.tensor_byte_size)(raw) };
        mem::copy_into(bytes, dst, capacity)?;
        Ok(tensor)
    }

    /// Wraps a tensor the engine just produced.
    pub(crate) fn from_engine_raw(engine: &Arc<Engine>, raw: *mut RawTensor) -> Result<Tensor> {
        let api = engine.api();
        let dtype = DataType::from_raw(unsafe { (api.tensor_dtype)(raw) });
        let dtype = match dtype {
            Ok(dt) => dt,
            Err(e) => {
                unsafe { (api.tensor_delete)(raw) };
                return Err(e);
            }
        };
        let ndims = unsafe { (api.tensor_num_dims)(raw) }.max(0);
        let dims = (0..ndims)
            .map(|i| unsafe { (api.tensor_dim)(raw, i) })
            .collect();
        Ok(Tensor {
            engine: engine.clone(),
            raw,
            dtype,
            dims,
            ownership: Ownership::EngineOwned,
        })
    }

    /// Builds a tensor from a scalar or nested array value, inferring
    /// dtype and shape.
    pub fn from_array_data<T: TensorType>(
        platform: &Platform,
        value: &ArrayData<T>,
    ) -> Result<Tensor> {
        let dims = value.shape()?;
        let mut flat = Vec::new();
        value.flatten_into(&mut flat);
        Self::from_vec(platform, flat, &dims)
    }

    /// Builds a tensor from flat data and an explicit shape.
    pub fn from_vec<T: TensorType>(
        platform: &Platform,
        data: Vec<T>,
        shape: &[i64],
    ) -> Result<Tensor> {
        let expected: usize = shape.iter().map(|&d| d.max(0) as usize).product();
        if shape.iter().any(|&d| d < 0) {
            return Err(
                Status::invalid_argument("a concrete tensor cannot have unknown dims").into(),
            );
        }
        if data.len() != expected {
            return Err(Status::invalid_argument(format!(
                "data length {} does not match shape {:?} (expected {})",
                data.len(),
                shape,
                expected
            ))
            .into());
        }
        Self::alloc(platform, T::DTYPE, shape, &T::to_bytes(&data))
    }

    /// Builds a rank-0 tensor.
    pub fn from_scalar<T: TensorType>(platform: &Platform, value: T) -> Result<Tensor> {
        Self::from_vec(platform, vec![value], &[])
    }

    /// Builds a string tensor from byte strings and an explicit shape.
    /// Element bytes are arbitrary; embedded NULs are preserved.
    pub fn from_byte_strings<E: AsRef<[u8]>>(
        platform: &Platform,
        elements: &[E],
        shape: &[i64],
    ) -> Result<Tensor> {
        let expected: usize = shape.iter().map(|&d| d.max(0) as usize).product();
        if elements.len() != expected {
            return Err(Status::invalid_argument(format!(
                "{} string elements do not match shape {:?}",
                elements.len(),
                shape
            ))
            .into());
        }
        Self::alloc(platform, DataType::String, shape, &strings::encode(elements))
    }

    /// Builds a one-dimensional string tensor from UTF-8 strings.
    pub fn from_strings<S: AsRef<str>>(platform: &Platform, elements: &[S]) -> Result<Tensor> {
        let bytes: Vec<&[u8]> = elements.iter().map(|s| s.as_ref().as_bytes()).collect();
        Self::from_byte_strings(platform, &bytes, &[elements.len() as i64])
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[i64] {
        &self.dims
    }

    pub fn num_elements(&self) -> usize {
        self.dims.iter().map(|&d| d.max(0) as usize).product()
    }

    pub fn byte_size(&self) -> usize {
        unsafe { (self.engine.api().tensor_byte_size)(self.raw) }
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// The raw buffer, via the audited borrow.
    fn bytes(&self) -> &[u8] {
        let api = self.engine.api();
        let ptr = unsafe { (api.tensor_data)(self.raw) } as *const u8;
        let len = unsafe { (api.tensor_byte_size)(self.raw) };
        unsafe { mem::borrow_bytes(ptr, len) }
    }

    fn check_dtype(&self, requested: DataType) -> Result<()> {
        if self.dtype != requested {
            return Err(Status::invalid_argument(format!(
                "tensor holds {:?}, requested {:?}",
                self.dtype, requested
            ))
            .into());
        }
        Ok(())
    }

    /// The flat rectangular value.
    pub fn to_vec<T: TensorType>(&self) -> Result<Vec<T>> {
        self.check_dtype(T::DTYPE)?;
        T::from_bytes(self.bytes())
    }

    /// The nested value; agrees element-for-element with [`to_vec`].
    ///
    /// [`to_vec`]: Tensor::to_vec
    pub fn to_array_data<T: TensorType>(&self) -> Result<ArrayData<T>> {
        let flat = self.to_vec::<T>()?;
        if self.dims.is_empty() && flat.is_empty() {
            return Err(Status::invalid_argument("scalar tensor holds no element").into());
        }
        Ok(ArrayData::nest(&flat, &self.dims))
    }

    /// Reads a rank-0 tensor's single element.
    pub fn scalar<T: TensorType>(&self) -> Result<T> {
        if !self.dims.is_empty() {
            return Err(Status::invalid_argument(format!(
                "tensor of shape {:?} is not a scalar",
                self.dims
            ))
            .into());
        }
        self.to_vec::<T>()?
            .into_iter()
            .next()
            .ok_or_else(|| Status::invalid_argument("scalar tensor holds no element").into())
    }

    /// Decodes a string tensor into per-element byte strings.
    pub fn to_byte_strings(&self) -> Result<Vec<Vec<u8>>> {
        self.check_dtype(DataType::String)?;
        strings::decode(self.bytes(), self.num_elements())
            .map_err(|e| Status::invalid_argument(e.to_string()).into())
    }

    /// Decodes a string tensor as UTF-8.
    pub fn to_strings(&self) -> Result<Vec<String>> {
        self.to_byte_strings()?
            .into_iter()
            .map(|bytes| {
                String::from_utf8(bytes).map_err(|_| {
                    Status::invalid_argument("string tensor element is not valid UTF-8").into()
                })
            })
            .collect()
    }

    pub(crate) fn raw(&self) -> *mut RawTensor {
        self.raw
    }
}

impl Drop for Tensor {
    fn drop(&mut self) {
        unsafe { (self.engine.api().tensor_delete)(self.raw) };
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("dtype", &self.dtype)
            .field("shape", &self.dims)
            .field("ownership", &self.ownership)
            .finish()
    }
}
