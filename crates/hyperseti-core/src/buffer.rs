//! Homogeneous numeric buffers tagged by where their bytes live
//!
//! A [`Buffer`] owns either host bytes or a [`DeviceHandle`] naming an
//! allocation inside an accelerator binding. The [`MemorySpace`] of a buffer
//! is read off the storage variant on every call, never stored separately.

use crate::error::{Error, Result};
use std::fmt;

/// Physical location of a buffer's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemorySpace {
    /// CPU-addressable system memory
    Host,
    /// Accelerator-resident memory
    Device,
}

impl fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemorySpace::Host => f.write_str("host"),
            MemorySpace::Device => f.write_str("device"),
        }
    }
}

/// Element type of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
    U8,
}

impl DType {
    /// Size of one element in bytes
    pub const fn size_bytes(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
            DType::U8 => 1,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::U8 => "uint8",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scalar types a [`Buffer`] can hold.
pub trait Element: bytemuck::Pod {
    const DTYPE: DType;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;
}

impl Element for i32 {
    const DTYPE: DType = DType::I32;
}

impl Element for i64 {
    const DTYPE: DType = DType::I64;
}

impl Element for u8 {
    const DTYPE: DType = DType::U8;
}

/// Opaque reference to an allocation owned by an accelerator binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    binding: u64,
    id: u64,
    len_bytes: usize,
}

impl DeviceHandle {
    /// `binding` identifies the owning binding instance, `id` the allocation.
    pub const fn new(binding: u64, id: u64, len_bytes: usize) -> Self {
        Self { binding, id, len_bytes }
    }

    pub const fn binding(&self) -> u64 {
        self.binding
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    pub const fn len_bytes(&self) -> usize {
        self.len_bytes
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}:{}", self.binding, self.id)
    }
}

/// Backing storage of a buffer
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    Host(Vec<u8>),
    Device(DeviceHandle),
}

/// Typed, shaped array in host or device memory
///
/// Cloning a host buffer copies its bytes. Cloning a device buffer copies
/// the handle, so both clones name the same allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    dtype: DType,
    shape: Vec<usize>,
    storage: Storage,
}

impl Buffer {
    /// Host buffer from a typed slice.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidShape`] if the shape does not describe `data.len()` elements.
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::InvalidShape(format!(
                "shape {:?} holds {} elements, data has {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            dtype: T::DTYPE,
            shape: shape.to_vec(),
            storage: Storage::Host(bytemuck::cast_slice::<T, u8>(data).to_vec()),
        })
    }

    /// One-dimensional host buffer.
    pub fn vector<T: Element>(data: &[T]) -> Self {
        Self {
            dtype: T::DTYPE,
            shape: vec![data.len()],
            storage: Storage::Host(bytemuck::cast_slice::<T, u8>(data).to_vec()),
        }
    }

    /// Reassemble a buffer from its parts, checking the byte length.
    pub fn from_parts(dtype: DType, shape: Vec<usize>, storage: Storage) -> Result<Self> {
        let expected = shape.iter().product::<usize>() * dtype.size_bytes();
        let actual = match &storage {
            Storage::Host(bytes) => bytes.len(),
            Storage::Device(handle) => handle.len_bytes(),
        };
        if expected != actual {
            return Err(Error::BufferSizeMismatch { expected, actual });
        }
        Ok(Self { dtype, shape, storage })
    }

    pub fn into_parts(self) -> (DType, Vec<usize>, Storage) {
        (self.dtype, self.shape, self.storage)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> usize {
        self.len() * self.dtype.size_bytes()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Where the bytes currently live, derived from the storage variant.
    pub fn space(&self) -> MemorySpace {
        match self.storage {
            Storage::Host(_) => MemorySpace::Host,
            Storage::Device(_) => MemorySpace::Device,
        }
    }

    pub fn device_handle(&self) -> Option<&DeviceHandle> {
        match &self.storage {
            Storage::Device(handle) => Some(handle),
            Storage::Host(_) => None,
        }
    }

    /// Raw host bytes.
    ///
    /// # Errors
    ///
    /// [`Error::NotOnHost`] for device buffers.
    pub fn host_bytes(&self) -> Result<&[u8]> {
        match &self.storage {
            Storage::Host(bytes) => Ok(bytes),
            Storage::Device(_) => Err(Error::NotOnHost),
        }
    }

    /// Copy the elements out as `T`.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::type_mismatch(self.dtype, T::DTYPE));
        }
        let bytes = self.host_bytes()?;
        Ok(bytes
            .chunks_exact(self.dtype.size_bytes())
            .map(bytemuck::pod_read_unaligned::<T>)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_follows_storage() {
        let host = Buffer::vector(&[1.0f32, 2.0, 3.0]);
        assert_eq!(host.space(), MemorySpace::Host);

        let (dtype, shape, _) = host.into_parts();
        let device = Buffer::from_parts(dtype, shape, Storage::Device(DeviceHandle::new(1, 7, 12))).unwrap();
        assert_eq!(device.space(), MemorySpace::Device);
        assert_eq!(device.device_handle().map(|h| h.id()), Some(7));
        assert!(matches!(device.host_bytes(), Err(Error::NotOnHost)));
    }

    #[test]
    fn from_slice_checks_shape() {
        let data = [0.0f64; 6];
        let buf = Buffer::from_slice(&data, &[2, 1, 3]).unwrap();
        assert_eq!(buf.len(), 6);
        assert_eq!(buf.ndim(), 3);
        assert_eq!(buf.size_bytes(), 48);

        let err = Buffer::from_slice(&data, &[4, 2]).unwrap_err();
        assert!(matches!(err, Error::InvalidShape(_)));
    }

    #[test]
    fn from_parts_checks_byte_length() {
        let err = Buffer::from_parts(DType::F32, vec![4], Storage::Host(vec![0; 15])).unwrap_err();
        assert!(matches!(err, Error::BufferSizeMismatch { expected: 16, actual: 15 }));
    }

    #[test]
    fn to_vec_checks_dtype() {
        let buf = Buffer::vector(&[1i32, -2, 3]);
        assert_eq!(buf.to_vec::<i32>().unwrap(), vec![1, -2, 3]);
        assert!(matches!(buf.to_vec::<f32>(), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn host_clone_is_independent_copy() {
        let a = Buffer::vector(&[1u8, 2, 3]);
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a.host_bytes().unwrap().as_ptr(), b.host_bytes().unwrap().as_ptr());
    }
}
