//! Host tensors for feeding and reading model instances.

use crate::device::kernels;
use crate::engine::Binding;
use basalt_core::{device_data_type, Error, Result};
use basalt_model::DataType;
use bytemuck::Pod;

/// Rust element types with a model data type.
pub trait Element: Pod {
    const DTYPE: DataType;
}

macro_rules! element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(impl Element for $ty {
            const DTYPE: DataType = DataType::$dtype;
        })*
    };
}

element! {
    f64 => F64,
    f32 => F32,
    half::f16 => F16,
    i64 => I64,
    i32 => I32,
    i16 => I16,
    i8 => I8,
    u64 => U64,
    u32 => U32,
    u16 => U16,
    u8 => U8,
}

/// Densely packed tensor in host memory.
///
/// # Example
/// ```
/// # use basalt_runtime::Tensor;
/// let tensor = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
/// assert_eq!(tensor.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<u8>,
    shape: Vec<usize>,
    dtype: DataType,
}

impl Tensor {
    /// Create a tensor from typed elements.
    ///
    /// # Errors
    /// Returns `Error::Shape` if `data` does not hold exactly one element per
    /// position of `shape`.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::Shape(format!(
                "{} elements do not fill shape {:?} ({} expected)",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self {
            data: bytemuck::cast_slice(&data).to_vec(),
            shape: shape.to_vec(),
            dtype: T::DTYPE,
        })
    }

    /// Create a tensor from densely packed bytes.
    pub fn from_bytes(data: Vec<u8>, shape: &[usize], dtype: DataType) -> Result<Self> {
        let expected = shape.iter().product::<usize>() * dtype.size();
        if data.len() != expected {
            return Err(Error::Shape(format!(
                "{} bytes do not fill {:?} tensor of shape {:?} ({} expected)",
                data.len(),
                dtype,
                shape,
                expected
            )));
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
            dtype,
        })
    }

    pub fn zeros(dtype: DataType, shape: &[usize]) -> Self {
        Self {
            data: vec![0; shape.iter().product::<usize>() * dtype.size()],
            shape: shape.to_vec(),
            dtype,
        }
    }

    /// Tensor with every element set to `value`, converted to `dtype`.
    pub fn filled(dtype: DataType, shape: &[usize], value: f64) -> Result<Self> {
        let device_type = numeric_type(dtype)?;
        let mut tensor = Self::zeros(dtype, shape);
        for index in 0..tensor.len() {
            kernels::write_element(&mut tensor.data, device_type, index, value);
        }
        Ok(tensor)
    }

    /// Copy the elements out as `T`.
    ///
    /// # Errors
    /// Returns `Error::Type` if `T` is not the tensor's element type.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::Type(format!(
                "tensor holds {:?}, requested {:?}",
                self.dtype,
                T::DTYPE
            )));
        }
        Ok(bytemuck::pod_collect_to_vec(&self.data))
    }

    /// Every element widened to `f64`.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let device_type = numeric_type(self.dtype)?;
        Ok((0..self.len())
            .map(|i| kernels::read_element(&self.data, device_type, i))
            .collect())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-only binding of this tensor to model tensor `tensor_index`.
    pub fn binding(&self, tensor_index: usize) -> Binding<'_> {
        Binding::cpu(tensor_index, &self.data)
    }

    /// Writable binding of this tensor to model tensor `tensor_index`.
    pub fn binding_mut(&mut self, tensor_index: usize) -> Binding<'_> {
        Binding::cpu_mut(tensor_index, &mut self.data)
    }
}

fn numeric_type(dtype: DataType) -> Result<basalt_core::DeviceDataType> {
    device_data_type(dtype)
        .ok_or_else(|| Error::Type(format!("{:?} elements have no numeric value", dtype)))
}
