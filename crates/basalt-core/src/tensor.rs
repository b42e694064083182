//! Concrete tensor descriptors.

use crate::{Error, Result};
use basalt_model::{DataType, TensorInfo, TensorShape};
use std::sync::Arc;

/// Highest tensor rank the device layer accepts.
pub const MAX_RANK: usize = 8;

/// A tensor with a fully concrete shape, as seen by operators.
///
/// Built once per tensor table entry at load time and referred to by index
/// afterwards. Prepared data is shared rather than copied.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDesc {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: DataType,
    pub prepared_data: Option<Arc<[u8]>>,
}

impl TensorDesc {
    /// Create a descriptor without prepared data.
    pub fn new(name: impl Into<String>, dtype: DataType, shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            shape: shape.to_vec(),
            dtype,
            prepared_data: None,
        }
    }

    /// Build a descriptor from a model tensor entry.
    ///
    /// Fails with `DynamicShapeUnsupported` unless every dimension is known,
    /// and with `Shape` when the rank exceeds [`MAX_RANK`].
    pub fn from_info(info: &TensorInfo) -> Result<Self> {
        let shape = match &info.shape {
            TensorShape::Static(dims) => dims.clone(),
            TensorShape::Dynamic(dims) => {
                return Err(Error::DynamicShapeUnsupported(format!(
                    "tensor '{}' has symbolic shape {:?}",
                    info.name, dims
                )));
            }
            TensorShape::Unknown => {
                return Err(Error::DynamicShapeUnsupported(format!(
                    "tensor '{}' has no shape",
                    info.name
                )));
            }
        };

        if shape.len() > MAX_RANK {
            return Err(Error::Shape(format!(
                "tensor '{}' has rank {}, at most {} is supported",
                info.name,
                shape.len(),
                MAX_RANK
            )));
        }

        Ok(Self {
            name: info.name.clone(),
            shape,
            dtype: info.dtype,
            prepared_data: info.initializer.as_deref().map(Arc::from),
        })
    }

    /// Number of elements.
    pub fn volume(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn elem_byte_size(&self) -> usize {
        self.dtype.size()
    }

    /// Size of the densely packed data in bytes.
    pub fn data_size(&self) -> usize {
        self.volume() * self.elem_byte_size()
    }

    pub fn has_prepared_data(&self) -> bool {
        self.prepared_data.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_model::{Dimension, TensorKind};

    #[test]
    fn test_from_static_info() {
        let info = TensorInfo::weight("w", DataType::F16, &[2, 3], vec![0; 12]);
        let desc = TensorDesc::from_info(&info).unwrap();

        assert_eq!(desc.volume(), 6);
        assert_eq!(desc.elem_byte_size(), 2);
        assert_eq!(desc.data_size(), 12);
        assert!(desc.has_prepared_data());
    }

    #[test]
    fn test_from_dynamic_info_fails() {
        let mut info = TensorInfo::new("x", DataType::F32, &[], TensorKind::Input);
        info.shape = TensorShape::Dynamic(vec![Dimension::Named("batch".into())]);

        assert!(matches!(
            TensorDesc::from_info(&info),
            Err(Error::DynamicShapeUnsupported(_))
        ));
    }

    #[test]
    fn test_rank_limit() {
        let info = TensorInfo::new("x", DataType::F32, &[1; 9], TensorKind::Input);
        assert!(matches!(TensorDesc::from_info(&info), Err(Error::Shape(_))));
    }

    #[test]
    fn test_scalar_volume() {
        let desc = TensorDesc::new("s", DataType::F32, &[]);
        assert_eq!(desc.volume(), 1);
        assert_eq!(desc.data_size(), 4);
    }
}
