//! Device-neutral operator descriptors.
//!
//! Operators translate their validated inputs into an [`OperatorDescriptor`]
//! during initialization. Accelerators receive only descriptors, never the
//! operators themselves, so the device layer has no knowledge of attribute
//! parsing or shape inference.

use crate::shape::{broadcast_strides_and_sizes, buffer_size_bytes, contiguous_strides};
use crate::tensor::TensorDesc;
use crate::{Error, Result};
use basalt_model::DataType;
use std::ops::Range;

/// Element types an accelerator can store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceDataType {
    Float64,
    Float32,
    Float16,
    Int64,
    Int32,
    Int16,
    Int8,
    Uint64,
    Uint32,
    Uint16,
    Uint8,
}

impl DeviceDataType {
    pub fn size(self) -> usize {
        match self {
            DeviceDataType::Float64 | DeviceDataType::Int64 | DeviceDataType::Uint64 => 8,
            DeviceDataType::Float32 | DeviceDataType::Int32 | DeviceDataType::Uint32 => 4,
            DeviceDataType::Float16 | DeviceDataType::Int16 | DeviceDataType::Uint16 => 2,
            DeviceDataType::Int8 | DeviceDataType::Uint8 => 1,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            DeviceDataType::Float64 | DeviceDataType::Float32 | DeviceDataType::Float16
        )
    }
}

/// Map a model data type to its device representation.
///
/// Booleans are stored as bytes. `BF16` and `String` have no device form.
pub fn device_data_type(dtype: DataType) -> Option<DeviceDataType> {
    match dtype {
        DataType::F64 => Some(DeviceDataType::Float64),
        DataType::F32 => Some(DeviceDataType::Float32),
        DataType::F16 => Some(DeviceDataType::Float16),
        DataType::I64 => Some(DeviceDataType::Int64),
        DataType::I32 => Some(DeviceDataType::Int32),
        DataType::I16 => Some(DeviceDataType::Int16),
        DataType::I8 => Some(DeviceDataType::Int8),
        DataType::U64 => Some(DeviceDataType::Uint64),
        DataType::U32 => Some(DeviceDataType::Uint32),
        DataType::U16 => Some(DeviceDataType::Uint16),
        DataType::U8 | DataType::Bool => Some(DeviceDataType::Uint8),
        DataType::BF16 | DataType::String => None,
    }
}

/// A tensor as the device reads or writes it.
///
/// `strides` is `None` for densely packed tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTensorDesc {
    pub data_type: DeviceDataType,
    pub sizes: Vec<usize>,
    pub strides: Option<Vec<usize>>,
    pub total_size_bytes: u64,
    /// Tensor data lives in the graph's persistent resource, copied there
    /// once during initialization.
    pub owned_by_device: bool,
}

impl DeviceTensorDesc {
    /// Densely packed descriptor for `tensor`.
    pub fn new(tensor: &TensorDesc) -> Result<Self> {
        let data_type = Self::data_type_of(tensor)?;
        let strides = contiguous_strides(&tensor.shape);
        Ok(Self {
            data_type,
            total_size_bytes: buffer_size_bytes(&tensor.shape, &strides, data_type.size()),
            sizes: tensor.shape.clone(),
            strides: None,
            owned_by_device: tensor.has_prepared_data(),
        })
    }

    /// Descriptor reading `tensor` broadcast to `target`.
    ///
    /// Falls back to the dense form when the shapes already match.
    pub fn broadcast(tensor: &TensorDesc, target: &[usize]) -> Result<Self> {
        if tensor.shape == target {
            return Self::new(tensor);
        }
        let data_type = Self::data_type_of(tensor)?;
        let (sizes, strides) = broadcast_strides_and_sizes(&tensor.shape, target)?;
        Ok(Self {
            data_type,
            total_size_bytes: buffer_size_bytes(&sizes, &strides, data_type.size()),
            sizes,
            strides: Some(strides),
            owned_by_device: tensor.has_prepared_data(),
        })
    }

    fn data_type_of(tensor: &TensorDesc) -> Result<DeviceDataType> {
        device_data_type(tensor.dtype).ok_or_else(|| {
            Error::Type(format!(
                "tensor '{}' has type {:?}, which no device can represent",
                tensor.name, tensor.dtype
            ))
        })
    }

    /// Strides in elements, whether explicit or implied.
    pub fn effective_strides(&self) -> Vec<usize> {
        match &self.strides {
            Some(strides) => strides.clone(),
            None => contiguous_strides(&self.sizes),
        }
    }

    /// Number of logical elements described by `sizes`.
    pub fn element_count(&self) -> usize {
        self.sizes.iter().product()
    }
}

/// One-input elementwise functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryKind {
    Abs,
    Acos,
    Acosh,
    Asin,
    Asinh,
    Atan,
    Atanh,
    Ceil,
    Cos,
    Cosh,
    Elu,
    Erf,
    Exp,
    Floor,
    IsInf,
    IsNan,
    HardSigmoid,
    LeakyRelu,
    Log,
    Neg,
    Reciprocal,
    Relu,
    Round,
    Selu,
    Sigmoid,
    Sign,
    Sin,
    Sinh,
    Softplus,
    Softsign,
    Sqrt,
    Tan,
    Tanh,
}

impl UnaryKind {
    pub const ALL: [UnaryKind; 33] = [
        UnaryKind::Abs,
        UnaryKind::Acos,
        UnaryKind::Acosh,
        UnaryKind::Asin,
        UnaryKind::Asinh,
        UnaryKind::Atan,
        UnaryKind::Atanh,
        UnaryKind::Ceil,
        UnaryKind::Cos,
        UnaryKind::Cosh,
        UnaryKind::Elu,
        UnaryKind::Erf,
        UnaryKind::Exp,
        UnaryKind::Floor,
        UnaryKind::IsInf,
        UnaryKind::IsNan,
        UnaryKind::HardSigmoid,
        UnaryKind::LeakyRelu,
        UnaryKind::Log,
        UnaryKind::Neg,
        UnaryKind::Reciprocal,
        UnaryKind::Relu,
        UnaryKind::Round,
        UnaryKind::Selu,
        UnaryKind::Sigmoid,
        UnaryKind::Sign,
        UnaryKind::Sin,
        UnaryKind::Sinh,
        UnaryKind::Softplus,
        UnaryKind::Softsign,
        UnaryKind::Sqrt,
        UnaryKind::Tan,
        UnaryKind::Tanh,
    ];

    /// Operator type name as it appears in models.
    pub fn op_type(self) -> &'static str {
        match self {
            UnaryKind::Abs => "Abs",
            UnaryKind::Acos => "Acos",
            UnaryKind::Acosh => "Acosh",
            UnaryKind::Asin => "Asin",
            UnaryKind::Asinh => "Asinh",
            UnaryKind::Atan => "Atan",
            UnaryKind::Atanh => "Atanh",
            UnaryKind::Ceil => "Ceil",
            UnaryKind::Cos => "Cos",
            UnaryKind::Cosh => "Cosh",
            UnaryKind::Elu => "Elu",
            UnaryKind::Erf => "Erf",
            UnaryKind::Exp => "Exp",
            UnaryKind::Floor => "Floor",
            UnaryKind::IsInf => "IsInf",
            UnaryKind::IsNan => "IsNaN",
            UnaryKind::HardSigmoid => "HardSigmoid",
            UnaryKind::LeakyRelu => "LeakyRelu",
            UnaryKind::Log => "Log",
            UnaryKind::Neg => "Neg",
            UnaryKind::Reciprocal => "Reciprocal",
            UnaryKind::Relu => "Relu",
            UnaryKind::Round => "Round",
            UnaryKind::Selu => "Selu",
            UnaryKind::Sigmoid => "Sigmoid",
            UnaryKind::Sign => "Sign",
            UnaryKind::Sin => "Sin",
            UnaryKind::Sinh => "Sinh",
            UnaryKind::Softplus => "Softplus",
            UnaryKind::Softsign => "Softsign",
            UnaryKind::Sqrt => "Sqrt",
            UnaryKind::Tan => "Tan",
            UnaryKind::Tanh => "Tanh",
        }
    }
}

/// Two-input elementwise functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Prelu,
    /// `fmod` selects C-style remainder (sign of the dividend) instead of
    /// the integer modulus (sign of the divisor).
    Mod { fmod: bool },
}

impl BinaryKind {
    pub fn op_type(self) -> &'static str {
        match self {
            BinaryKind::Add => "Add",
            BinaryKind::Sub => "Sub",
            BinaryKind::Mul => "Mul",
            BinaryKind::Div => "Div",
            BinaryKind::Pow => "Pow",
            BinaryKind::Prelu => "PRelu",
            BinaryKind::Mod { .. } => "Mod",
        }
    }
}

/// N-input elementwise reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariadicKind {
    Max,
    Min,
    Sum,
    Mean,
}

impl VariadicKind {
    pub const ALL: [VariadicKind; 4] = [
        VariadicKind::Max,
        VariadicKind::Min,
        VariadicKind::Sum,
        VariadicKind::Mean,
    ];

    pub fn op_type(self) -> &'static str {
        match self {
            VariadicKind::Max => "Max",
            VariadicKind::Min => "Min",
            VariadicKind::Sum => "Sum",
            VariadicKind::Mean => "Mean",
        }
    }
}

/// One dispatch of a variadic operator.
#[derive(Debug, Clone, PartialEq)]
pub struct VariadicPass {
    /// Operator inputs combined by this pass.
    pub inputs: Range<usize>,
    /// The running output of the previous pass is combined as well.
    pub output_as_input: bool,
    /// Factor applied to the pass result.
    pub scale: Option<f32>,
}

/// How a GEMM bias input is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GemmBias {
    NoBias,
    /// Per-element bias broadcast to the output.
    Tensor,
    /// Single value added to every output element.
    Scalar,
}

/// Device-neutral description of one operator.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorDescriptor {
    Unary {
        kind: UnaryKind,
        input: DeviceTensorDesc,
        output: DeviceTensorDesc,
        alpha: f32,
        beta: f32,
        gamma: f32,
    },
    Binary {
        kind: BinaryKind,
        a: DeviceTensorDesc,
        b: DeviceTensorDesc,
        output: DeviceTensorDesc,
    },
    Variadic {
        kind: VariadicKind,
        inputs: Vec<DeviceTensorDesc>,
        output: DeviceTensorDesc,
        passes: Vec<VariadicPass>,
    },
    /// `output[.., m, n] = alpha * Σk A[.., m, k] * B[.., k, n] + beta * C[.., m, n]`.
    ///
    /// `a`, `b` and `c` carry the output's batch dimensions (possibly with
    /// zero strides) followed by their two matrix dimensions as stored.
    Gemm {
        a: DeviceTensorDesc,
        b: DeviceTensorDesc,
        c: Option<DeviceTensorDesc>,
        output: DeviceTensorDesc,
        alpha: f32,
        beta: f32,
        trans_a: bool,
        trans_b: bool,
        bias: GemmBias,
    },
}

impl OperatorDescriptor {
    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            OperatorDescriptor::Unary { kind, .. } => kind.op_type().to_string(),
            OperatorDescriptor::Binary { kind, .. } => kind.op_type().to_string(),
            OperatorDescriptor::Variadic { kind, passes, .. } => {
                format!("{}[{} passes]", kind.op_type(), passes.len())
            }
            OperatorDescriptor::Gemm { bias, .. } => format!("Gemm[{:?}]", bias),
        }
    }

    /// Input tensors in slot order.
    pub fn inputs(&self) -> Vec<&DeviceTensorDesc> {
        match self {
            OperatorDescriptor::Unary { input, .. } => vec![input],
            OperatorDescriptor::Binary { a, b, .. } => vec![a, b],
            OperatorDescriptor::Variadic { inputs, .. } => inputs.iter().collect(),
            OperatorDescriptor::Gemm { a, b, c, .. } => {
                let mut inputs = vec![a, b];
                inputs.extend(c.as_ref());
                inputs
            }
        }
    }

    /// Output tensors in slot order.
    pub fn outputs(&self) -> Vec<&DeviceTensorDesc> {
        match self {
            OperatorDescriptor::Unary { output, .. }
            | OperatorDescriptor::Binary { output, .. }
            | OperatorDescriptor::Variadic { output, .. }
            | OperatorDescriptor::Gemm { output, .. } => vec![output],
        }
    }

    pub fn input_count(&self) -> usize {
        self.inputs().len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_descriptor() {
        let tensor = TensorDesc::new("x", DataType::F32, &[2, 3]);
        let desc = DeviceTensorDesc::new(&tensor).unwrap();

        assert_eq!(desc.data_type, DeviceDataType::Float32);
        assert_eq!(desc.sizes, vec![2, 3]);
        assert!(desc.strides.is_none());
        assert_eq!(desc.total_size_bytes, 24);
        assert!(!desc.owned_by_device);
    }

    #[test]
    fn test_broadcast_descriptor() {
        let tensor = TensorDesc::new("a", DataType::F16, &[1, 3]);
        let desc = DeviceTensorDesc::broadcast(&tensor, &[4, 3]).unwrap();

        assert_eq!(desc.sizes, vec![4, 3]);
        assert_eq!(desc.strides, Some(vec![0, 1]));
        assert_eq!(desc.effective_strides(), vec![0, 1]);
        assert_eq!(desc.total_size_bytes, 8);
    }

    #[test]
    fn test_unrepresentable_type() {
        let tensor = TensorDesc::new("x", DataType::BF16, &[2]);
        assert!(matches!(DeviceTensorDesc::new(&tensor), Err(Error::Type(_))));
        assert_eq!(device_data_type(DataType::String), None);
        assert_eq!(device_data_type(DataType::Bool), Some(DeviceDataType::Uint8));
    }

    #[test]
    fn test_weights_are_device_owned() {
        let mut tensor = TensorDesc::new("w", DataType::F32, &[2]);
        tensor.prepared_data = Some(vec![0u8; 8].into());
        assert!(DeviceTensorDesc::new(&tensor).unwrap().owned_by_device);
    }

    #[test]
    fn test_unary_names_are_unique() {
        let mut names: Vec<_> = UnaryKind::ALL.iter().map(|k| k.op_type()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), UnaryKind::ALL.len());
    }
}
