//! Core shape arithmetic, operator traits and accelerator abstraction for basalt.
//!
//! This crate provides the foundational abstractions that all other basalt crates depend on:
//! - Shape, stride and broadcast arithmetic (`shape`)
//! - Tensor descriptors built from the model table (`TensorDesc`)
//! - The `Operator` trait and the name-keyed `OperatorRegistry`
//! - Device-neutral operator descriptors (`OperatorDescriptor`)
//! - The `Accelerator` trait, commands, binding tables and completion fences

pub mod attributes;
pub mod descriptor;
pub mod device;
pub mod operator;
pub mod registry;
pub mod shape;
pub mod tensor;

// Re-export commonly used types
pub use attributes::AttributeMap;
pub use descriptor::{
    BinaryKind, DeviceDataType, DeviceTensorDesc, GemmBias, OperatorDescriptor, UnaryKind,
    VariadicKind, VariadicPass, device_data_type,
};
pub use device::{
    Accelerator, BindingProperties, BindingTable, BufferBinding, BufferHandle, Command,
    Completion, DeviceGraphDesc, DeviceNode, Fence, FenceSignal, GraphHandle, InputEdgeDesc,
    IntermediateEdgeDesc, OperatorHandle, OutputEdgeDesc,
};
pub use operator::Operator;
pub use registry::{OperatorFactory, OperatorRegistry};
pub use shape::{
    broadcast_shape, broadcast_strides_and_sizes, buffer_size_bytes, contiguous_strides,
};
pub use tensor::{MAX_RANK, TensorDesc};

/// Result type using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared by the compiler and execution engine.
///
/// Load-time variants abort the whole model load. Run-time variants abort a
/// single `run` call and leave the model instance usable, except
/// `DeviceHang`, which tears the instance down.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Operator '{op}' failed to initialize: {reason}")]
    OperatorInit { op: String, reason: String },

    #[error("Dangling input: tensor '{tensor}' consumed by '{node}' has no producer")]
    DanglingInput { tensor: String, node: String },

    #[error("Dangling graph: {0}")]
    DanglingGraph(String),

    #[error("Edge conflict: {0}")]
    EdgeConflict(String),

    #[error("Graph compilation failed: {0}")]
    Compile(String),

    #[error("Dynamic shape unsupported: {0}")]
    DynamicShapeUnsupported(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Binding arity error: {0}")]
    BindingArity(String),

    #[error("Binding type error: {0}")]
    BindingType(String),

    #[error("Input shapes were not set before run")]
    ShapeNotSet,

    #[error("Model instance is not configured")]
    NotConfigured,

    #[error("Device hang: {0}")]
    DeviceHang(String),

    #[error("Device error: {0}")]
    Device(String),
}

impl Error {
    /// Shorthand for an `OperatorInit` error.
    pub fn op_init(op: &str, reason: impl Into<String>) -> Self {
        Error::OperatorInit {
            op: op.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error happened while loading a model, as opposed to
    /// during a `run` call.
    pub fn is_load_error(&self) -> bool {
        !matches!(
            self,
            Error::BindingArity(_)
                | Error::BindingType(_)
                | Error::ShapeNotSet
                | Error::NotConfigured
                | Error::DeviceHang(_)
                | Error::Device(_)
        )
    }
}

impl From<basalt_model::ModelError> for Error {
    fn from(err: basalt_model::ModelError) -> Self {
        Error::InvalidModel(err.to_string())
    }
}
