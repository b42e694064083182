//! Operator catalog for basalt.
//!
//! Every operator validates its node at load time and emits a device-neutral
//! [`basalt_core::OperatorDescriptor`]. Numeric kernels live in the
//! accelerator, never here.
//!
//! # Operator Families
//!
//! - **Unary elementwise**: Abs, Acos, ..., Sigmoid, Selu, Tanh
//! - **Binary elementwise**: Add, Sub, Mul, Div, Pow, PRelu, Mod
//! - **Variadic elementwise**: Max, Min, Sum, Mean
//!
//! # Individual Operators
//!
//! - Matrix operations (Gemm, MatMul)

pub mod families;
pub mod operators;

mod helpers;
mod registry;

// Re-export operator types
pub use families::{
    BinaryElementwiseOp, DEFAULT_MAX_FAN_IN, UnaryElementwiseOp, UnaryParams,
    VariadicElementwiseOp, plan_passes,
};
pub use operators::{GemmOp, MatMulOp};
pub use registry::{CatalogOptions, core_operator_registry};
