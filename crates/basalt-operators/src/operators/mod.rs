//! Operators that do not fit a family.

pub mod gemm;
pub mod matmul;

pub use gemm::GemmOp;
pub use matmul::MatMulOp;
