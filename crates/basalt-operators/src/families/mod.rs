//! Collapsed operator families that share validation and descriptor code.
//!
//! Each family parameterizes only the operator kind; arity, broadcast and
//! attribute handling live in one place.

pub mod binary_elementwise;
pub mod unary_elementwise;
pub mod variadic_elementwise;

pub use binary_elementwise::BinaryElementwiseOp;
pub use unary_elementwise::{UnaryElementwiseOp, UnaryParams};
pub use variadic_elementwise::{DEFAULT_MAX_FAN_IN, VariadicElementwiseOp, plan_passes};
