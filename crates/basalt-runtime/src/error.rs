//! Error types for the runtime crate.
//!
//! The runtime shares [`basalt_core::Error`] with the compiler. This module
//! adds the numeric [`ResultCode`] reported for a `run` or load call.

pub use basalt_core::{Error, Result};

/// Stable numeric code for the outcome of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    Ok = 0,
    Shape = 1,
    Type = 2,
    UnknownOperator = 3,
    OperatorInit = 4,
    DanglingInput = 5,
    DanglingGraph = 6,
    EdgeConflict = 7,
    Compile = 8,
    DynamicShapeUnsupported = 9,
    InvalidModel = 10,
    BindingArity = 11,
    BindingType = 12,
    ShapeNotSet = 13,
    NotConfigured = 14,
    DeviceHang = 15,
    Device = 16,
}

impl ResultCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl From<&Error> for ResultCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Shape(_) => ResultCode::Shape,
            Error::Type(_) => ResultCode::Type,
            Error::UnknownOperator(_) => ResultCode::UnknownOperator,
            Error::OperatorInit { .. } => ResultCode::OperatorInit,
            Error::DanglingInput { .. } => ResultCode::DanglingInput,
            Error::DanglingGraph(_) => ResultCode::DanglingGraph,
            Error::EdgeConflict(_) => ResultCode::EdgeConflict,
            Error::Compile(_) => ResultCode::Compile,
            Error::DynamicShapeUnsupported(_) => ResultCode::DynamicShapeUnsupported,
            Error::InvalidModel(_) => ResultCode::InvalidModel,
            Error::BindingArity(_) => ResultCode::BindingArity,
            Error::BindingType(_) => ResultCode::BindingType,
            Error::ShapeNotSet => ResultCode::ShapeNotSet,
            Error::NotConfigured => ResultCode::NotConfigured,
            Error::DeviceHang(_) => ResultCode::DeviceHang,
            Error::Device(_) => ResultCode::Device,
        }
    }
}

impl<T> From<&Result<T>> for ResultCode {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ResultCode::Ok,
            Err(err) => err.into(),
        }
    }
}
