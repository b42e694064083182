//! Validation helpers shared by the operator families.

use basalt_core::{Error, Result, TensorDesc};
use basalt_model::DataType;
use std::ops::RangeInclusive;

/// Check input and output counts.
pub(crate) fn check_arity(
    op: &str,
    inputs: &[TensorDesc],
    outputs: &[TensorDesc],
    input_count: RangeInclusive<usize>,
    output_count: usize,
) -> Result<()> {
    if !input_count.contains(&inputs.len()) {
        let expected = if input_count.start() == input_count.end() {
            input_count.start().to_string()
        } else if *input_count.end() == usize::MAX {
            format!("at least {}", input_count.start())
        } else {
            format!("{} to {}", input_count.start(), input_count.end())
        };
        return Err(Error::op_init(
            op,
            format!("expected {} inputs, got {}", expected, inputs.len()),
        ));
    }
    if outputs.len() != output_count {
        return Err(Error::op_init(
            op,
            format!("expected {} outputs, got {}", output_count, outputs.len()),
        ));
    }
    Ok(())
}

/// Check that `tensor` has the element type `expected`.
pub(crate) fn check_dtype(op: &str, tensor: &TensorDesc, expected: DataType) -> Result<()> {
    if tensor.dtype != expected {
        return Err(Error::op_init(
            op,
            format!(
                "tensor '{}' has type {:?}, expected {:?}",
                tensor.name, tensor.dtype, expected
            ),
        ));
    }
    Ok(())
}

/// Check that the declared output shape matches the inferred one.
pub(crate) fn check_output_shape(op: &str, output: &TensorDesc, expected: &[usize]) -> Result<()> {
    if output.shape != expected {
        return Err(Error::Shape(format!(
            "{op}: output '{}' declared as {:?}, inputs produce {:?}",
            output.name, output.shape, expected
        )));
    }
    Ok(())
}

/// Re-label attribute errors as operator initialization failures.
pub(crate) fn attr_error(op: &str) -> impl Fn(Error) -> Error + '_ {
    move |err| Error::op_init(op, err.to_string())
}
