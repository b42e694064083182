//! Variadic elementwise operator family.
//!
//! Covers: Max, Min, Sum, Mean
//!
//! A device dispatch combines at most `max_fan_in` inputs. Wider nodes are
//! split into sequential passes: the first pass combines the first
//! `max_fan_in` inputs, every later pass combines up to `max_fan_in` further
//! inputs together with the running output.

use crate::helpers::{check_arity, check_dtype, check_output_shape};
use basalt_core::{
    AttributeMap, DeviceTensorDesc, Operator, OperatorDescriptor, Result, TensorDesc,
    VariadicKind, VariadicPass, broadcast_shape,
};

/// Default number of inputs combined per dispatch.
pub const DEFAULT_MAX_FAN_IN: usize = 4;

/// Variadic elementwise operator family.
///
/// Inputs are chunked in declared order. `Mean` scales by `1/N` on the final
/// pass only.
pub struct VariadicElementwiseOp {
    kind: VariadicKind,
    max_fan_in: usize,
    descriptor: Option<OperatorDescriptor>,
}

impl VariadicElementwiseOp {
    /// Create an operator combining at most `max_fan_in` inputs per pass.
    ///
    /// Fan-in is clamped to at least 2.
    pub fn new(kind: VariadicKind, max_fan_in: usize) -> Self {
        Self {
            kind,
            max_fan_in: max_fan_in.max(2),
            descriptor: None,
        }
    }
}

/// Split `input_count` inputs into dispatch passes.
pub fn plan_passes(kind: VariadicKind, input_count: usize, max_fan_in: usize) -> Vec<VariadicPass> {
    let mut passes = Vec::new();
    let mut next = 0;
    while next < input_count || passes.is_empty() {
        let end = (next + max_fan_in).min(input_count);
        passes.push(VariadicPass {
            inputs: next..end,
            output_as_input: !passes.is_empty(),
            scale: None,
        });
        next = end;
    }

    if kind == VariadicKind::Mean {
        if let Some(last) = passes.last_mut() {
            last.scale = Some(1.0 / input_count as f32);
        }
    }
    passes
}

impl Operator for VariadicElementwiseOp {
    fn name(&self) -> &str {
        self.kind.op_type()
    }

    fn initialize(
        &mut self,
        inputs: &[TensorDesc],
        outputs: &[TensorDesc],
        _attributes: &AttributeMap<'_>,
    ) -> Result<()> {
        let name = self.kind.op_type();
        check_arity(name, inputs, outputs, 1..=usize::MAX, 1)?;
        let output = &outputs[0];

        for input in inputs {
            check_dtype(name, input, inputs[0].dtype)?;
        }
        check_dtype(name, output, inputs[0].dtype)?;

        let shapes: Vec<&[usize]> = inputs.iter().map(|t| t.shape.as_slice()).collect();
        let out_shape = broadcast_shape(&shapes)?;
        check_output_shape(name, output, &out_shape)?;

        let input_descs = inputs
            .iter()
            .map(|t| DeviceTensorDesc::broadcast(t, &out_shape))
            .collect::<Result<Vec<_>>>()?;
        let passes = plan_passes(self.kind, inputs.len(), self.max_fan_in);
        tracing::debug!(op = name, inputs = inputs.len(), passes = passes.len(), "planned variadic passes");

        self.descriptor = Some(OperatorDescriptor::Variadic {
            kind: self.kind,
            inputs: input_descs,
            output: DeviceTensorDesc::new(output)?,
            passes,
        });
        Ok(())
    }

    fn descriptor(&self) -> Option<&OperatorDescriptor> {
        self.descriptor.as_ref()
    }
}
