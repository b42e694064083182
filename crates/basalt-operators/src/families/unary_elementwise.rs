//! Unary elementwise operator family.
//!
//! Covers every [`UnaryKind`]: Abs, Acos, ..., Tanh.

use crate::helpers::{attr_error, check_arity, check_dtype, check_output_shape};
use basalt_core::{
    AttributeMap, DeviceTensorDesc, Operator, OperatorDescriptor, Result, TensorDesc, UnaryKind,
};
use basalt_model::DataType;

/// Default scalar parameters of a unary operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnaryParams {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

impl UnaryParams {
    /// Defaults for `kind`, before attribute overrides.
    pub fn defaults(kind: UnaryKind) -> Self {
        let (alpha, beta, gamma) = match kind {
            UnaryKind::Elu => (1.0, 0.0, 0.0),
            UnaryKind::Selu => (1.673_263_192_176_818_847_656_25, 0.0, 1.050_701_022_148_132_324_218_75),
            UnaryKind::HardSigmoid => (0.2, 0.5, 0.0),
            UnaryKind::LeakyRelu => (0.01, 0.0, 0.0),
            _ => (0.0, 0.0, 0.0),
        };
        Self { alpha, beta, gamma }
    }
}

/// Unary elementwise operator family.
///
/// All unary elementwise operations share the same structure:
/// - one input and one output of identical shape
/// - output type equal to the input type, except `IsInf`/`IsNaN` which
///   produce booleans
/// - optional `alpha`/`beta`/`gamma` float attributes overriding the
///   per-kind defaults
pub struct UnaryElementwiseOp {
    kind: UnaryKind,
    descriptor: Option<OperatorDescriptor>,
}

impl UnaryElementwiseOp {
    pub fn new(kind: UnaryKind) -> Self {
        Self {
            kind,
            descriptor: None,
        }
    }

    fn produces_bool(&self) -> bool {
        matches!(self.kind, UnaryKind::IsInf | UnaryKind::IsNan)
    }
}

impl Operator for UnaryElementwiseOp {
    fn name(&self) -> &str {
        self.kind.op_type()
    }

    fn initialize(
        &mut self,
        inputs: &[TensorDesc],
        outputs: &[TensorDesc],
        attributes: &AttributeMap<'_>,
    ) -> Result<()> {
        let name = self.kind.op_type();
        check_arity(name, inputs, outputs, 1..=1, 1)?;
        let (input, output) = (&inputs[0], &outputs[0]);

        check_output_shape(name, output, &input.shape)?;
        let output_dtype = if self.produces_bool() {
            DataType::Bool
        } else {
            input.dtype
        };
        check_dtype(name, output, output_dtype)?;

        let defaults = UnaryParams::defaults(self.kind);
        let alpha = attributes
            .get_or_default("alpha", defaults.alpha)
            .map_err(attr_error(name))?;
        let beta = attributes
            .get_or_default("beta", defaults.beta)
            .map_err(attr_error(name))?;
        let gamma = attributes
            .get_or_default("gamma", defaults.gamma)
            .map_err(attr_error(name))?;

        self.descriptor = Some(OperatorDescriptor::Unary {
            kind: self.kind,
            input: DeviceTensorDesc::new(input)?,
            output: DeviceTensorDesc::new(output)?,
            alpha,
            beta,
            gamma,
        });
        Ok(())
    }

    fn descriptor(&self) -> Option<&OperatorDescriptor> {
        self.descriptor.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_core::Error;
    use basalt_model::AttributeValue;
    use std::collections::HashMap;

    fn init(
        kind: UnaryKind,
        input: TensorDesc,
        output: TensorDesc,
        attrs: &HashMap<String, AttributeValue>,
    ) -> Result<UnaryElementwiseOp> {
        let mut op = UnaryElementwiseOp::new(kind);
        op.initialize(&[input], &[output], &AttributeMap::new(attrs))?;
        Ok(op)
    }

    fn params(op: &UnaryElementwiseOp) -> (f32, f32, f32) {
        match op.descriptor() {
            Some(OperatorDescriptor::Unary {
                alpha, beta, gamma, ..
            }) => (*alpha, *beta, *gamma),
            other => panic!("unexpected descriptor {:?}", other),
        }
    }

    #[test]
    fn test_selu_defaults() {
        let x = TensorDesc::new("x", DataType::F32, &[4]);
        let op = init(UnaryKind::Selu, x.clone(), x, &HashMap::new()).unwrap();

        let (alpha, _, gamma) = params(&op);
        assert_eq!(alpha, 1.673_263_192_176_818_847_656_25);
        assert_eq!(gamma, 1.050_701_022_148_132_324_218_75);
    }

    #[test]
    fn test_attribute_overrides_default() {
        let x = TensorDesc::new("x", DataType::F32, &[4]);
        let attrs = HashMap::from([("alpha".to_string(), AttributeValue::Float(0.3))]);
        let op = init(UnaryKind::LeakyRelu, x.clone(), x, &attrs).unwrap();

        assert_eq!(params(&op).0, 0.3);
    }

    #[test]
    fn test_bad_attribute_type_is_init_error() {
        let x = TensorDesc::new("x", DataType::F32, &[4]);
        let attrs = HashMap::from([("alpha".to_string(), AttributeValue::Ints(vec![1]))]);
        let result = init(UnaryKind::Elu, x.clone(), x, &attrs);

        assert!(matches!(result, Err(Error::OperatorInit { .. })));
    }

    #[test]
    fn test_shape_mismatch() {
        let x = TensorDesc::new("x", DataType::F32, &[2, 3]);
        let y = TensorDesc::new("y", DataType::F32, &[3, 2]);
        let result = init(UnaryKind::Neg, x, y, &HashMap::new());

        assert!(matches!(result, Err(Error::Shape(_))));
    }

    #[test]
    fn test_is_nan_outputs_bool() {
        let x = TensorDesc::new("x", DataType::F16, &[3]);
        let y = TensorDesc::new("y", DataType::Bool, &[3]);
        assert!(init(UnaryKind::IsNan, x.clone(), y, &HashMap::new()).is_ok());

        let wrong = TensorDesc::new("y", DataType::F16, &[3]);
        assert!(init(UnaryKind::IsNan, x, wrong, &HashMap::new()).is_err());
    }

    #[test]
    fn test_unrepresentable_type() {
        let x = TensorDesc::new("x", DataType::BF16, &[3]);
        let result = init(UnaryKind::Abs, x.clone(), x, &HashMap::new());

        assert!(matches!(result, Err(Error::Type(_))));
    }
}
