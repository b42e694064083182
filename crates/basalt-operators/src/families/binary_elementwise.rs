//! Binary elementwise operator family.
//!
//! Covers: Add, Sub, Mul, Div, Pow, PRelu, Mod

use crate::helpers::{attr_error, check_arity, check_dtype, check_output_shape};
use basalt_core::shape::is_unidirectional_broadcast;
use basalt_core::{
    AttributeMap, BinaryKind, DeviceTensorDesc, Error, Operator, OperatorDescriptor, Result,
    TensorDesc, broadcast_shape, device_data_type,
};

/// Binary elementwise operator family.
///
/// The output shape is the broadcast hull of both inputs. Each input is
/// described against the output shape, so broadcast dimensions reach the
/// device as zero strides.
pub struct BinaryElementwiseOp {
    name: &'static str,
    kind: Option<BinaryKind>,
    descriptor: Option<OperatorDescriptor>,
}

impl BinaryElementwiseOp {
    fn with_kind(kind: BinaryKind) -> Self {
        Self {
            name: kind.op_type(),
            kind: Some(kind),
            descriptor: None,
        }
    }

    /// Create an Add operator.
    pub fn add() -> Self {
        Self::with_kind(BinaryKind::Add)
    }

    /// Create a Sub operator.
    pub fn sub() -> Self {
        Self::with_kind(BinaryKind::Sub)
    }

    /// Create a Mul operator.
    pub fn mul() -> Self {
        Self::with_kind(BinaryKind::Mul)
    }

    /// Create a Div operator.
    pub fn div() -> Self {
        Self::with_kind(BinaryKind::Div)
    }

    /// Create a Pow operator.
    pub fn pow() -> Self {
        Self::with_kind(BinaryKind::Pow)
    }

    /// Create a PRelu operator.
    pub fn prelu() -> Self {
        Self::with_kind(BinaryKind::Prelu)
    }

    /// Create a Mod operator. The `fmod` attribute picks the variant at
    /// initialization.
    pub fn modulo() -> Self {
        Self {
            name: "Mod",
            kind: None,
            descriptor: None,
        }
    }

    fn resolve_kind(&self, attributes: &AttributeMap<'_>) -> Result<BinaryKind> {
        match self.kind {
            Some(kind) => Ok(kind),
            None => {
                let fmod = attributes
                    .flag_or_default("fmod", false)
                    .map_err(attr_error(self.name))?;
                Ok(BinaryKind::Mod { fmod })
            }
        }
    }
}

impl Operator for BinaryElementwiseOp {
    fn name(&self) -> &str {
        self.name
    }

    fn initialize(
        &mut self,
        inputs: &[TensorDesc],
        outputs: &[TensorDesc],
        attributes: &AttributeMap<'_>,
    ) -> Result<()> {
        let name = self.name;
        check_arity(name, inputs, outputs, 2..=2, 1)?;
        let (a, b, output) = (&inputs[0], &inputs[1], &outputs[0]);
        let kind = self.resolve_kind(attributes)?;

        // Pow may raise to an exponent of a different type.
        if kind != BinaryKind::Pow {
            check_dtype(name, b, a.dtype)?;
        }
        check_dtype(name, output, a.dtype)?;

        if kind == (BinaryKind::Mod { fmod: false })
            && device_data_type(a.dtype).is_some_and(|t| t.is_float())
        {
            return Err(Error::op_init(name, "fmod must be 1 for floating-point inputs"));
        }

        if kind == BinaryKind::Prelu && !is_unidirectional_broadcast(&b.shape, &a.shape) {
            return Err(Error::Shape(format!(
                "PRelu: slope {:?} does not broadcast to input {:?}",
                b.shape, a.shape
            )));
        }

        let out_shape = broadcast_shape(&[&a.shape, &b.shape])?;
        check_output_shape(name, output, &out_shape)?;

        self.descriptor = Some(OperatorDescriptor::Binary {
            kind,
            a: DeviceTensorDesc::broadcast(a, &out_shape)?,
            b: DeviceTensorDesc::broadcast(b, &out_shape)?,
            output: DeviceTensorDesc::new(output)?,
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
    use basalt_model::{AttributeValue, DataType};
    use std::collections::HashMap;

    fn init(op: &mut BinaryElementwiseOp, a: &[usize], b: &[usize], out: &[usize]) -> Result<()> {
        op.initialize(
            &[
                TensorDesc::new("a", DataType::F32, a),
                TensorDesc::new("b", DataType::F32, b),
            ],
            &[TensorDesc::new("y", DataType::F32, out)],
            &AttributeMap::new(&HashMap::new()),
        )
    }

    #[test]
    fn test_add_broadcast_strides() {
        let mut op = BinaryElementwiseOp::add();
        init(&mut op, &[1, 3], &[4, 3], &[4, 3]).unwrap();

        let Some(OperatorDescriptor::Binary { a, b, output, .. }) = op.descriptor() else {
            panic!("expected binary descriptor");
        };
        assert_eq!(a.sizes, vec![4, 3]);
        assert_eq!(a.strides, Some(vec![0, 1]));
        assert!(b.strides.is_none());
        assert_eq!(output.sizes, vec![4, 3]);
    }

    #[test]
    fn test_output_must_be_broadcast_hull() {
        let mut op = BinaryElementwiseOp::mul();
        let result = init(&mut op, &[1, 3], &[4, 3], &[1, 3]);
        assert!(matches!(result, Err(Error::Shape(_))));
    }

    #[test]
    fn test_incompatible_shapes() {
        let mut op = BinaryElementwiseOp::sub();
        assert!(matches!(
            init(&mut op, &[2, 3], &[2, 4], &[2, 4]),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn test_mod_reads_fmod() {
        let mut op = BinaryElementwiseOp::modulo();
        let attrs = HashMap::from([("fmod".to_string(), AttributeValue::Int(1))]);
        op.initialize(
            &[
                TensorDesc::new("a", DataType::F32, &[2]),
                TensorDesc::new("b", DataType::F32, &[2]),
            ],
            &[TensorDesc::new("y", DataType::F32, &[2])],
            &AttributeMap::new(&attrs),
        )
        .unwrap();

        assert!(matches!(
            op.descriptor(),
            Some(OperatorDescriptor::Binary {
                kind: BinaryKind::Mod { fmod: true },
                ..
            })
        ));
    }

    #[test]
    fn test_float_mod_requires_fmod() {
        let mut op = BinaryElementwiseOp::modulo();
        let result = init(&mut op, &[2], &[2], &[2]);
        assert!(matches!(result, Err(Error::OperatorInit { .. })));
    }

    #[test]
    fn test_prelu_slope_is_unidirectional() {
        let mut op = BinaryElementwiseOp::prelu();
        assert!(init(&mut op, &[2, 3], &[3], &[2, 3]).is_ok());

        let mut op = BinaryElementwiseOp::prelu();
        assert!(init(&mut op, &[3], &[2, 3], &[2, 3]).is_err());
    }

    #[test]
    fn test_mismatched_input_types() {
        let mut op = BinaryElementwiseOp::add();
        let result = op.initialize(
            &[
                TensorDesc::new("a", DataType::F32, &[2]),
                TensorDesc::new("b", DataType::I32, &[2]),
            ],
            &[TensorDesc::new("y", DataType::F32, &[2])],
            &AttributeMap::new(&HashMap::new()),
        );
        assert!(matches!(result, Err(Error::OperatorInit { .. })));
    }
}
