//! General matrix multiplication.

use crate::helpers::{attr_error, check_arity, check_dtype, check_output_shape};
use basalt_core::shape::is_unidirectional_broadcast;
use basalt_core::{
    AttributeMap, DeviceTensorDesc, Error, GemmBias, Operator, OperatorDescriptor, Result,
    TensorDesc,
};

/// Gemm operator.
///
/// `Y = alpha * A' * B' + beta * C`, where `A'`/`B'` are optionally
/// transposed rank-2 matrices and `C` is an optional bias broadcastable to
/// `[M, N]`.
///
/// **Attributes:** `alpha` (1.0), `beta` (1.0), `transA` (0), `transB` (0).
///
/// A bias with a single element is passed to the device as a scalar bias,
/// anything else as a per-element tensor.
#[derive(Default)]
pub struct GemmOp {
    descriptor: Option<OperatorDescriptor>,
}

impl GemmOp {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Operator for GemmOp {
    fn name(&self) -> &str {
        "Gemm"
    }

    fn initialize(
        &mut self,
        inputs: &[TensorDesc],
        outputs: &[TensorDesc],
        attributes: &AttributeMap<'_>,
    ) -> Result<()> {
        check_arity("Gemm", inputs, outputs, 2..=3, 1)?;
        let (a, b, output) = (&inputs[0], &inputs[1], &outputs[0]);
        let c = inputs.get(2);

        for tensor in inputs.iter().chain(outputs) {
            check_dtype("Gemm", tensor, a.dtype)?;
        }

        let alpha = attributes
            .get_or_default("alpha", 1.0f32)
            .map_err(attr_error("Gemm"))?;
        let beta = attributes
            .get_or_default("beta", 1.0f32)
            .map_err(attr_error("Gemm"))?;
        let trans_a = attributes
            .flag_or_default("transA", false)
            .map_err(attr_error("Gemm"))?;
        let trans_b = attributes
            .flag_or_default("transB", false)
            .map_err(attr_error("Gemm"))?;

        if a.rank() != 2 || b.rank() != 2 {
            return Err(Error::Shape(format!(
                "Gemm: A {:?} and B {:?} must be rank 2",
                a.shape, b.shape
            )));
        }
        let (m, k) = if trans_a {
            (a.shape[1], a.shape[0])
        } else {
            (a.shape[0], a.shape[1])
        };
        let (kb, n) = if trans_b {
            (b.shape[1], b.shape[0])
        } else {
            (b.shape[0], b.shape[1])
        };
        if k != kb {
            return Err(Error::Shape(format!(
                "Gemm: inner dimensions differ ({k} vs {kb}) for A {:?} and B {:?}",
                a.shape, b.shape
            )));
        }
        let out_shape = [m, n];
        check_output_shape("Gemm", output, &out_shape)?;

        let (c_desc, bias) = match c {
            None => (None, GemmBias::NoBias),
            Some(c) => {
                if !is_unidirectional_broadcast(&c.shape, &out_shape) {
                    return Err(Error::Shape(format!(
                        "Gemm: bias {:?} does not broadcast to {:?}",
                        c.shape, out_shape
                    )));
                }
                let bias = if c.volume() == 1 {
                    GemmBias::Scalar
                } else {
                    GemmBias::Tensor
                };
                (Some(DeviceTensorDesc::broadcast(c, &out_shape)?), bias)
            }
        };

        self.descriptor = Some(OperatorDescriptor::Gemm {
            a: DeviceTensorDesc::new(a)?,
            b: DeviceTensorDesc::new(b)?,
            c: c_desc,
            output: DeviceTensorDesc::new(output)?,
            alpha,
            beta,
            trans_a,
            trans_b,
            bias,
        });
        Ok(())
    }

    fn descriptor(&self) -> Option<&OperatorDescriptor> {
        self.descriptor.as_ref()
    }
}
