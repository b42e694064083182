//! Batched matrix multiplication.

use crate::helpers::{check_arity, check_dtype, check_output_shape};
use basalt_core::{
    AttributeMap, DeviceTensorDesc, Error, GemmBias, Operator, OperatorDescriptor, Result,
    TensorDesc, broadcast_shape,
};

/// MatMul operator.
///
/// Matrix product with NumPy semantics, lowered to a GEMM with `alpha = 1`,
/// `beta = 0` and no bias.
///
/// **Behavior:**
/// - Rank-2 inputs: plain matrix product `[M, K] x [K, N] -> [M, N]`
/// - Higher ranks: leading dimensions are batch dimensions and broadcast
///   against each other
/// - A rank-1 `A` is promoted to `[1, K]`, a rank-1 `B` to `[K, 1]`; the
///   promoted dimension is removed from the output shape
#[derive(Default)]
pub struct MatMulOp {
    descriptor: Option<OperatorDescriptor>,
}

impl MatMulOp {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shapes of a MatMul after rank-1 promotion.
#[derive(Debug, PartialEq)]
struct MatMulShapes {
    a: Vec<usize>,
    b: Vec<usize>,
    batch: Vec<usize>,
    m: usize,
    k: usize,
    n: usize,
    /// Output shape as declared by the model (promoted dims dropped).
    output: Vec<usize>,
}

fn infer_shapes(a: &[usize], b: &[usize]) -> Result<MatMulShapes> {
    if a.is_empty() || b.is_empty() {
        return Err(Error::Shape(format!(
            "MatMul: inputs must have rank >= 1, got {:?} and {:?}",
            a, b
        )));
    }
    let a_promoted = if a.len() == 1 { vec![1, a[0]] } else { a.to_vec() };
    let b_promoted = if b.len() == 1 { vec![b[0], 1] } else { b.to_vec() };

    let (a_batch, a_mat) = a_promoted.split_at(a_promoted.len() - 2);
    let (b_batch, b_mat) = b_promoted.split_at(b_promoted.len() - 2);
    let (m, k, kb, n) = (a_mat[0], a_mat[1], b_mat[0], b_mat[1]);
    if k != kb {
        return Err(Error::Shape(format!(
            "MatMul: inner dimensions differ ({k} vs {kb}) for {:?} x {:?}",
            a, b
        )));
    }

    let batch = broadcast_shape(&[a_batch, b_batch])?;
    let mut output = batch.clone();
    if a.len() > 1 {
        output.push(m);
    }
    if b.len() > 1 {
        output.push(n);
    }

    Ok(MatMulShapes {
        a: a_promoted,
        b: b_promoted,
        batch,
        m,
        k,
        n,
        output,
    })
}

fn with_shape(tensor: &TensorDesc, shape: &[usize]) -> TensorDesc {
    TensorDesc {
        shape: shape.to_vec(),
        ..tensor.clone()
    }
}

impl Operator for MatMulOp {
    fn name(&self) -> &str {
        "MatMul"
    }

    fn initialize(
        &mut self,
        inputs: &[TensorDesc],
        outputs: &[TensorDesc],
        _attributes: &AttributeMap<'_>,
    ) -> Result<()> {
        check_arity("MatMul", inputs, outputs, 2..=2, 1)?;
        let (a, b, output) = (&inputs[0], &inputs[1], &outputs[0]);
        check_dtype("MatMul", b, a.dtype)?;
        check_dtype("MatMul", output, a.dtype)?;

        let shapes = infer_shapes(&a.shape, &b.shape)?;
        check_output_shape("MatMul", output, &shapes.output)?;

        let target = |rows: usize, cols: usize| {
            let mut dims = shapes.batch.clone();
            dims.extend([rows, cols]);
            dims
        };
        let a_desc =
            DeviceTensorDesc::broadcast(&with_shape(a, &shapes.a), &target(shapes.m, shapes.k))?;
        let b_desc =
            DeviceTensorDesc::broadcast(&with_shape(b, &shapes.b), &target(shapes.k, shapes.n))?;
        let out_desc = DeviceTensorDesc::new(&with_shape(output, &target(shapes.m, shapes.n)))?;

        self.descriptor = Some(OperatorDescriptor::Gemm {
            a: a_desc,
            b: b_desc,
            c: None,
            output: out_desc,
            alpha: 1.0,
            beta: 0.0,
            trans_a: false,
            trans_b: false,
            bias: GemmBias::NoBias,
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

    #[test]
    fn test_plain_matrix_shapes() {
        let shapes = infer_shapes(&[2, 3], &[3, 4]).unwrap();
        assert_eq!(shapes.output, vec![2, 4]);
        assert!(shapes.batch.is_empty());
    }

    #[test]
    fn test_batch_broadcast() {
        let shapes = infer_shapes(&[5, 1, 2, 3], &[4, 3, 6]).unwrap();
        assert_eq!(shapes.batch, vec![5, 4]);
        assert_eq!(shapes.output, vec![5, 4, 2, 6]);
    }

    #[test]
    fn test_vector_promotion() {
        let shapes = infer_shapes(&[3], &[2, 3, 4]).unwrap();
        assert_eq!(shapes.a, vec![1, 3]);
        assert_eq!(shapes.output, vec![2, 4]);

        let shapes = infer_shapes(&[2, 3], &[3]).unwrap();
        assert_eq!(shapes.output, vec![2]);

        let shapes = infer_shapes(&[3], &[3]).unwrap();
        assert!(shapes.output.is_empty());
    }

    #[test]
    fn test_inner_dimension_mismatch() {
        assert!(matches!(infer_shapes(&[2, 3], &[4, 5]), Err(Error::Shape(_))));
        assert!(infer_shapes(&[], &[3]).is_err());
    }
}
