//! Shape and attribute contracts of the catalog operators.

mod common;

use basalt_core::{BinaryKind, Error, GemmBias, OperatorDescriptor, UnaryKind};
use basalt_model::AttributeValue;
use basalt_operators::CatalogOptions;
use common::{descriptor, f32_tensor, init_op, init_op_with};

#[test]
fn test_neg_keeps_shape_and_type() {
    let op = init_op("Neg", &[f32_tensor("x", &[2, 3])], &[f32_tensor("y", &[2, 3])], &[]).unwrap();

    match descriptor(op.as_ref()) {
        OperatorDescriptor::Unary {
            kind,
            input,
            output,
            ..
        } => {
            assert_eq!(*kind, UnaryKind::Neg);
            assert_eq!(input.sizes, vec![2, 3]);
            assert_eq!(output.sizes, vec![2, 3]);
            assert_eq!(output.total_size_bytes, 24);
        }
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_add_row_broadcast() {
    let op = init_op(
        "Add",
        &[f32_tensor("a", &[1, 3]), f32_tensor("b", &[4, 3])],
        &[f32_tensor("y", &[4, 3])],
        &[],
    )
    .unwrap();

    let OperatorDescriptor::Binary { kind, a, b, output } = descriptor(op.as_ref()) else {
        panic!("expected binary descriptor");
    };
    assert_eq!(*kind, BinaryKind::Add);
    assert_eq!(a.sizes, vec![4, 3]);
    assert_eq!(a.effective_strides()[0], 0);
    assert_eq!(b.effective_strides(), vec![3, 1]);
    assert_eq!(output.sizes, vec![4, 3]);
}

#[test]
fn test_mean_six_inputs_two_passes() {
    let inputs: Vec<_> = (0..6).map(|i| f32_tensor(&format!("x{i}"), &[2])).collect();
    let op = init_op_with(
        &CatalogOptions { max_fan_in: 4 },
        "Mean",
        &inputs,
        &[f32_tensor("y", &[2])],
        &[],
    )
    .unwrap();

    let OperatorDescriptor::Variadic { passes, .. } = descriptor(op.as_ref()) else {
        panic!("expected variadic descriptor");
    };
    assert_eq!(passes.len(), 2);
    assert!(!passes[0].output_as_input);
    assert_eq!(passes[0].scale, None);
    assert!(passes[1].output_as_input);
    assert_eq!(passes[1].scale, Some(1.0 / 6.0));
}

#[test]
fn test_sum_never_scales() {
    let inputs: Vec<_> = (0..6).map(|i| f32_tensor(&format!("x{i}"), &[2])).collect();
    let op = init_op("Sum", &inputs, &[f32_tensor("y", &[2])], &[]).unwrap();

    let OperatorDescriptor::Variadic { passes, .. } = descriptor(op.as_ref()) else {
        panic!("expected variadic descriptor");
    };
    assert!(passes.iter().all(|p| p.scale.is_none()));
}

fn gemm_bias(inputs: &[basalt_core::TensorDesc]) -> GemmBias {
    let op = init_op("Gemm", inputs, &[f32_tensor("y", &[2, 4])], &[]).unwrap();
    match descriptor(op.as_ref()) {
        OperatorDescriptor::Gemm { bias, .. } => *bias,
        other => panic!("unexpected descriptor {other:?}"),
    }
}

#[test]
fn test_gemm_bias_flags() {
    let a = f32_tensor("a", &[2, 3]);
    let b = f32_tensor("b", &[3, 4]);

    assert_eq!(gemm_bias(&[a.clone(), b.clone()]), GemmBias::NoBias);
    assert_eq!(
        gemm_bias(&[a.clone(), b.clone(), f32_tensor("c", &[2, 4])]),
        GemmBias::Tensor
    );
    assert_eq!(
        gemm_bias(&[a.clone(), b.clone(), f32_tensor("c", &[4])]),
        GemmBias::Tensor
    );
    assert_eq!(gemm_bias(&[a.clone(), b.clone(), f32_tensor("c", &[1])]), GemmBias::Scalar);
    assert_eq!(gemm_bias(&[a, b, f32_tensor("c", &[])]), GemmBias::Scalar);
}

#[test]
fn test_gemm_transpose_attributes() {
    let op = init_op(
        "Gemm",
        &[f32_tensor("a", &[3, 2]), f32_tensor("b", &[4, 3])],
        &[f32_tensor("y", &[2, 4])],
        &[
            ("transA", AttributeValue::Int(1)),
            ("transB", AttributeValue::Int(1)),
            ("alpha", AttributeValue::Float(0.5)),
        ],
    )
    .unwrap();

    let OperatorDescriptor::Gemm {
        trans_a,
        trans_b,
        alpha,
        beta,
        ..
    } = descriptor(op.as_ref())
    else {
        panic!("expected gemm descriptor");
    };
    assert!(*trans_a && *trans_b);
    assert_eq!(*alpha, 0.5);
    assert_eq!(*beta, 1.0);
}

#[test]
fn test_gemm_rejects_bad_bias() {
    let result = init_op(
        "Gemm",
        &[f32_tensor("a", &[2, 3]), f32_tensor("b", &[3, 4]), f32_tensor("c", &[3])],
        &[f32_tensor("y", &[2, 4])],
        &[],
    );
    assert!(matches!(result, Err(Error::Shape(_))));
}

#[test]
fn test_matmul_is_biasless_gemm() {
    let op = init_op(
        "MatMul",
        &[f32_tensor("a", &[2, 2, 3]), f32_tensor("b", &[3, 5])],
        &[f32_tensor("y", &[2, 2, 5])],
        &[],
    )
    .unwrap();

    let OperatorDescriptor::Gemm {
        a,
        b,
        c,
        alpha,
        beta,
        bias,
        ..
    } = descriptor(op.as_ref())
    else {
        panic!("expected gemm descriptor");
    };
    assert!(c.is_none());
    assert_eq!((*alpha, *beta, *bias), (1.0, 0.0, GemmBias::NoBias));
    assert!(a.strides.is_none());
    assert_eq!(b.sizes, vec![2, 3, 5]);
    assert_eq!(b.strides, Some(vec![0, 5, 1]));
}

#[test]
fn test_matmul_rejects_wrong_output() {
    let result = init_op(
        "MatMul",
        &[f32_tensor("a", &[2, 3]), f32_tensor("b", &[3, 5])],
        &[f32_tensor("y", &[2, 3])],
        &[],
    );
    assert!(matches!(result, Err(Error::Shape(_))));
}
