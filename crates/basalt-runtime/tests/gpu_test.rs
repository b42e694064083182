//! GPU device tests. They need a real adapter, so they are ignored by
//! default; run with `cargo test --features gpu -- --ignored`.

#![cfg(feature = "gpu")]

mod common;

use basalt_model::{AttributeValue, DataType, Model, TensorInfo, TensorKind};
use basalt_runtime::{DeviceKind, Error, Runtime, RuntimeConfig, Tensor};
use common::*;

async fn gpu_runtime(config: RuntimeConfig) -> Runtime {
    init_tracing();
    Runtime::with_gpu(config)
        .await
        .expect("Failed to initialize GPU runtime")
}

/// Run `model` on both devices and compare the first output.
async fn assert_matches_host(model: &Model, inputs: &[Vec<f32>], config: RuntimeConfig) {
    let gpu = gpu_runtime(config.clone()).await;
    let host = Runtime::new(config.with_device(DeviceKind::Host)).unwrap();

    let shapes: Vec<&[usize]> = model
        .inputs
        .iter()
        .map(|&i| model.tensors[i].shape.as_static().unwrap())
        .collect();
    let tensors: Vec<Tensor> = inputs
        .iter()
        .zip(&shapes)
        .map(|(data, shape)| Tensor::from_vec(data.clone(), shape).unwrap())
        .collect();

    let mut results = Vec::new();
    for runtime in [&gpu, &host] {
        let mut instance = runtime.load_model(model).unwrap();
        instance.set_input_shapes(&shapes).unwrap();
        let outputs = instance.run_tensors(&tensors).unwrap();
        results.push(outputs[0].to_vec::<f32>().unwrap());
    }
    assert_close(&results[0], &results[1]);
}

#[pollster::test]
#[ignore]
async fn test_gpu_neg() {
    let model = single_op_model("Neg", &[&[2, 3]], &[2, 3]);
    assert_matches_host(&model, &[vec![1.0, -2.0, 3.0, -4.0, 5.0, 0.0]], RuntimeConfig::default()).await;
}

#[pollster::test]
#[ignore]
async fn test_gpu_unary_with_attributes() {
    let mut model = single_op_model("HardSigmoid", &[&[5]], &[5]);
    model.nodes[0] = model.nodes[0]
        .clone()
        .with_attr("alpha", AttributeValue::Float(0.5))
        .with_attr("beta", AttributeValue::Float(0.25));
    assert_matches_host(&model, &[vec![-3.0, -0.5, 0.0, 0.5, 3.0]], RuntimeConfig::default()).await;
}

#[pollster::test]
#[ignore]
async fn test_gpu_add_broadcast() {
    let model = single_op_model("Add", &[&[1, 3], &[4, 3]], &[4, 3]);
    let b = (0..12).map(|i| i as f32).collect();
    assert_matches_host(&model, &[vec![100.0, 200.0, 300.0], b], RuntimeConfig::default()).await;
}

#[pollster::test]
#[ignore]
async fn test_gpu_mean_six_inputs() {
    let shapes: Vec<&[usize]> = vec![&[2]; 6];
    let model = single_op_model("Mean", &shapes, &[2]);
    let inputs = (1..=6).map(|i| vec![i as f32, -(i as f32)]).collect::<Vec<_>>();
    assert_matches_host(&model, &inputs, RuntimeConfig::default().with_max_variadic_fan_in(4)).await;
}

#[pollster::test]
#[ignore]
async fn test_gpu_gemm_with_weights() {
    let b: Vec<f32> = (0..12).map(|i| i as f32 * 0.5).collect();
    let model = gemm_model(
        &[3, 2],
        (&[4, 3], &b),
        (&[4], &[1.0, 2.0, 3.0, 4.0]),
        &[2, 4],
        &[
            ("transA", AttributeValue::Int(1)),
            ("transB", AttributeValue::Int(1)),
            ("alpha", AttributeValue::Float(0.5)),
        ],
    );
    assert_matches_host(&model, &[vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]], RuntimeConfig::default()).await;
}

#[pollster::test]
#[ignore]
async fn test_gpu_batched_matmul() {
    let model = single_op_model("MatMul", &[&[2, 2, 3], &[3, 2]], &[2, 2, 2]);
    let a = (1..=12).map(|i| i as f32).collect();
    assert_matches_host(&model, &[a, vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0]], RuntimeConfig::default()).await;
}

#[pollster::test]
#[ignore]
async fn test_gpu_rejects_non_float32() {
    let runtime = gpu_runtime(RuntimeConfig::default()).await;
    let mut model = Model::new();
    let x = model.add_tensor(TensorInfo::new("x", DataType::I32, &[2], TensorKind::Input));
    let y = model.add_tensor(TensorInfo::new("y", DataType::I32, &[2], TensorKind::Output));
    model.add_node(node("Neg", "neg", &[x], &[y]));

    assert!(matches!(runtime.load_model(&model), Err(Error::Type(_))));
}
