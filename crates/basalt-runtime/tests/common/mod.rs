//! Common test utilities for end-to-end runtime tests.
//!
//! Model builders for small graphs, plus accelerator wrappers that count
//! submissions or stop completing them.

#![allow(dead_code)]

use basalt_core::{
    Accelerator, BindingProperties, BufferHandle, Command, DeviceGraphDesc, Fence, FenceSignal,
    GraphHandle, OperatorDescriptor, OperatorHandle, Result,
};
use basalt_model::{AttributeValue, DataType, Model, Node, TensorInfo, TensorKind};
use basalt_runtime::device::HostDevice;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn input(model: &mut Model, name: &str, shape: &[usize]) -> usize {
    model.add_tensor(TensorInfo::new(name, DataType::F32, shape, TensorKind::Input))
}

pub fn output(model: &mut Model, name: &str, shape: &[usize]) -> usize {
    model.add_tensor(TensorInfo::new(name, DataType::F32, shape, TensorKind::Output))
}

pub fn intermediate(model: &mut Model, name: &str, shape: &[usize]) -> usize {
    model.add_tensor(TensorInfo::new(
        name,
        DataType::F32,
        shape,
        TensorKind::Intermediate,
    ))
}

pub fn weight(model: &mut Model, name: &str, shape: &[usize], values: &[f32]) -> usize {
    model.add_tensor(TensorInfo::weight(
        name,
        DataType::F32,
        shape,
        f32_bytes(values),
    ))
}

pub fn node(op_type: &str, name: &str, inputs: &[usize], outputs: &[usize]) -> Node {
    Node::new(op_type)
        .with_name(name)
        .with_inputs(inputs.iter().copied())
        .with_outputs(outputs.iter().copied())
}

/// Single-node model: `op_type(x0, x1, ..) -> y`.
pub fn single_op_model(op_type: &str, input_shapes: &[&[usize]], output_shape: &[usize]) -> Model {
    let mut model = Model::new();
    model.metadata.name = format!("test_{}", op_type.to_lowercase());
    let inputs: Vec<_> = input_shapes
        .iter()
        .enumerate()
        .map(|(i, shape)| input(&mut model, &format!("x{i}"), shape))
        .collect();
    let y = output(&mut model, "y", output_shape);
    model.add_node(node(op_type, op_type, &inputs, &[y]));
    model
}

/// `y = Gemm(a, b, c)` with `b` and `c` as weights.
pub fn gemm_model(
    a_shape: &[usize],
    b: (&[usize], &[f32]),
    c: (&[usize], &[f32]),
    output_shape: &[usize],
    attributes: &[(&str, AttributeValue)],
) -> Model {
    let mut model = Model::new();
    let a = input(&mut model, "a", a_shape);
    let w = weight(&mut model, "b", b.0, b.1);
    let bias = weight(&mut model, "c", c.0, c.1);
    let y = output(&mut model, "y", output_shape);
    let mut gemm = node("Gemm", "gemm", &[a, w, bias], &[y]);
    for (name, value) in attributes {
        gemm = gemm.with_attr(*name, value.clone());
    }
    model.add_node(gemm);
    model
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn read_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() <= 1e-5 * e.abs().max(1.0), "{actual:?} vs {expected:?}");
    }
}

/// Accelerator wrapper that counts submissions and can stop completing them.
pub struct RecordingDevice {
    inner: Arc<dyn Accelerator>,
    submissions: AtomicUsize,
    stalled: AtomicBool,
    /// Fences of stalled submissions, never signalled.
    held: Mutex<Vec<FenceSignal>>,
}

impl RecordingDevice {
    pub fn host() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(HostDevice::new().unwrap()),
            submissions: AtomicUsize::new(0),
            stalled: AtomicBool::new(false),
            held: Mutex::new(Vec::new()),
        })
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Leave every later submission pending forever.
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }
}

impl Accelerator for RecordingDevice {
    fn name(&self) -> &str {
        "recording"
    }

    fn create_operator(&self, desc: &OperatorDescriptor) -> Result<OperatorHandle> {
        self.inner.create_operator(desc)
    }

    fn release_operator(&self, operator: OperatorHandle) {
        self.inner.release_operator(operator)
    }

    fn compile_graph(&self, desc: &DeviceGraphDesc) -> Result<GraphHandle> {
        self.inner.compile_graph(desc)
    }

    fn binding_properties(&self, graph: GraphHandle) -> Result<BindingProperties> {
        self.inner.binding_properties(graph)
    }

    fn release_graph(&self, graph: GraphHandle) {
        self.inner.release_graph(graph)
    }

    fn create_buffer(&self, size: u64) -> Result<BufferHandle> {
        self.inner.create_buffer(size)
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        self.inner.release_buffer(buffer)
    }

    fn submit(&self, commands: Vec<Command>) -> Result<Fence> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            let (signal, fence) = Fence::channel();
            self.held.lock().unwrap().push(signal);
            return Ok(fence);
        }
        self.inner.submit(commands)
    }
}
