//! Common test utilities for compiler tests.

use basalt_core::{
    Accelerator, BindingProperties, BufferHandle, Command, DeviceGraphDesc, Error, Fence,
    GraphHandle, OperatorDescriptor, OperatorHandle, Result,
};
use basalt_model::{DataType, Model, Node, TensorInfo, TensorKind};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Accelerator that records what the compiler asks of it.
#[derive(Default)]
pub struct MockAccelerator {
    pub state: Mutex<MockState>,
    /// Fail `compile_graph` with this message.
    pub reject_graph: Option<String>,
}

#[derive(Default)]
pub struct MockState {
    next_handle: u64,
    pub live_operators: Vec<OperatorHandle>,
    pub live_graphs: Vec<GraphHandle>,
    pub descriptors: Vec<String>,
    pub graphs: Vec<DeviceGraphDesc>,
}

impl MockState {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl MockAccelerator {
    pub fn rejecting(reason: &str) -> Self {
        Self {
            reject_graph: Some(reason.to_string()),
            ..Default::default()
        }
    }
}

impl Accelerator for MockAccelerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn create_operator(&self, desc: &OperatorDescriptor) -> Result<OperatorHandle> {
        let mut state = self.state.lock().unwrap();
        let handle = OperatorHandle(state.next());
        state.live_operators.push(handle);
        state.descriptors.push(desc.label());
        Ok(handle)
    }

    fn release_operator(&self, operator: OperatorHandle) {
        self.state
            .lock()
            .unwrap()
            .live_operators
            .retain(|&h| h != operator);
    }

    fn compile_graph(&self, desc: &DeviceGraphDesc) -> Result<GraphHandle> {
        if let Some(reason) = &self.reject_graph {
            return Err(Error::Device(reason.clone()));
        }
        let mut state = self.state.lock().unwrap();
        let handle = GraphHandle(state.next());
        state.live_graphs.push(handle);
        state.graphs.push(desc.clone());
        Ok(handle)
    }

    fn binding_properties(&self, _graph: GraphHandle) -> Result<BindingProperties> {
        Ok(BindingProperties::default())
    }

    fn release_graph(&self, graph: GraphHandle) {
        self.state
            .lock()
            .unwrap()
            .live_graphs
            .retain(|&h| h != graph);
    }

    fn create_buffer(&self, _size: u64) -> Result<BufferHandle> {
        Err(Error::Device("mock has no buffers".to_string()))
    }

    fn release_buffer(&self, _buffer: BufferHandle) {}

    fn submit(&self, _commands: Vec<Command>) -> Result<Fence> {
        Err(Error::Device("mock cannot execute".to_string()))
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_target(false)
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
    let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    model.add_tensor(TensorInfo::weight(name, DataType::F32, shape, data))
}

pub fn node(op_type: &str, name: &str, inputs: &[usize], outputs: &[usize]) -> Node {
    Node::new(op_type)
        .with_name(name)
        .with_inputs(inputs.iter().copied())
        .with_outputs(outputs.iter().copied())
}
