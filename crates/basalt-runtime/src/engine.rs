//! Model instances and synchronous execution.

use crate::binder::ResourceBinder;
use crate::buffer::DeviceBuffer;
use crate::recorder::CommandRecorder;
use crate::tensor::Tensor;
use basalt_compiler::CompiledGraph;
use basalt_core::{Accelerator, Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a [`ModelInstance`].
///
/// `Unconfigured → Compiled → Idle ⇄ Dispatching`. A device hang tears the
/// instance back down to `Unconfigured`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    Unconfigured,
    /// Graph compiled, resources not yet initialized.
    Compiled,
    Idle,
    Dispatching,
}

/// Caller-owned host memory.
#[derive(Debug)]
pub enum HostMemory<'a> {
    Shared(&'a [u8]),
    Exclusive(&'a mut [u8]),
}

impl HostMemory<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            HostMemory::Shared(data) => data,
            HostMemory::Exclusive(data) => data,
        }
    }
}

/// Where the data of a bound tensor lives.
#[derive(Debug)]
pub enum BindingLocation<'a> {
    Cpu(HostMemory<'a>),
    /// A buffer on the instance's device, for tensors kept resident across
    /// runs.
    Device(&'a DeviceBuffer),
}

/// Data bound to one model input or output.
#[derive(Debug)]
pub struct Binding<'a> {
    /// Index of the tensor in the model's tensor table.
    pub tensor_index: usize,
    pub location: BindingLocation<'a>,
}

impl<'a> Binding<'a> {
    pub fn cpu(tensor_index: usize, data: &'a [u8]) -> Self {
        Self {
            tensor_index,
            location: BindingLocation::Cpu(HostMemory::Shared(data)),
        }
    }

    pub fn cpu_mut(tensor_index: usize, data: &'a mut [u8]) -> Self {
        Self {
            tensor_index,
            location: BindingLocation::Cpu(HostMemory::Exclusive(data)),
        }
    }

    pub fn device(tensor_index: usize, buffer: &'a DeviceBuffer) -> Self {
        Self {
            tensor_index,
            location: BindingLocation::Device(buffer),
        }
    }
}

/// A model loaded onto a device, ready to run.
///
/// `run` takes `&mut self`, so one instance executes at most one dispatch
/// at a time.
pub struct ModelInstance {
    binder: Option<ResourceBinder>,
    graph: Option<CompiledGraph>,
    device: Arc<dyn Accelerator>,
    state: InstanceState,
    input_shapes_set: bool,
    timeout: Option<Duration>,
}

impl ModelInstance {
    /// Allocate resources for `graph` and initialize its persistent state.
    ///
    /// Weights are uploaded into transient buffers and copied into the
    /// persistent resource by an `Initialize` submission. The transient
    /// buffers are released once it completes.
    #[tracing::instrument(skip_all, fields(device = graph.device().name()))]
    pub fn load(graph: CompiledGraph, timeout: Option<Duration>) -> Result<Self> {
        let device = Arc::clone(graph.device());
        let properties = device.binding_properties(graph.graph_handle())?;
        let mut binder = ResourceBinder::new(&graph, properties)?;

        let mut recorder = CommandRecorder::new();
        let mut uploads = Vec::with_capacity(graph.weights().len());
        let mut inputs = vec![None; graph.input_count()];
        for (i, &tensor_index) in graph.weights().iter().enumerate() {
            let tensor = graph.tensor(tensor_index).ok_or_else(|| {
                Error::InvalidModel(format!("weight references missing tensor {tensor_index}"))
            })?;
            let data = tensor.prepared_data.as_deref().ok_or_else(|| {
                Error::InvalidModel(format!("weight '{}' has no data", tensor.name))
            })?;
            let buffer = DeviceBuffer::new(&device, data.len() as u64)?;
            let binding = buffer.binding();
            recorder.upload(binding, data);
            inputs[graph.model_inputs().len() + i] = Some(binding);
            uploads.push(buffer);
        }

        recorder.initialize(graph.graph_handle(), binder.initializer_table(&inputs)?);
        recorder.submit_and_wait(device.as_ref(), timeout)?;
        drop(uploads);

        tracing::info!(
            weights = graph.weights().len(),
            persistent = properties.persistent_size,
            "model instance initialized"
        );
        Ok(Self {
            binder: Some(binder),
            graph: Some(graph),
            device,
            state: InstanceState::Idle,
            input_shapes_set: false,
            timeout,
        })
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// The compiled graph, unless the instance was torn down.
    pub fn graph(&self) -> Option<&CompiledGraph> {
        self.graph.as_ref()
    }

    pub fn device(&self) -> &Arc<dyn Accelerator> {
        &self.device
    }

    /// Declare the shapes of the model inputs, in declared order.
    ///
    /// Shapes are fixed at load time; each one must equal the compiled
    /// shape of its input.
    pub fn set_input_shapes(&mut self, shapes: &[&[usize]]) -> Result<()> {
        let graph = self.graph.as_ref().ok_or(Error::NotConfigured)?;
        if shapes.len() != graph.model_inputs().len() {
            return Err(Error::Shape(format!(
                "model has {} inputs, {} shapes given",
                graph.model_inputs().len(),
                shapes.len()
            )));
        }
        for (&tensor_index, &shape) in graph.model_inputs().iter().zip(shapes) {
            let tensor = &graph.tensors()[tensor_index];
            if tensor.shape != shape {
                return Err(Error::Shape(format!(
                    "input '{}' was compiled with shape {:?}, got {:?}",
                    tensor.name, tensor.shape, shape
                )));
            }
        }
        self.input_shapes_set = true;
        Ok(())
    }

    /// Execute the model once.
    ///
    /// `inputs` and `outputs` follow the model's declared input and output
    /// order. CPU outputs receive their data before this returns.
    ///
    /// # Errors
    /// Binding and shape errors leave the instance idle and nothing is
    /// submitted. A `DeviceHang` tears the instance down.
    #[tracing::instrument(skip_all, fields(inputs = inputs.len(), outputs = outputs.len()))]
    pub fn run(&mut self, inputs: &[Binding<'_>], outputs: &mut [Binding<'_>]) -> Result<()> {
        if self.state != InstanceState::Idle {
            return Err(Error::NotConfigured);
        }
        if !self.input_shapes_set {
            return Err(Error::ShapeNotSet);
        }
        self.validate_bindings(inputs, outputs)?;

        self.state = InstanceState::Dispatching;
        let result = self.dispatch(inputs, outputs);
        match &result {
            Err(Error::DeviceHang(reason)) => {
                tracing::warn!("tearing down model instance: {reason}");
                self.teardown();
            }
            Err(e) => {
                tracing::debug!("run failed: {e}");
                self.state = InstanceState::Idle;
            }
            Ok(()) => self.state = InstanceState::Idle,
        }
        result
    }

    /// Run with host tensors and return freshly allocated outputs.
    pub fn run_tensors(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        let graph = self.graph.as_ref().ok_or(Error::NotConfigured)?;
        if inputs.len() != graph.model_inputs().len() {
            return Err(Error::BindingArity(format!(
                "model has {} inputs, {} tensors given",
                graph.model_inputs().len(),
                inputs.len()
            )));
        }
        let input_indices = graph.model_inputs().to_vec();
        let output_indices = graph.model_outputs().to_vec();
        let mut results = output_indices
            .iter()
            .map(|&i| {
                let tensor = &graph.tensors()[i];
                Tensor::zeros(tensor.dtype, &tensor.shape)
            })
            .collect::<Vec<_>>();

        let input_bindings = inputs
            .iter()
            .zip(input_indices)
            .map(|(tensor, index)| tensor.binding(index))
            .collect::<Vec<_>>();
        let mut output_bindings = results
            .iter_mut()
            .zip(output_indices)
            .map(|(tensor, index)| tensor.binding_mut(index))
            .collect::<Vec<_>>();
        self.run(&input_bindings, &mut output_bindings)?;
        drop(output_bindings);
        Ok(results)
    }

    fn teardown(&mut self) {
        self.binder = None;
        self.graph = None;
        self.input_shapes_set = false;
        self.state = InstanceState::Unconfigured;
    }

    fn validate_bindings(&self, inputs: &[Binding<'_>], outputs: &[Binding<'_>]) -> Result<()> {
        let graph = self.graph.as_ref().ok_or(Error::NotConfigured)?;
        check_bindings(&self.device, graph, "input", graph.model_inputs(), inputs)?;
        check_bindings(&self.device, graph, "output", graph.model_outputs(), outputs)?;
        if let Some(binding) = outputs
            .iter()
            .find(|b| matches!(b.location, BindingLocation::Cpu(HostMemory::Shared(_))))
        {
            return Err(Error::BindingType(format!(
                "output '{}' is bound to read-only memory",
                graph.tensors()[binding.tensor_index].name
            )));
        }
        Ok(())
    }

    fn dispatch(&mut self, inputs: &[Binding<'_>], outputs: &mut [Binding<'_>]) -> Result<()> {
        let graph = self.graph.as_ref().ok_or(Error::NotConfigured)?;
        let binder = self.binder.as_mut().ok_or(Error::NotConfigured)?;

        let mut recorder = CommandRecorder::new();
        // Kept alive until the submission completes.
        let mut transient = Vec::new();
        let mut input_slots = vec![None; graph.input_count()];
        for (slot, binding) in inputs.iter().enumerate() {
            let size = graph.tensors()[binding.tensor_index].data_size() as u64;
            input_slots[slot] = Some(match &binding.location {
                BindingLocation::Cpu(memory) => {
                    let buffer = DeviceBuffer::new(&self.device, size)?;
                    recorder.upload(buffer.binding(), memory.as_slice());
                    let bound = buffer.word_binding(size);
                    transient.push(buffer);
                    bound
                }
                BindingLocation::Device(buffer) => buffer.word_binding(size),
            });
        }

        let mut output_slots = Vec::with_capacity(outputs.len());
        let mut readbacks = Vec::new();
        for (slot, binding) in outputs.iter().enumerate() {
            let size = graph.tensors()[binding.tensor_index].data_size() as u64;
            output_slots.push(Some(match &binding.location {
                BindingLocation::Cpu(_) => {
                    let buffer = DeviceBuffer::new(&self.device, size)?;
                    // Only the tensor's bytes come back, not the word padding.
                    readbacks.push((slot, buffer.binding()));
                    let bound = buffer.word_binding(size);
                    transient.push(buffer);
                    bound
                }
                BindingLocation::Device(buffer) => buffer.word_binding(size),
            }));
        }

        recorder.dispatch(graph.graph_handle(), binder.dispatch_table(&input_slots, &output_slots)?);
        for &(_, src) in &readbacks {
            recorder.readback(src);
        }

        let completion = recorder.submit_and_wait(self.device.as_ref(), self.timeout)?;
        for ((slot, _), data) in readbacks.iter().zip(completion.readbacks) {
            if let BindingLocation::Cpu(HostMemory::Exclusive(dst)) = &mut outputs[*slot].location {
                if dst.len() != data.len() {
                    return Err(Error::Device(format!(
                        "readback of {} bytes for a {}-byte output",
                        data.len(),
                        dst.len()
                    )));
                }
                dst.copy_from_slice(&data);
            }
        }
        drop(transient);
        Ok(())
    }
}

/// Check count, order and size of the bindings on one side of the graph.
fn check_bindings(
    device: &Arc<dyn Accelerator>,
    graph: &CompiledGraph,
    what: &str,
    expected: &[usize],
    bindings: &[Binding<'_>],
) -> Result<()> {
    if bindings.len() != expected.len() {
        return Err(Error::BindingArity(format!(
            "model has {} {what}s, {} bound",
            expected.len(),
            bindings.len()
        )));
    }
    for (slot, (binding, &tensor_index)) in bindings.iter().zip(expected).enumerate() {
        if binding.tensor_index != tensor_index {
            return Err(Error::BindingArity(format!(
                "{what} slot {slot} expects tensor {tensor_index}, got {}",
                binding.tensor_index
            )));
        }
        let tensor = &graph.tensors()[tensor_index];
        let needed = tensor.data_size();
        match &binding.location {
            BindingLocation::Cpu(memory) if memory.as_slice().len() != needed => {
                return Err(Error::BindingType(format!(
                    "{what} '{}' needs {needed} bytes, {} bound",
                    tensor.name,
                    memory.as_slice().len()
                )));
            }
            BindingLocation::Device(buffer) if !buffer.belongs_to(device) => {
                return Err(Error::BindingType(format!(
                    "{what} '{}' is bound to a buffer of another device",
                    tensor.name
                )));
            }
            BindingLocation::Device(buffer) if buffer.size() < needed as u64 => {
                return Err(Error::BindingType(format!(
                    "{what} '{}' needs {needed} bytes, buffer has {}",
                    tensor.name,
                    buffer.size()
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

impl std::fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInstance")
            .field("device", &self.device.name())
            .field("state", &self.state)
            .field("input_shapes_set", &self.input_shapes_set)
            .finish()
    }
}
