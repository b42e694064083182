//! Accelerator abstraction.
//!
//! An [`Accelerator`] creates operators from descriptors, compiles graphs of
//! them, hands out buffers and executes recorded command lists on its own
//! submission thread. Every submission returns a [`Fence`] the caller blocks
//! on.

use crate::descriptor::OperatorDescriptor;
use crate::{Error, Result};
use std::sync::mpsc;
use std::time::Duration;

/// Device operator created from an [`OperatorDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperatorHandle(pub u64);

/// Compiled device graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphHandle(pub u64);

/// Device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Node of a device graph.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceNode {
    pub operator: OperatorHandle,
    pub name: String,
}

/// Graph input feeding a node input slot.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEdgeDesc {
    pub graph_input: usize,
    pub to_node: usize,
    pub to_slot: usize,
    pub name: String,
}

/// Node output slot feeding a graph output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputEdgeDesc {
    pub from_node: usize,
    pub from_slot: usize,
    pub graph_output: usize,
    pub name: String,
}

/// Node output slot feeding another node's input slot.
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateEdgeDesc {
    pub from_node: usize,
    pub from_slot: usize,
    pub to_node: usize,
    pub to_slot: usize,
    pub name: String,
}

/// Everything an accelerator needs to compile a graph.
///
/// Intermediate edges are listed in the order their buffers appear in
/// [`BindingTable::intermediates`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceGraphDesc {
    pub input_count: usize,
    pub output_count: usize,
    pub nodes: Vec<DeviceNode>,
    pub input_edges: Vec<InputEdgeDesc>,
    pub output_edges: Vec<OutputEdgeDesc>,
    pub intermediate_edges: Vec<IntermediateEdgeDesc>,
}

/// Resource requirements of a compiled graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingProperties {
    /// Bytes of state kept across dispatches (weights among it).
    pub persistent_size: u64,
    /// Scratch bytes needed by one dispatch.
    pub temporary_size: u64,
    /// Scratch bytes needed by the one-time initialization.
    pub initializer_temporary_size: u64,
    pub input_count: usize,
    pub output_count: usize,
    pub intermediate_count: usize,
}

/// A range of a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub size: u64,
}

impl BufferBinding {
    /// Bind a whole buffer starting at offset 0.
    pub fn whole(buffer: BufferHandle, size: u64) -> Self {
        Self {
            buffer,
            offset: 0,
            size,
        }
    }
}

/// Per-dispatch mapping from graph slots to buffers.
///
/// Absent buffers stay `None` so indices always line up with the graph's
/// declared input and output order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingTable {
    pub inputs: Vec<Option<BufferBinding>>,
    pub outputs: Vec<Option<BufferBinding>>,
    pub intermediates: Vec<Option<BufferBinding>>,
    pub persistent: Option<BufferBinding>,
    pub temporary: Option<BufferBinding>,
}

impl BindingTable {
    /// Clear every slot and size the slot arrays for `props`.
    ///
    /// Keeps the existing allocations.
    pub fn reset(&mut self, props: &BindingProperties) {
        reset_slots(&mut self.inputs, props.input_count);
        reset_slots(&mut self.outputs, props.output_count);
        reset_slots(&mut self.intermediates, props.intermediate_count);
        self.persistent = None;
        self.temporary = None;
    }

    pub fn bind_input(&mut self, slot: usize, binding: Option<BufferBinding>) -> Result<()> {
        bind_slot(&mut self.inputs, "input", slot, binding)
    }

    pub fn bind_output(&mut self, slot: usize, binding: Option<BufferBinding>) -> Result<()> {
        bind_slot(&mut self.outputs, "output", slot, binding)
    }

    pub fn bind_intermediate(&mut self, slot: usize, binding: Option<BufferBinding>) -> Result<()> {
        bind_slot(&mut self.intermediates, "intermediate", slot, binding)
    }
}

fn reset_slots(slots: &mut Vec<Option<BufferBinding>>, count: usize) {
    slots.clear();
    slots.resize(count, None);
}

fn bind_slot(
    slots: &mut [Option<BufferBinding>],
    what: &str,
    slot: usize,
    binding: Option<BufferBinding>,
) -> Result<()> {
    let count = slots.len();
    let entry = slots.get_mut(slot).ok_or_else(|| {
        Error::BindingArity(format!("{what} slot {slot} out of range (graph has {count})"))
    })?;
    *entry = binding;
    Ok(())
}

/// One recorded device command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Copy host bytes into a buffer range.
    Upload { dst: BufferBinding, data: Vec<u8> },
    /// Copy between buffer ranges of equal size.
    Copy { src: BufferBinding, dst: BufferBinding },
    /// One-time graph initialization (weights into the persistent resource).
    Initialize {
        graph: GraphHandle,
        bindings: BindingTable,
    },
    /// Execute a compiled graph.
    Dispatch {
        graph: GraphHandle,
        bindings: BindingTable,
    },
    /// Copy a buffer range back to the host.
    Readback { src: BufferBinding },
}

/// Result of a completed submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Data of every `Readback` command, in submission order.
    pub readbacks: Vec<Vec<u8>>,
}

/// Sending half of a [`Fence`], held by the submission thread.
#[derive(Debug)]
pub struct FenceSignal {
    sender: mpsc::Sender<Result<Completion>>,
}

impl FenceSignal {
    /// Complete the fence. A caller that stopped waiting is not an error.
    pub fn signal(self, result: Result<Completion>) {
        let _ = self.sender.send(result);
    }
}

/// Completion signal of one submission.
#[derive(Debug)]
pub struct Fence {
    receiver: mpsc::Receiver<Result<Completion>>,
}

impl Fence {
    pub fn channel() -> (FenceSignal, Fence) {
        let (sender, receiver) = mpsc::channel();
        (FenceSignal { sender }, Fence { receiver })
    }

    /// Block until the submission finished.
    ///
    /// With a timeout, an expired wait is reported as `DeviceHang`.
    pub fn wait(self, timeout: Option<Duration>) -> Result<Completion> {
        match timeout {
            Some(timeout) => self.receiver.recv_timeout(timeout).map_err(|e| match e {
                mpsc::RecvTimeoutError::Timeout => Error::DeviceHang(format!(
                    "submission did not complete within {:?}",
                    timeout
                )),
                mpsc::RecvTimeoutError::Disconnected => {
                    Error::Device("submission thread dropped the fence".to_string())
                }
            })?,
            None => self
                .receiver
                .recv()
                .map_err(|_| Error::Device("submission thread dropped the fence".to_string()))?,
        }
    }
}

/// Compute device that executes compiled operator graphs.
///
/// Implementations are shared between every model compiled against one
/// runtime, so all methods take `&self`.
pub trait Accelerator: Send + Sync {
    /// Device name for logs.
    fn name(&self) -> &str;

    /// Create a device operator from a descriptor.
    ///
    /// Fails with `Type` or `Compile` when the device cannot run it.
    fn create_operator(&self, desc: &OperatorDescriptor) -> Result<OperatorHandle>;

    fn release_operator(&self, operator: OperatorHandle);

    /// Compile a graph of previously created operators.
    fn compile_graph(&self, desc: &DeviceGraphDesc) -> Result<GraphHandle>;

    fn binding_properties(&self, graph: GraphHandle) -> Result<BindingProperties>;

    fn release_graph(&self, graph: GraphHandle);

    /// Allocate a zero-initialized buffer of at least `size` bytes.
    fn create_buffer(&self, size: u64) -> Result<BufferHandle>;

    fn release_buffer(&self, buffer: BufferHandle);

    /// Queue commands for in-order execution on the submission thread.
    fn submit(&self, commands: Vec<Command>) -> Result<Fence>;
}
