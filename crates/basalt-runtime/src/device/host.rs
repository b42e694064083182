//! CPU reference accelerator.

use super::kernels;
use super::plan::{ExecutionPlan, TensorRef};
use crate::queue::{CommandExecutor, SubmissionQueue};
use basalt_core::{
    Accelerator, BindingProperties, BindingTable, BufferBinding, BufferHandle, Command,
    Completion, DeviceGraphDesc, Error, Fence, GraphHandle, OperatorDescriptor, OperatorHandle,
    Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Alignment of device-owned tensors inside the persistent resource.
pub const HOST_PERSISTENT_ALIGNMENT: u64 = 16;

#[derive(Default)]
struct HostState {
    next_handle: AtomicU64,
    operators: Mutex<HashMap<u64, Arc<OperatorDescriptor>>>,
    graphs: Mutex<HashMap<u64, Arc<ExecutionPlan>>>,
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Device("host device state is poisoned".to_string()))
}

impl HostState {
    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn graph(&self, graph: GraphHandle) -> Result<Arc<ExecutionPlan>> {
        lock(&self.graphs)?
            .get(&graph.0)
            .cloned()
            .ok_or_else(|| Error::Device(format!("unknown graph {:?}", graph)))
    }

    fn read(&self, binding: BufferBinding) -> Result<Vec<u8>> {
        let buffers = lock(&self.buffers)?;
        let data = buffers
            .get(&binding.buffer.0)
            .ok_or_else(|| Error::Device(format!("unknown buffer {:?}", binding.buffer)))?;
        let range = checked_range(binding, data.len())?;
        Ok(data[range].to_vec())
    }

    fn write(&self, binding: BufferBinding, bytes: &[u8]) -> Result<()> {
        let mut buffers = lock(&self.buffers)?;
        let data = buffers
            .get_mut(&binding.buffer.0)
            .ok_or_else(|| Error::Device(format!("unknown buffer {:?}", binding.buffer)))?;
        if bytes.len() as u64 > binding.size {
            return Err(Error::Device(format!(
                "{} bytes do not fit a {}-byte binding",
                bytes.len(),
                binding.size
            )));
        }
        let range = checked_range(binding, data.len())?;
        data[range.start..range.start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn initialize(&self, plan: &ExecutionPlan, bindings: &BindingTable) -> Result<()> {
        for slot in &plan.persistent {
            let src = bindings
                .inputs
                .get(slot.graph_input)
                .copied()
                .flatten()
                .ok_or_else(|| {
                    Error::Device(format!(
                        "device-owned graph input {} is not bound for initialization",
                        slot.graph_input
                    ))
                })?;
            let mut data = self.read(src)?;
            data.resize(slot.size as usize, 0);
            let dst = plan.resolve(TensorRef::GraphInput(slot.graph_input), bindings)?;
            self.write(dst, &data)?;
        }
        Ok(())
    }

    fn dispatch(&self, plan: &ExecutionPlan, bindings: &BindingTable) -> Result<()> {
        for node in &plan.nodes {
            let inputs = node
                .inputs
                .iter()
                .zip(node.descriptor.inputs())
                .map(|(&tensor, desc)| {
                    let binding = plan.resolve(tensor, bindings)?;
                    require_size(&node.name, binding, desc.total_size_bytes)?;
                    self.read(binding)
                })
                .collect::<Result<Vec<_>>>()?;

            let targets = node
                .outputs
                .iter()
                .zip(node.descriptor.outputs())
                .map(|(&tensor, desc)| {
                    let binding = plan.resolve(tensor, bindings)?;
                    require_size(&node.name, binding, desc.total_size_bytes)?;
                    Ok(binding)
                })
                .collect::<Result<Vec<_>>>()?;
            let mut outputs = targets
                .iter()
                .map(|&binding| self.read(binding))
                .collect::<Result<Vec<_>>>()?;

            tracing::trace!(node = %node.name, op = %node.descriptor.label(), "host kernel");
            kernels::execute(&node.descriptor, &inputs, &mut outputs);

            for (binding, data) in targets.into_iter().zip(&outputs) {
                self.write(binding, data)?;
            }
        }
        Ok(())
    }
}

fn checked_range(binding: BufferBinding, len: usize) -> Result<std::ops::Range<usize>> {
    let end = binding.offset + binding.size;
    if end > len as u64 {
        return Err(Error::Device(format!(
            "binding {}..{} exceeds buffer {:?} of {} bytes",
            binding.offset, end, binding.buffer, len
        )));
    }
    Ok(binding.offset as usize..end as usize)
}

fn require_size(node: &str, binding: BufferBinding, needed: u64) -> Result<()> {
    if binding.size < needed {
        return Err(Error::Device(format!(
            "node '{node}' needs {needed} bytes, binding has {}",
            binding.size
        )));
    }
    Ok(())
}

impl CommandExecutor for HostState {
    fn execute(&self, commands: Vec<Command>) -> Result<Completion> {
        let mut completion = Completion::default();
        for command in commands {
            match command {
                Command::Upload { dst, data } => self.write(dst, &data)?,
                Command::Copy { src, dst } => {
                    if src.size != dst.size {
                        return Err(Error::Device(format!(
                            "copy between ranges of {} and {} bytes",
                            src.size, dst.size
                        )));
                    }
                    let data = self.read(src)?;
                    self.write(dst, &data)?;
                }
                Command::Initialize { graph, bindings } => {
                    self.initialize(&*self.graph(graph)?, &bindings)?
                }
                Command::Dispatch { graph, bindings } => {
                    self.dispatch(&*self.graph(graph)?, &bindings)?
                }
                Command::Readback { src } => completion.readbacks.push(self.read(src)?),
            }
        }
        Ok(completion)
    }
}

/// Accelerator that interprets device graphs on the CPU.
///
/// Supports every element type the descriptors can carry. Submissions run
/// on a dedicated thread, in order.
pub struct HostDevice {
    state: Arc<HostState>,
    queue: SubmissionQueue,
}

impl HostDevice {
    pub fn new() -> Result<Self> {
        let state = Arc::new(HostState::default());
        let queue = SubmissionQueue::spawn("basalt-host", state.clone())?;
        Ok(Self { state, queue })
    }
}

impl Accelerator for HostDevice {
    fn name(&self) -> &str {
        "host"
    }

    fn create_operator(&self, desc: &OperatorDescriptor) -> Result<OperatorHandle> {
        let handle = self.state.next_handle();
        lock(&self.state.operators)?.insert(handle, Arc::new(desc.clone()));
        Ok(OperatorHandle(handle))
    }

    fn release_operator(&self, operator: OperatorHandle) {
        if let Ok(mut operators) = lock(&self.state.operators) {
            operators.remove(&operator.0);
        }
    }

    fn compile_graph(&self, desc: &DeviceGraphDesc) -> Result<GraphHandle> {
        let plan = {
            let operators = lock(&self.state.operators)?;
            ExecutionPlan::build(
                desc,
                |handle| operators.get(&handle.0).cloned(),
                HOST_PERSISTENT_ALIGNMENT,
            )?
        };
        let handle = self.state.next_handle();
        tracing::debug!(
            nodes = plan.nodes.len(),
            persistent = plan.properties.persistent_size,
            "host graph compiled"
        );
        lock(&self.state.graphs)?.insert(handle, Arc::new(plan));
        Ok(GraphHandle(handle))
    }

    fn binding_properties(&self, graph: GraphHandle) -> Result<BindingProperties> {
        Ok(self.state.graph(graph)?.properties)
    }

    fn release_graph(&self, graph: GraphHandle) {
        if let Ok(mut graphs) = lock(&self.state.graphs) {
            graphs.remove(&graph.0);
        }
    }

    fn create_buffer(&self, size: u64) -> Result<BufferHandle> {
        let handle = self.state.next_handle();
        lock(&self.state.buffers)?.insert(handle, vec![0; size as usize]);
        Ok(BufferHandle(handle))
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        if let Ok(mut buffers) = lock(&self.state.buffers) {
            buffers.remove(&buffer.0);
        }
    }

    fn submit(&self, commands: Vec<Command>) -> Result<Fence> {
        self.queue.submit(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

    #[test]
    fn test_upload_copy_readback() {
        let device = HostDevice::new().unwrap();
        let a = device.create_buffer(8).unwrap();
        let b = device.create_buffer(8).unwrap();

        let fence = device
            .submit(vec![
                Command::Upload {
                    dst: BufferBinding::whole(a, 8),
                    data: vec![1, 2, 3, 4, 5, 6, 7, 8],
                },
                Command::Copy {
                    src: BufferBinding { buffer: a, offset: 4, size: 4 },
                    dst: BufferBinding { buffer: b, offset: 0, size: 4 },
                },
                Command::Readback {
                    src: BufferBinding::whole(b, 8),
                },
            ])
            .unwrap();

        let completion = fence.wait(TIMEOUT).unwrap();
        assert_eq!(completion.readbacks, vec![vec![5, 6, 7, 8, 0, 0, 0, 0]]);
    }

    #[test]
    fn test_out_of_range_binding_fails_the_submission() {
        let device = HostDevice::new().unwrap();
        let a = device.create_buffer(4).unwrap();
        let fence = device
            .submit(vec![Command::Readback {
                src: BufferBinding { buffer: a, offset: 2, size: 4 },
            }])
            .unwrap();
        assert!(matches!(fence.wait(TIMEOUT), Err(Error::Device(_))));
    }

    #[test]
    fn test_released_buffer_is_unknown() {
        let device = HostDevice::new().unwrap();
        let a = device.create_buffer(4).unwrap();
        device.release_buffer(a);
        let fence = device
            .submit(vec![Command::Readback {
                src: BufferBinding::whole(a, 4),
            }])
            .unwrap();
        assert!(fence.wait(TIMEOUT).is_err());
    }
}
