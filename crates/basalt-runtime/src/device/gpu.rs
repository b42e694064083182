//! wgpu compute accelerator.
//!
//! Executes float32 graphs with two WGSL kernels: a strided elementwise
//! kernel (unary, binary and variadic operators) and a batched GEMM kernel.
//! Per-node parameters are uploaded once when the graph is compiled.

use super::plan::{ExecutionPlan, TensorRef};
use crate::queue::{CommandExecutor, SubmissionQueue};
use basalt_core::shape::{align_up, contiguous_strides};
use basalt_core::{
    Accelerator, BinaryKind, BindingProperties, BindingTable, BufferBinding, BufferHandle,
    Command, Completion, DeviceDataType, DeviceGraphDesc, DeviceTensorDesc, Error, Fence,
    GemmBias, GraphHandle, OperatorDescriptor, OperatorHandle, Result, UnaryKind, VariadicKind,
    MAX_RANK,
};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use wgpu::util::DeviceExt;

/// Alignment of device-owned tensors inside the persistent resource. Matches
/// the storage buffer offset alignment of every wgpu backend.
pub const GPU_PERSISTENT_ALIGNMENT: u64 = 256;

const WORKGROUP_SIZE: u32 = 256;
const MAX_WORKGROUPS_PER_DIM: u32 = 65535;

const OP_BINARY: u32 = 64;
const OP_COMBINE: u32 = 80;
const OP_COPY: u32 = 96;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Device("gpu device state is poisoned".to_string()))
}

fn unary_op(kind: UnaryKind) -> Result<u32> {
    UnaryKind::ALL
        .iter()
        .position(|&k| k == kind)
        .map(|i| i as u32)
        .ok_or_else(|| Error::Type(format!("{} has no gpu kernel", kind.op_type())))
}

fn binary_op(kind: BinaryKind) -> u32 {
    OP_BINARY
        + match kind {
            BinaryKind::Add => 0,
            BinaryKind::Sub => 1,
            BinaryKind::Mul => 2,
            BinaryKind::Div => 3,
            BinaryKind::Pow => 4,
            BinaryKind::Prelu => 5,
            BinaryKind::Mod { fmod: true } => 6,
            BinaryKind::Mod { fmod: false } => 7,
        }
}

fn combine_op(kind: VariadicKind) -> u32 {
    OP_COMBINE
        + match kind {
            VariadicKind::Max => 0,
            VariadicKind::Min => 1,
            VariadicKind::Sum | VariadicKind::Mean => 2,
        }
}

/// Grid covering `count` invocations, spilling into y past the per-dimension
/// workgroup limit.
fn compute_dispatch_size(count: u32) -> [u32; 3] {
    let groups = count.div_ceil(WORKGROUP_SIZE).max(1);
    let x = groups.min(MAX_WORKGROUPS_PER_DIM);
    [x, groups.div_ceil(x), 1]
}

fn put_dims(params: &mut [u32], at: usize, dims: &[usize]) {
    for (i, &d) in dims.iter().enumerate() {
        params[at + i] = d as u32;
    }
}

struct ElementwiseParams<'a> {
    op: u32,
    sizes: &'a [usize],
    lhs_strides: &'a [usize],
    rhs_strides: &'a [usize],
    alpha: f32,
    beta: f32,
    gamma: f32,
    scale: f32,
}

impl ElementwiseParams<'_> {
    fn encode(&self) -> [u32; 32] {
        let mut params = [0u32; 32];
        params[0] = self.op;
        params[1] = self.sizes.len() as u32;
        params[2] = self.sizes.iter().product::<usize>() as u32;
        params[3] = self.alpha.to_bits();
        params[4] = self.beta.to_bits();
        params[5] = self.gamma.to_bits();
        params[6] = self.scale.to_bits();
        put_dims(&mut params, 8, self.sizes);
        put_dims(&mut params, 16, self.lhs_strides);
        put_dims(&mut params, 24, self.rhs_strides);
        params
    }
}

#[derive(Debug, Clone, Copy)]
enum Operand {
    Tensor(TensorRef),
    Temporary,
}

enum GpuStep {
    Elementwise {
        params: wgpu::Buffer,
        lhs: Operand,
        rhs: Option<Operand>,
        output: Operand,
        count: u32,
    },
    Gemm {
        params: wgpu::Buffer,
        a: TensorRef,
        b: TensorRef,
        c: Option<TensorRef>,
        output: TensorRef,
        count: u32,
    },
    Copy {
        src: Operand,
        dst: Operand,
        size: u64,
    },
}

struct GpuGraph {
    plan: ExecutionPlan,
    steps: Vec<GpuStep>,
}

struct Kernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

impl Kernel {
    fn new(device: &wgpu::Device, label: &str, source: &'static str, inputs: u32) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        });

        // Binding 0 holds the parameters, then the inputs, then the output.
        let entries: Vec<_> = (0..=inputs + 1)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: binding <= inputs,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("Bind Group Layout: {label}")),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("Pipeline Layout: {label}")),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&format!("Pipeline: {label}")),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self { pipeline, layout }
    }
}

struct GpuState {
    device: wgpu::Device,
    queue: wgpu::Queue,
    elementwise: Kernel,
    gemm: Kernel,
    next_handle: AtomicU64,
    operators: Mutex<HashMap<u64, Arc<OperatorDescriptor>>>,
    graphs: Mutex<HashMap<u64, Arc<GpuGraph>>>,
    buffers: Mutex<HashMap<u64, wgpu::Buffer>>,
}

impl GpuState {
    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn params_buffer(&self, label: &str, params: &[u32]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(params),
                usage: wgpu::BufferUsages::STORAGE,
            })
    }

    fn buffer(&self, handle: BufferHandle) -> Result<wgpu::Buffer> {
        lock(&self.buffers)?
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| Error::Device(format!("unknown buffer {:?}", handle)))
    }

    /// Translate one planned node into kernel steps.
    fn lower_node(
        &self,
        name: &str,
        desc: &OperatorDescriptor,
        inputs: &[TensorRef],
        output: TensorRef,
        steps: &mut Vec<GpuStep>,
    ) -> Result<u64> {
        let label = format!("Params: {name}");
        let mut temporary = 0;
        match desc {
            OperatorDescriptor::Unary {
                kind,
                input,
                output: out,
                alpha,
                beta,
                gamma,
            } => {
                let params = ElementwiseParams {
                    op: unary_op(*kind)?,
                    sizes: &out.sizes,
                    lhs_strides: &input.effective_strides(),
                    rhs_strides: &[],
                    alpha: *alpha,
                    beta: *beta,
                    gamma: *gamma,
                    scale: 1.0,
                };
                steps.push(GpuStep::Elementwise {
                    params: self.params_buffer(&label, &params.encode()),
                    lhs: Operand::Tensor(inputs[0]),
                    rhs: None,
                    output: Operand::Tensor(output),
                    count: out.element_count() as u32,
                });
            }
            OperatorDescriptor::Binary { kind, a, b, output: out } => {
                let params = ElementwiseParams {
                    op: binary_op(*kind),
                    sizes: &out.sizes,
                    lhs_strides: &a.effective_strides(),
                    rhs_strides: &b.effective_strides(),
                    alpha: 0.0,
                    beta: 0.0,
                    gamma: 0.0,
                    scale: 1.0,
                };
                steps.push(GpuStep::Elementwise {
                    params: self.params_buffer(&label, &params.encode()),
                    lhs: Operand::Tensor(inputs[0]),
                    rhs: Some(Operand::Tensor(inputs[1])),
                    output: Operand::Tensor(output),
                    count: out.element_count() as u32,
                });
            }
            OperatorDescriptor::Variadic {
                kind,
                inputs: descs,
                output: out,
                passes,
            } => {
                // Inputs are folded pairwise in declared order. From the third
                // input on, the running result is staged in the temporary
                // resource.
                let scale = passes.iter().filter_map(|p| p.scale).product::<f32>();
                let dense = contiguous_strides(&out.sizes);
                let count = out.element_count() as u32;
                let last = descs.len() - 1;
                for (i, input) in descs.iter().enumerate().skip(1) {
                    let (lhs, lhs_strides) = if i == 1 {
                        (Operand::Tensor(inputs[0]), descs[0].effective_strides())
                    } else {
                        steps.push(GpuStep::Copy {
                            src: Operand::Tensor(output),
                            dst: Operand::Temporary,
                            size: out.total_size_bytes,
                        });
                        temporary = out.total_size_bytes;
                        (Operand::Temporary, dense.clone())
                    };
                    let params = ElementwiseParams {
                        op: combine_op(*kind),
                        sizes: &out.sizes,
                        lhs_strides: &lhs_strides,
                        rhs_strides: &input.effective_strides(),
                        alpha: 0.0,
                        beta: 0.0,
                        gamma: 0.0,
                        scale: if i == last { scale } else { 1.0 },
                    };
                    steps.push(GpuStep::Elementwise {
                        params: self.params_buffer(&label, &params.encode()),
                        lhs,
                        rhs: Some(Operand::Tensor(inputs[i])),
                        output: Operand::Tensor(output),
                        count,
                    });
                }
                if last == 0 {
                    let params = ElementwiseParams {
                        op: OP_COPY,
                        sizes: &out.sizes,
                        lhs_strides: &descs[0].effective_strides(),
                        rhs_strides: &[],
                        alpha: 0.0,
                        beta: 0.0,
                        gamma: 0.0,
                        scale,
                    };
                    steps.push(GpuStep::Elementwise {
                        params: self.params_buffer(&label, &params.encode()),
                        lhs: Operand::Tensor(inputs[0]),
                        rhs: None,
                        output: Operand::Tensor(output),
                        count,
                    });
                }
            }
            OperatorDescriptor::Gemm {
                a,
                b,
                c,
                output: out,
                alpha,
                beta,
                trans_a,
                trans_b,
                bias,
            } => {
                let rank = out.sizes.len();
                let (m, n) = (out.sizes[rank - 2], out.sizes[rank - 1]);
                let k = if *trans_a { a.sizes[rank - 2] } else { a.sizes[rank - 1] };
                let mut params = [0u32; 48];
                params[0] = rank as u32;
                params[1] = m as u32;
                params[2] = n as u32;
                params[3] = k as u32;
                params[4] = *trans_a as u32;
                params[5] = *trans_b as u32;
                params[6] = match (bias, c) {
                    (GemmBias::Tensor, Some(_)) => 1,
                    (GemmBias::Scalar, Some(_)) => 2,
                    _ => 0,
                };
                params[7] = alpha.to_bits();
                params[8] = beta.to_bits();
                params[9] = out.element_count() as u32;
                put_dims(&mut params, 16, &out.sizes);
                put_dims(&mut params, 24, &a.effective_strides());
                put_dims(&mut params, 32, &b.effective_strides());
                if let Some(c) = c {
                    put_dims(&mut params, 40, &c.effective_strides());
                }
                steps.push(GpuStep::Gemm {
                    params: self.params_buffer(&label, &params),
                    a: inputs[0],
                    b: inputs[1],
                    c: inputs.get(2).copied(),
                    output,
                    count: out.element_count() as u32,
                });
            }
        }
        Ok(temporary)
    }

    fn resolve(
        &self,
        plan: &ExecutionPlan,
        operand: Operand,
        bindings: &BindingTable,
    ) -> Result<(wgpu::Buffer, BufferBinding)> {
        let binding = match operand {
            Operand::Tensor(tensor) => plan.resolve(tensor, bindings)?,
            Operand::Temporary => bindings
                .temporary
                .ok_or_else(|| Error::Device("temporary resource is not bound".to_string()))?,
        };
        Ok((self.buffer(binding.buffer)?, binding))
    }

    fn bind_group(
        &self,
        kernel: &Kernel,
        params: &wgpu::Buffer,
        operands: &[(wgpu::Buffer, BufferBinding)],
    ) -> wgpu::BindGroup {
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: params.as_entire_binding(),
        }];
        for (i, (buffer, binding)) in operands.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: binding.offset,
                    size: wgpu::BufferSize::new(binding.size),
                }),
            });
        }
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Dispatch Bind Group"),
            layout: &kernel.layout,
            entries: &entries,
        })
    }

    fn encode_kernel(
        encoder: &mut wgpu::CommandEncoder,
        kernel: &Kernel,
        bind_group: &wgpu::BindGroup,
        count: u32,
    ) {
        let [x, y, z] = compute_dispatch_size(count);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Compute Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&kernel.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(x, y, z);
    }

    fn encode_dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        graph: &GpuGraph,
        bindings: &BindingTable,
    ) -> Result<()> {
        let plan = &graph.plan;
        for step in &graph.steps {
            match step {
                GpuStep::Elementwise {
                    params,
                    lhs,
                    rhs,
                    output,
                    count,
                } => {
                    if *count == 0 {
                        continue;
                    }
                    let lhs = self.resolve(plan, *lhs, bindings)?;
                    // Unary kernels still bind something read-only at the rhs slot.
                    let rhs = match rhs {
                        Some(rhs) => self.resolve(plan, *rhs, bindings)?,
                        None => lhs.clone(),
                    };
                    let output = self.resolve(plan, *output, bindings)?;
                    let bind_group = self.bind_group(&self.elementwise, params, &[lhs, rhs, output]);
                    Self::encode_kernel(encoder, &self.elementwise, &bind_group, *count);
                }
                GpuStep::Gemm {
                    params,
                    a,
                    b,
                    c,
                    output,
                    count,
                } => {
                    if *count == 0 {
                        continue;
                    }
                    let a = self.resolve(plan, Operand::Tensor(*a), bindings)?;
                    let b = self.resolve(plan, Operand::Tensor(*b), bindings)?;
                    let c = match c {
                        Some(c) => self.resolve(plan, Operand::Tensor(*c), bindings)?,
                        None => a.clone(),
                    };
                    let output = self.resolve(plan, Operand::Tensor(*output), bindings)?;
                    let bind_group = self.bind_group(&self.gemm, params, &[a, b, c, output]);
                    Self::encode_kernel(encoder, &self.gemm, &bind_group, *count);
                }
                GpuStep::Copy { src, dst, size } => {
                    let (src_buffer, src) = self.resolve(plan, *src, bindings)?;
                    let (dst_buffer, dst) = self.resolve(plan, *dst, bindings)?;
                    encoder.copy_buffer_to_buffer(&src_buffer, src.offset, &dst_buffer, dst.offset, *size);
                }
            }
        }
        Ok(())
    }

    fn encode_initialize(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        graph: &GpuGraph,
        bindings: &BindingTable,
    ) -> Result<()> {
        for slot in &graph.plan.persistent {
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
            if src.size < slot.size {
                return Err(Error::Device(format!(
                    "graph input {} needs {} bytes, binding has {}",
                    slot.graph_input, slot.size, src.size
                )));
            }
            let (dst_buffer, dst) = self.resolve(
                &graph.plan,
                Operand::Tensor(TensorRef::GraphInput(slot.graph_input)),
                bindings,
            )?;
            let src_buffer = self.buffer(src.buffer)?;
            encoder.copy_buffer_to_buffer(&src_buffer, src.offset, &dst_buffer, dst.offset, slot.size);
        }
        Ok(())
    }

    fn graph(&self, graph: GraphHandle) -> Result<Arc<GpuGraph>> {
        lock(&self.graphs)?
            .get(&graph.0)
            .cloned()
            .ok_or_else(|| Error::Device(format!("unknown graph {:?}", graph)))
    }

    fn poll(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| Error::Device(format!("GPU poll failed: {:?}", e)))?;
        Ok(())
    }

    fn map_staging(&self, staging: &wgpu::Buffer, size: u64) -> Result<Vec<u8>> {
        let slice = staging.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.poll()?;
        pollster::block_on(rx)
            .map_err(|_| Error::Device("failed to receive map result".to_string()))?
            .map_err(|e| Error::Device(format!("map failed: {:?}", e)))?;

        let data = slice.get_mapped_range();
        let result = data[..size as usize].to_vec();
        drop(data);
        staging.unmap();
        Ok(result)
    }
}

impl CommandExecutor for GpuState {
    fn execute(&self, commands: Vec<Command>) -> Result<Completion> {
        let mut staged = Vec::new();
        for command in commands {
            if let Command::Upload { dst, mut data } = command {
                if data.len() as u64 > dst.size {
                    return Err(Error::Device(format!(
                        "{} bytes do not fit a {}-byte binding",
                        data.len(),
                        dst.size
                    )));
                }
                data.resize(align_up(data.len() as u64, 4) as usize, 0);
                self.queue.write_buffer(&self.buffer(dst.buffer)?, dst.offset, &data);
                continue;
            }

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Submission Encoder"),
                });
            match command {
                Command::Upload { .. } => {}
                Command::Copy { src, dst } => {
                    if src.size != dst.size {
                        return Err(Error::Device(format!(
                            "copy between ranges of {} and {} bytes",
                            src.size, dst.size
                        )));
                    }
                    encoder.copy_buffer_to_buffer(
                        &self.buffer(src.buffer)?,
                        src.offset,
                        &self.buffer(dst.buffer)?,
                        dst.offset,
                        align_up(src.size, 4),
                    );
                }
                Command::Initialize { graph, bindings } => {
                    self.encode_initialize(&mut encoder, &self.graph(graph)?, &bindings)?
                }
                Command::Dispatch { graph, bindings } => {
                    self.encode_dispatch(&mut encoder, &self.graph(graph)?, &bindings)?
                }
                Command::Readback { src } => {
                    let padded = align_up(src.size, 4).max(4);
                    let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("Staging Buffer"),
                        size: padded,
                        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    });
                    encoder.copy_buffer_to_buffer(
                        &self.buffer(src.buffer)?,
                        src.offset,
                        &staging,
                        0,
                        align_up(src.size, 4),
                    );
                    staged.push((staging, src.size));
                }
            }
            self.queue.submit(Some(encoder.finish()));
        }

        self.poll()?;
        let readbacks = staged
            .iter()
            .map(|(staging, size)| self.map_staging(staging, *size))
            .collect::<Result<Vec<_>>>()?;
        Ok(Completion { readbacks })
    }
}

fn check_float32(name: &str, tensor: &DeviceTensorDesc) -> Result<()> {
    if tensor.data_type != DeviceDataType::Float32 {
        return Err(Error::Type(format!(
            "gpu device runs float32 only, {name} uses {:?}",
            tensor.data_type
        )));
    }
    if tensor.sizes.len() > MAX_RANK {
        return Err(Error::Shape(format!(
            "gpu device supports rank <= {MAX_RANK}, {name} has rank {}",
            tensor.sizes.len()
        )));
    }
    Ok(())
}

/// Accelerator running graphs as wgpu compute dispatches.
pub struct GpuDevice {
    state: Arc<GpuState>,
    queue: SubmissionQueue,
    adapter_info: wgpu::AdapterInfo,
}

impl GpuDevice {
    /// Initialize with the default high-performance adapter.
    ///
    /// # Errors
    /// Returns `Error::Device` if no suitable GPU is found or device creation fails.
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Device(format!("Failed to find suitable GPU adapter: {}", e)))?;

        Self::with_adapter(&adapter).await
    }

    /// Initialize with a specific adapter.
    pub async fn with_adapter(adapter: &wgpu::Adapter) -> Result<Self> {
        let adapter_info = adapter.get_info();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .map_err(|e| Error::Device(format!("Failed to create device: {}", e)))?;

        let elementwise = Kernel::new(&device, "elementwise", include_str!("shaders/elementwise.wgsl"), 2);
        let gemm = Kernel::new(&device, "gemm", include_str!("shaders/gemm.wgsl"), 3);

        let state = Arc::new(GpuState {
            device,
            queue,
            elementwise,
            gemm,
            next_handle: AtomicU64::new(0),
            operators: Mutex::new(HashMap::new()),
            graphs: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
        });
        let queue = SubmissionQueue::spawn("basalt-gpu", state.clone())?;
        tracing::info!(adapter = %adapter_info.name, backend = ?adapter_info.backend, "gpu device ready");

        Ok(Self {
            state,
            queue,
            adapter_info,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }
}

impl Accelerator for GpuDevice {
    fn name(&self) -> &str {
        &self.adapter_info.name
    }

    fn create_operator(&self, desc: &OperatorDescriptor) -> Result<OperatorHandle> {
        for tensor in desc.inputs().into_iter().chain(desc.outputs()) {
            check_float32(&desc.label(), tensor)?;
        }
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
        let mut plan = {
            let operators = lock(&self.state.operators)?;
            ExecutionPlan::build(
                desc,
                |handle| operators.get(&handle.0).cloned(),
                GPU_PERSISTENT_ALIGNMENT,
            )?
        };

        let mut steps = Vec::new();
        let mut temporary = 0;
        for node in &plan.nodes {
            let output = node.outputs.first().copied().ok_or_else(|| {
                Error::Compile(format!("node '{}' has no output", node.name))
            })?;
            let needed =
                self.state
                    .lower_node(&node.name, &node.descriptor, &node.inputs, output, &mut steps)?;
            temporary = temporary.max(needed);
        }
        plan.properties.temporary_size = temporary;
        // Storage bindings must not be empty.
        plan.properties.persistent_size = align_up(plan.properties.persistent_size, 4);

        let handle = self.state.next_handle();
        tracing::debug!(nodes = plan.nodes.len(), steps = steps.len(), "gpu graph compiled");
        lock(&self.state.graphs)?.insert(handle, Arc::new(GpuGraph { plan, steps }));
        Ok(GraphHandle(handle))
    }

    fn binding_properties(&self, graph: GraphHandle) -> Result<BindingProperties> {
        Ok(self.state.graph(graph)?.plan.properties)
    }

    fn release_graph(&self, graph: GraphHandle) {
        if let Ok(mut graphs) = lock(&self.state.graphs) {
            graphs.remove(&graph.0);
        }
    }

    fn create_buffer(&self, size: u64) -> Result<BufferHandle> {
        let buffer = self.state.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("basalt buffer"),
            size: align_up(size, 4).max(4),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let handle = self.state.next_handle();
        lock(&self.state.buffers)?.insert(handle, buffer);
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
