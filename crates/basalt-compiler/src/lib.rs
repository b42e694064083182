//! Graph compiler for basalt.
//!
//! Turns a validated [`Model`] into a [`CompiledGraph`] bound to one
//! accelerator:
//! 1. **Tensors** - every tensor becomes a concrete [`TensorDesc`]
//! 2. **Boundary edges** - model inputs, then weights, then outputs are seeded
//! 3. **Wiring** - each node is looked up, initialized, created on the device
//!    and connected to the edges of its inputs and outputs
//! 4. **Validation** - every edge must be fully resolved
//! 5. **Device compilation** - the edge set is handed to the accelerator
//!
//! Nodes must appear in the model in an order where every input is produced
//! before it is consumed.
//!
//! # Example
//!
//! ```no_run
//! use basalt_compiler::compile_model;
//! use basalt_core::Accelerator;
//! use basalt_operators::{CatalogOptions, core_operator_registry};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let device: Arc<dyn Accelerator> = unimplemented!();
//! let model = basalt_model::load_model("model.json")?;
//! let registry = core_operator_registry(&CatalogOptions::default());
//! let graph = compile_model(&model, &registry, &device)?;
//!
//! println!("Compiled {} operators", graph.nodes().len());
//! # Ok(())
//! # }
//! ```

pub mod compiled;
pub mod edge;
pub mod graph_builder;

pub use compiled::{CompiledGraph, OperatorNode};
pub use edge::{Edge, EdgeKind};
pub use graph_builder::{GraphBuilder, ResolvedGraph};

use basalt_core::{
    Accelerator, AttributeMap, DeviceNode, Error, OperatorRegistry, Result, TensorDesc,
};
use basalt_model::Model;
use compiled::{DeviceGraph, DeviceOperator};
use std::sync::Arc;

/// Compile `model` against `device` using the operators in `registry`.
///
/// Any failure aborts the whole compilation; device objects created up to
/// that point are released.
#[tracing::instrument(skip_all, fields(model = %model.metadata.name, device = device.name()))]
pub fn compile_model(
    model: &Model,
    registry: &OperatorRegistry,
    device: &Arc<dyn Accelerator>,
) -> Result<CompiledGraph> {
    model.validate()?;

    let tensors = model
        .tensors
        .iter()
        .map(TensorDesc::from_info)
        .collect::<Result<Vec<_>>>()?;

    let mut builder = GraphBuilder::new(&tensors);
    for &tensor in model.inputs.iter().chain(&model.weights) {
        builder.add_input(tensor)?;
    }
    for &tensor in &model.outputs {
        builder.add_output(tensor)?;
    }

    let mut nodes = Vec::with_capacity(model.nodes.len());
    for node in &model.nodes {
        let name = node.display_name();
        let factory = registry.find(&node.op_type).ok_or_else(|| {
            Error::UnknownOperator(format!("{} (node '{}')", node.op_type, name))
        })?;

        let gather = |ids: &[usize]| -> Vec<TensorDesc> {
            ids.iter().map(|&i| tensors[i].clone()).collect()
        };
        let inputs = gather(&node.inputs);
        let outputs = gather(&node.outputs);

        let mut operator = factory();
        operator
            .initialize(&inputs, &outputs, &AttributeMap::new(&node.attributes))
            .inspect_err(|e| tracing::warn!(node = name, op = %node.op_type, "{e}"))?;
        let descriptor = operator
            .descriptor()
            .ok_or_else(|| Error::op_init(&node.op_type, "no device descriptor after initialize"))?;
        tracing::debug!(node = name, descriptor = %descriptor.label(), "initialized operator");

        let handle = device.create_operator(descriptor)?;
        let device_operator = DeviceOperator::new(Arc::clone(device), handle);

        builder.add_node(&node.inputs, &node.outputs, name)?;
        nodes.push(OperatorNode {
            operator,
            inputs: node.inputs.clone(),
            outputs: node.outputs.clone(),
            debug_name: name.to_string(),
            device_operator,
        });
    }

    let resolved = builder.finish()?;
    let device_nodes = nodes
        .iter()
        .map(|n| DeviceNode {
            operator: n.device_operator(),
            name: n.debug_name.clone(),
        })
        .collect();
    let desc = resolved.device_desc(device_nodes, &tensors);

    let handle = device.compile_graph(&desc).map_err(|e| match e {
        Error::Compile(_) => e,
        other => Error::Compile(other.to_string()),
    })?;

    tracing::info!(
        nodes = nodes.len(),
        inputs = desc.input_count,
        outputs = desc.output_count,
        intermediates = desc.intermediate_edges.len(),
        "compiled model"
    );

    Ok(CompiledGraph {
        device_graph: DeviceGraph::new(Arc::clone(device), handle),
        nodes,
        edges: resolved.edges,
        tensors,
        model_inputs: model.inputs.clone(),
        weights: model.weights.clone(),
        model_outputs: model.outputs.clone(),
    })
}
