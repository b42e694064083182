//! Execution order and slot wiring of a compiled device graph.
//!
//! Both reference devices turn a [`DeviceGraphDesc`] into an
//! [`ExecutionPlan`] at `compile_graph` time and interpret it on every
//! dispatch.

use basalt_core::shape::align_up;
use basalt_core::{
    BindingProperties, BindingTable, BufferBinding, DeviceGraphDesc, Error, OperatorDescriptor,
    OperatorHandle, Result,
};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::sync::Arc;

/// Where a node slot reads or writes its tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TensorRef {
    GraphInput(usize),
    GraphOutput(usize),
    Intermediate(usize),
}

#[derive(Debug)]
pub(crate) struct PlannedNode {
    pub name: String,
    pub descriptor: Arc<OperatorDescriptor>,
    pub inputs: Vec<TensorRef>,
    pub outputs: Vec<TensorRef>,
}

/// Range of the persistent resource holding one device-owned graph input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PersistentSlot {
    pub graph_input: usize,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug)]
pub(crate) struct ExecutionPlan {
    /// Nodes in execution order.
    pub nodes: Vec<PlannedNode>,
    pub persistent: Vec<PersistentSlot>,
    pub properties: BindingProperties,
}

fn connect(
    slots: &mut [Option<TensorRef>],
    node: &str,
    what: &str,
    slot: usize,
    target: TensorRef,
) -> Result<()> {
    let entry = slots.get_mut(slot).ok_or_else(|| {
        Error::Compile(format!("node '{node}' has no {what} slot {slot}"))
    })?;
    if entry.is_some() {
        return Err(Error::Compile(format!(
            "node '{node}' {what} slot {slot} is connected twice"
        )));
    }
    *entry = Some(target);
    Ok(())
}

fn collect_slots(slots: Vec<Option<TensorRef>>, node: &str, what: &str) -> Result<Vec<TensorRef>> {
    slots
        .into_iter()
        .enumerate()
        .map(|(slot, target)| {
            target.ok_or_else(|| {
                Error::Compile(format!("node '{node}' {what} slot {slot} is not connected"))
            })
        })
        .collect()
}

impl ExecutionPlan {
    /// Validate the wiring of `desc` and order its nodes.
    ///
    /// `lookup` resolves operator handles to descriptors. Device-owned graph
    /// inputs are laid out in the persistent resource at multiples of
    /// `persistent_alignment`.
    pub fn build(
        desc: &DeviceGraphDesc,
        lookup: impl Fn(OperatorHandle) -> Option<Arc<OperatorDescriptor>>,
        persistent_alignment: u64,
    ) -> Result<Self> {
        let mut inputs = Vec::with_capacity(desc.nodes.len());
        let mut outputs = Vec::with_capacity(desc.nodes.len());
        let mut descriptors = Vec::with_capacity(desc.nodes.len());
        for node in &desc.nodes {
            let descriptor = lookup(node.operator).ok_or_else(|| {
                Error::Compile(format!(
                    "node '{}' uses unknown operator {:?}",
                    node.name, node.operator
                ))
            })?;
            inputs.push(vec![None; descriptor.input_count()]);
            outputs.push(vec![None; descriptor.output_count()]);
            descriptors.push(descriptor);
        }

        let node_name = |index: usize| -> Result<&str> {
            desc.nodes
                .get(index)
                .map(|n| n.name.as_str())
                .ok_or_else(|| Error::Compile(format!("edge references missing node {index}")))
        };

        let mut graph = DiGraph::<usize, ()>::with_capacity(desc.nodes.len(), desc.intermediate_edges.len());
        let indices: Vec<_> = (0..desc.nodes.len()).map(|i| graph.add_node(i)).collect();

        let mut persistent: Vec<PersistentSlot> = Vec::new();
        let mut persistent_size = 0;
        for edge in &desc.input_edges {
            let name = node_name(edge.to_node)?;
            if edge.graph_input >= desc.input_count {
                return Err(Error::Compile(format!(
                    "edge '{}' reads graph input {} of {}",
                    edge.name, edge.graph_input, desc.input_count
                )));
            }
            connect(
                &mut inputs[edge.to_node],
                name,
                "input",
                edge.to_slot,
                TensorRef::GraphInput(edge.graph_input),
            )?;

            let tensor = descriptors[edge.to_node].inputs()[edge.to_slot];
            if tensor.owned_by_device
                && !persistent.iter().any(|s| s.graph_input == edge.graph_input)
            {
                let offset = align_up(persistent_size, persistent_alignment);
                persistent.push(PersistentSlot {
                    graph_input: edge.graph_input,
                    offset,
                    size: tensor.total_size_bytes,
                });
                persistent_size = offset + tensor.total_size_bytes;
            }
        }

        let mut graph_outputs = vec![false; desc.output_count];
        for edge in &desc.output_edges {
            let name = node_name(edge.from_node)?;
            match graph_outputs.get_mut(edge.graph_output) {
                Some(seen) if !*seen => *seen = true,
                _ => {
                    return Err(Error::Compile(format!(
                        "edge '{}' writes graph output {} of {} twice or out of range",
                        edge.name, edge.graph_output, desc.output_count
                    )))
                }
            }
            connect(
                &mut outputs[edge.from_node],
                name,
                "output",
                edge.from_slot,
                TensorRef::GraphOutput(edge.graph_output),
            )?;
        }
        if let Some(missing) = graph_outputs.iter().position(|seen| !seen) {
            return Err(Error::Compile(format!("graph output {missing} has no producer")));
        }

        for (index, edge) in desc.intermediate_edges.iter().enumerate() {
            let from = node_name(edge.from_node)?;
            let to = node_name(edge.to_node)?;
            connect(
                &mut outputs[edge.from_node],
                from,
                "output",
                edge.from_slot,
                TensorRef::Intermediate(index),
            )?;
            connect(
                &mut inputs[edge.to_node],
                to,
                "input",
                edge.to_slot,
                TensorRef::Intermediate(index),
            )?;
            graph.add_edge(indices[edge.from_node], indices[edge.to_node], ());
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let node = graph[cycle.node_id()];
            Error::Compile(format!(
                "graph has a cycle through node '{}'",
                desc.nodes[node].name
            ))
        })?;

        let mut planned: Vec<Option<PlannedNode>> = Vec::with_capacity(desc.nodes.len());
        for (i, ((descriptor, node_inputs), node_outputs)) in
            descriptors.into_iter().zip(inputs).zip(outputs).enumerate()
        {
            let name = &desc.nodes[i].name;
            planned.push(Some(PlannedNode {
                name: name.clone(),
                descriptor,
                inputs: collect_slots(node_inputs, name, "input")?,
                outputs: collect_slots(node_outputs, name, "output")?,
            }));
        }
        let nodes = order
            .into_iter()
            .filter_map(|index| planned[graph[index]].take())
            .collect();

        Ok(Self {
            nodes,
            persistent,
            properties: BindingProperties {
                persistent_size,
                temporary_size: 0,
                initializer_temporary_size: 0,
                input_count: desc.input_count,
                output_count: desc.output_count,
                intermediate_count: desc.intermediate_edges.len(),
            },
        })
    }

    pub fn persistent_slot(&self, graph_input: usize) -> Option<&PersistentSlot> {
        self.persistent.iter().find(|s| s.graph_input == graph_input)
    }

    /// Buffer range a slot reads or writes during a dispatch.
    pub fn resolve(&self, tensor: TensorRef, bindings: &BindingTable) -> Result<BufferBinding> {
        let bound = |slots: &[Option<BufferBinding>], what: &str, index: usize| {
            slots.get(index).copied().flatten().ok_or_else(|| {
                Error::Device(format!("{what} {index} has no buffer bound"))
            })
        };
        match tensor {
            TensorRef::GraphInput(index) => match self.persistent_slot(index) {
                Some(slot) => {
                    let persistent = bindings.persistent.ok_or_else(|| {
                        Error::Device("persistent resource is not bound".to_string())
                    })?;
                    if slot.offset + slot.size > persistent.size {
                        return Err(Error::Device(format!(
                            "persistent resource of {} bytes cannot hold graph input {index}",
                            persistent.size
                        )));
                    }
                    Ok(BufferBinding {
                        buffer: persistent.buffer,
                        offset: persistent.offset + slot.offset,
                        size: slot.size,
                    })
                }
                None => bound(&bindings.inputs, "graph input", index),
            },
            TensorRef::GraphOutput(index) => bound(&bindings.outputs, "graph output", index),
            TensorRef::Intermediate(index) => {
                bound(&bindings.intermediates, "intermediate", index)
            }
        }
    }
}
