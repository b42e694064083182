//! Compiled graph and the device objects it owns.

use crate::edge::{Edge, EdgeKind};
use basalt_core::{Accelerator, GraphHandle, Operator, OperatorHandle, TensorDesc};
use std::sync::Arc;

/// Device operator released when dropped.
pub(crate) struct DeviceOperator {
    device: Arc<dyn Accelerator>,
    handle: OperatorHandle,
}

impl DeviceOperator {
    pub(crate) fn new(device: Arc<dyn Accelerator>, handle: OperatorHandle) -> Self {
        Self { device, handle }
    }
}

impl Drop for DeviceOperator {
    fn drop(&mut self) {
        self.device.release_operator(self.handle);
    }
}

/// Compiled device graph released when dropped.
pub(crate) struct DeviceGraph {
    device: Arc<dyn Accelerator>,
    handle: GraphHandle,
}

impl DeviceGraph {
    pub(crate) fn new(device: Arc<dyn Accelerator>, handle: GraphHandle) -> Self {
        Self { device, handle }
    }
}

impl Drop for DeviceGraph {
    fn drop(&mut self) {
        self.device.release_graph(self.handle);
    }
}

/// One initialized operator of a compiled graph.
pub struct OperatorNode {
    pub operator: Box<dyn Operator>,
    /// Model tensor indices read, in input slot order.
    pub inputs: Vec<usize>,
    /// Model tensor indices written, in output slot order.
    pub outputs: Vec<usize>,
    pub debug_name: String,
    pub(crate) device_operator: DeviceOperator,
}

impl OperatorNode {
    pub fn device_operator(&self) -> OperatorHandle {
        self.device_operator.handle
    }
}

impl std::fmt::Debug for OperatorNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorNode")
            .field("operator", &self.operator.name())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("debug_name", &self.debug_name)
            .finish()
    }
}

/// A model compiled against one accelerator.
///
/// Owns the device graph and every device operator; dropping it releases
/// them on the accelerator (graph first).
pub struct CompiledGraph {
    pub(crate) device_graph: DeviceGraph,
    pub(crate) nodes: Vec<OperatorNode>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) tensors: Vec<TensorDesc>,
    pub(crate) model_inputs: Vec<usize>,
    pub(crate) weights: Vec<usize>,
    pub(crate) model_outputs: Vec<usize>,
}

impl CompiledGraph {
    pub fn device(&self) -> &Arc<dyn Accelerator> {
        &self.device_graph.device
    }

    pub fn graph_handle(&self) -> GraphHandle {
        self.device_graph.handle
    }

    pub fn nodes(&self) -> &[OperatorNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn tensors(&self) -> &[TensorDesc] {
        &self.tensors
    }

    pub fn tensor(&self, index: usize) -> Option<&TensorDesc> {
        self.tensors.get(index)
    }

    /// Tensor indices of the model inputs, in declared order.
    pub fn model_inputs(&self) -> &[usize] {
        &self.model_inputs
    }

    /// Tensor indices of the weights. Their graph input slots follow the
    /// model inputs.
    pub fn weights(&self) -> &[usize] {
        &self.weights
    }

    /// Tensor indices of the model outputs, in declared order.
    pub fn model_outputs(&self) -> &[usize] {
        &self.model_outputs
    }

    /// Number of graph input slots (model inputs plus weights).
    pub fn input_count(&self) -> usize {
        self.model_inputs.len() + self.weights.len()
    }

    pub fn output_count(&self) -> usize {
        self.model_outputs.len()
    }

    /// Intermediate edges in the order of the binding table's
    /// intermediate slots.
    pub fn intermediate_edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Intermediate)
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("device", &self.device().name())
            .field("graph", &self.device_graph.handle)
            .field("nodes", &self.nodes)
            .field("edges", &self.edges.len())
            .finish()
    }
}
