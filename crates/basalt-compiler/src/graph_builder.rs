//! Two-pass edge resolution.
//!
//! Boundary edges are seeded first, then nodes are wired in model order.
//! Every tensor index maps to at most one edge, found through a hash map, so
//! wiring never needs an adjacency structure.

use crate::edge::{Edge, EdgeKind};
use basalt_core::{
    DeviceGraphDesc, DeviceNode, Error, InputEdgeDesc, IntermediateEdgeDesc, OutputEdgeDesc,
    Result, TensorDesc,
};
use std::collections::HashMap;

/// Builds the edge set of a graph.
pub struct GraphBuilder<'a> {
    tensors: &'a [TensorDesc],
    edges: Vec<Edge>,
    edge_by_tensor: HashMap<usize, usize>,
    node_names: Vec<String>,
    input_count: usize,
    output_count: usize,
}

impl<'a> GraphBuilder<'a> {
    /// Create a builder over the model's tensor table.
    pub fn new(tensors: &'a [TensorDesc]) -> Self {
        Self {
            tensors,
            edges: Vec::new(),
            edge_by_tensor: HashMap::new(),
            node_names: Vec::new(),
            input_count: 0,
            output_count: 0,
        }
    }

    fn tensor_name(&self, tensor: usize) -> &str {
        self.tensors
            .get(tensor)
            .map(|t| t.name.as_str())
            .unwrap_or("<unknown>")
    }

    fn check_tensor(&self, tensor: usize) -> Result<()> {
        if tensor >= self.tensors.len() {
            return Err(Error::InvalidModel(format!(
                "tensor index {} out of range ({} tensors)",
                tensor,
                self.tensors.len()
            )));
        }
        Ok(())
    }

    fn insert_edge(&mut self, edge: Edge) -> Result<()> {
        let tensor = edge.tensor_index;
        if let Some(&existing) = self.edge_by_tensor.get(&tensor) {
            return Err(Error::EdgeConflict(format!(
                "tensor '{}' already has a {:?} edge, cannot add a {:?} edge",
                self.tensor_name(tensor),
                self.edges[existing].kind,
                edge.kind
            )));
        }
        self.edge_by_tensor.insert(tensor, self.edges.len());
        self.edges.push(edge);
        Ok(())
    }

    /// Seed an input edge. Model inputs come first, then weights; the slot
    /// is the position in that combined order.
    pub fn add_input(&mut self, tensor: usize) -> Result<usize> {
        self.check_tensor(tensor)?;
        let slot = self.input_count;
        self.insert_edge(Edge::input(tensor, slot))?;
        self.input_count += 1;
        Ok(slot)
    }

    /// Seed an output edge.
    pub fn add_output(&mut self, tensor: usize) -> Result<usize> {
        self.check_tensor(tensor)?;
        let slot = self.output_count;
        self.insert_edge(Edge::output(tensor, slot))?;
        self.output_count += 1;
        Ok(slot)
    }

    /// Wire a node's inputs and outputs. Returns the node index.
    ///
    /// Every input must already have an edge. Outputs attach to a seeded
    /// output edge or open a new intermediate edge.
    pub fn add_node(&mut self, inputs: &[usize], outputs: &[usize], name: &str) -> Result<usize> {
        let node = self.node_names.len();

        for (slot, &tensor) in inputs.iter().enumerate() {
            self.check_tensor(tensor)?;
            let Some(&edge) = self.edge_by_tensor.get(&tensor) else {
                return Err(Error::DanglingInput {
                    tensor: self.tensor_name(tensor).to_string(),
                    node: name.to_string(),
                });
            };
            self.connect_dst(edge, node, slot, name)?;
        }

        for (slot, &tensor) in outputs.iter().enumerate() {
            self.check_tensor(tensor)?;
            match self.edge_by_tensor.get(&tensor) {
                Some(&edge) => self.connect_src(edge, node, slot, name)?,
                None => self.insert_edge(Edge::intermediate(tensor, node, slot))?,
            }
        }

        tracing::debug!(node, name, inputs = inputs.len(), outputs = outputs.len(), "wired node");
        self.node_names.push(name.to_string());
        Ok(node)
    }

    fn connect_dst(&mut self, edge: usize, node: usize, slot: usize, name: &str) -> Result<()> {
        let current = &mut self.edges[edge];
        match (current.dst_node, current.dst_slot) {
            (None, None) => {
                current.dst_node = Some(node);
                current.dst_slot = Some(slot);
                Ok(())
            }
            (Some(n), Some(s)) if n == node && s == slot => Ok(()),
            _ => {
                let (kind, tensor) = (current.kind, current.tensor_index);
                Err(Error::EdgeConflict(format!(
                    "{:?} edge of tensor '{}' already has a consumer, '{}' input {} cannot read it",
                    kind,
                    self.tensor_name(tensor),
                    name,
                    slot
                )))
            }
        }
    }

    fn connect_src(&mut self, edge: usize, node: usize, slot: usize, name: &str) -> Result<()> {
        let current = &mut self.edges[edge];
        match (current.src_node, current.src_slot) {
            (None, None) => {
                current.src_node = Some(node);
                current.src_slot = Some(slot);
                Ok(())
            }
            (Some(n), Some(s)) if n == node && s == slot => Ok(()),
            _ => {
                let (kind, tensor) = (current.kind, current.tensor_index);
                Err(Error::EdgeConflict(format!(
                    "{:?} edge of tensor '{}' already has a producer, '{}' output {} cannot write it",
                    kind,
                    self.tensor_name(tensor),
                    name,
                    slot
                )))
            }
        }
    }

    /// Validate that every edge is fully resolved and return the edges.
    pub fn finish(self) -> Result<ResolvedGraph> {
        for edge in &self.edges {
            let missing = edge.missing_endpoints();
            if !missing.is_empty() {
                return Err(Error::DanglingGraph(format!(
                    "{:?} edge of tensor '{}' is missing {}",
                    edge.kind,
                    self.tensor_name(edge.tensor_index),
                    missing.join(", ")
                )));
            }
        }

        Ok(ResolvedGraph {
            edges: self.edges,
            node_names: self.node_names,
            input_count: self.input_count,
            output_count: self.output_count,
        })
    }
}

/// Fully resolved edge set.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    pub edges: Vec<Edge>,
    pub node_names: Vec<String>,
    pub input_count: usize,
    pub output_count: usize,
}

impl ResolvedGraph {
    /// Edges of one kind, in creation order.
    pub fn edges_of(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// Translate into the accelerator's graph description.
    ///
    /// `nodes` supplies the device operator of each node, in node order.
    pub fn device_desc(&self, nodes: Vec<DeviceNode>, tensors: &[TensorDesc]) -> DeviceGraphDesc {
        let name = |edge: &Edge| {
            tensors
                .get(edge.tensor_index)
                .map(|t| t.name.clone())
                .unwrap_or_default()
        };
        let mut desc = DeviceGraphDesc {
            input_count: self.input_count,
            output_count: self.output_count,
            nodes,
            ..Default::default()
        };

        // All fields are present after `finish`.
        for edge in &self.edges {
            match (edge.kind, edge.src_node, edge.src_slot, edge.dst_node, edge.dst_slot) {
                (EdgeKind::Input, _, Some(graph_input), Some(to_node), Some(to_slot)) => {
                    desc.input_edges.push(InputEdgeDesc {
                        graph_input,
                        to_node,
                        to_slot,
                        name: name(edge),
                    });
                }
                (EdgeKind::Output, Some(from_node), Some(from_slot), _, Some(graph_output)) => {
                    desc.output_edges.push(OutputEdgeDesc {
                        from_node,
                        from_slot,
                        graph_output,
                        name: name(edge),
                    });
                }
                (
                    EdgeKind::Intermediate,
                    Some(from_node),
                    Some(from_slot),
                    Some(to_node),
                    Some(to_slot),
                ) => {
                    desc.intermediate_edges.push(IntermediateEdgeDesc {
                        from_node,
                        from_slot,
                        to_node,
                        to_slot,
                        name: name(edge),
                    });
                }
                _ => {}
            }
        }
        desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_model::DataType;

    fn tensors(names: &[&str]) -> Vec<TensorDesc> {
        names
            .iter()
            .map(|n| TensorDesc::new(*n, DataType::F32, &[2]))
            .collect()
    }

    #[test]
    fn test_chain_resolves() {
        // x -> Relu -> t -> Neg -> y
        let tensors = tensors(&["x", "t", "y"]);
        let mut builder = GraphBuilder::new(&tensors);
        builder.add_input(0).unwrap();
        builder.add_output(2).unwrap();
        builder.add_node(&[0], &[1], "relu").unwrap();
        builder.add_node(&[1], &[2], "neg").unwrap();

        let graph = builder.finish().unwrap();
        assert_eq!(graph.edges.len(), 3);
        assert!(graph.edges.iter().all(Edge::is_resolved));

        let t = graph.edges_of(EdgeKind::Intermediate).next().unwrap();
        assert_eq!((t.src_node, t.dst_node), (Some(0), Some(1)));
    }

    #[test]
    fn test_input_before_producer_is_dangling() {
        let tensors = tensors(&["x", "t", "y"]);
        let mut builder = GraphBuilder::new(&tensors);
        builder.add_input(0).unwrap();
        builder.add_output(2).unwrap();

        let err = builder.add_node(&[1], &[2], "neg").unwrap_err();
        assert!(matches!(err, Error::DanglingInput { ref tensor, .. } if tensor == "t"));
    }

    #[test]
    fn test_unconsumed_intermediate_is_dangling_graph() {
        let tensors = tensors(&["x", "t", "y"]);
        let mut builder = GraphBuilder::new(&tensors);
        builder.add_input(0).unwrap();
        builder.add_output(2).unwrap();
        builder.add_node(&[0], &[1, 2], "split").unwrap();

        // The output edge is resolved but nothing reads `t`.
        assert!(matches!(builder.finish(), Err(Error::DanglingGraph(_))));
    }

    #[test]
    fn test_unproduced_output_is_dangling_graph() {
        let tensors = tensors(&["x", "t", "y"]);
        let mut builder = GraphBuilder::new(&tensors);
        builder.add_input(0).unwrap();
        builder.add_output(2).unwrap();
        builder.add_node(&[0], &[1], "relu").unwrap();

        let err = builder.finish().unwrap_err();
        assert!(err.to_string().contains("src_node"));
    }

    #[test]
    fn test_duplicate_boundary_edge() {
        let tensors = tensors(&["x"]);
        let mut builder = GraphBuilder::new(&tensors);
        builder.add_input(0).unwrap();
        assert!(matches!(builder.add_output(0), Err(Error::EdgeConflict(_))));
    }

    #[test]
    fn test_second_consumer_conflicts() {
        let tensors = tensors(&["x", "a", "b"]);
        let mut builder = GraphBuilder::new(&tensors);
        builder.add_input(0).unwrap();
        builder.add_output(1).unwrap();
        builder.add_output(2).unwrap();
        builder.add_node(&[0], &[1], "relu").unwrap();

        assert!(matches!(
            builder.add_node(&[0], &[2], "neg"),
            Err(Error::EdgeConflict(_))
        ));
    }

    #[test]
    fn test_second_producer_conflicts() {
        let tensors = tensors(&["x", "y", "z"]);
        let mut builder = GraphBuilder::new(&tensors);
        builder.add_input(0).unwrap();
        builder.add_input(2).unwrap();
        builder.add_output(1).unwrap();
        builder.add_node(&[0], &[1], "relu").unwrap();

        assert!(matches!(
            builder.add_node(&[2], &[1], "neg"),
            Err(Error::EdgeConflict(_))
        ));
    }

    #[test]
    fn test_writing_a_graph_input_conflicts() {
        let tensors = tensors(&["x", "w"]);
        let mut builder = GraphBuilder::new(&tensors);
        builder.add_input(0).unwrap();
        builder.add_input(1).unwrap();

        assert!(matches!(
            builder.add_node(&[0], &[1], "relu"),
            Err(Error::EdgeConflict(_))
        ));
    }

    #[test]
    fn test_device_desc_groups_edges() {
        let tensors = tensors(&["x", "w", "t", "y"]);
        let mut builder = GraphBuilder::new(&tensors);
        builder.add_input(0).unwrap();
        builder.add_input(1).unwrap();
        builder.add_output(3).unwrap();
        builder.add_node(&[0, 1], &[2], "add").unwrap();
        builder.add_node(&[2], &[3], "relu").unwrap();
        let graph = builder.finish().unwrap();

        let nodes = (0..2)
            .map(|i| DeviceNode {
                operator: basalt_core::OperatorHandle(i),
                name: format!("n{i}"),
            })
            .collect();
        let desc = graph.device_desc(nodes, &tensors);

        assert_eq!(desc.input_count, 2);
        assert_eq!(desc.input_edges.len(), 2);
        assert_eq!(desc.input_edges[1].graph_input, 1);
        assert_eq!(desc.input_edges[1].to_slot, 1);
        assert_eq!(desc.output_edges[0].from_node, 1);
        assert_eq!(desc.intermediate_edges[0].name, "t");
    }
}
