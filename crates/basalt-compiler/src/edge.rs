//! Tensor edges of a compiled graph.

/// Where a tensor enters, leaves or moves inside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Graph input (model input or weight) feeding a node.
    Input,
    /// Node output leaving the graph.
    Output,
    /// Node output feeding another node.
    Intermediate,
}

/// Flow of one tensor.
///
/// An input edge knows its graph slot (`src_slot`) from the start and gains
/// a consumer during wiring. An output edge knows its graph slot
/// (`dst_slot`) and gains a producer. An intermediate edge starts with its
/// producer and gains a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub kind: EdgeKind,
    pub tensor_index: usize,
    pub src_node: Option<usize>,
    pub src_slot: Option<usize>,
    pub dst_node: Option<usize>,
    pub dst_slot: Option<usize>,
}

impl Edge {
    pub fn input(tensor_index: usize, graph_slot: usize) -> Self {
        Self {
            kind: EdgeKind::Input,
            tensor_index,
            src_node: None,
            src_slot: Some(graph_slot),
            dst_node: None,
            dst_slot: None,
        }
    }

    pub fn output(tensor_index: usize, graph_slot: usize) -> Self {
        Self {
            kind: EdgeKind::Output,
            tensor_index,
            src_node: None,
            src_slot: None,
            dst_node: None,
            dst_slot: Some(graph_slot),
        }
    }

    pub fn intermediate(tensor_index: usize, src_node: usize, src_slot: usize) -> Self {
        Self {
            kind: EdgeKind::Intermediate,
            tensor_index,
            src_node: Some(src_node),
            src_slot: Some(src_slot),
            dst_node: None,
            dst_slot: None,
        }
    }

    /// Names of the fields this edge's kind requires but that are unset.
    pub fn missing_endpoints(&self) -> Vec<&'static str> {
        let required = match self.kind {
            EdgeKind::Input => [
                ("src_slot", self.src_slot),
                ("dst_node", self.dst_node),
                ("dst_slot", self.dst_slot),
            ]
            .to_vec(),
            EdgeKind::Output => [
                ("src_node", self.src_node),
                ("src_slot", self.src_slot),
                ("dst_slot", self.dst_slot),
            ]
            .to_vec(),
            EdgeKind::Intermediate => [
                ("src_node", self.src_node),
                ("src_slot", self.src_slot),
                ("dst_node", self.dst_node),
                ("dst_slot", self.dst_slot),
            ]
            .to_vec(),
        };
        required
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn is_resolved(&self) -> bool {
        self.missing_endpoints().is_empty()
    }
}
