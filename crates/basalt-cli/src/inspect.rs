//! Model inspection.

use anyhow::{Context, Result};
use basalt_compiler::{compile_model, CompiledGraph, EdgeKind};
use basalt_model::{Model, TensorShape};
use basalt_runtime::{Runtime, RuntimeConfig};
use std::path::Path;

/// Print the tensor table, the node table and the edges the compiler
/// resolves for them.
pub fn inspect_model(path: &Path) -> Result<()> {
    let model = basalt_model::load_model(path)
        .with_context(|| format!("Failed to load model from {}", path.display()))?;

    println!("Model: {}", model.metadata.name);
    if !model.metadata.producer_name.is_empty() {
        println!("  Producer: {}", model.metadata.producer_name);
    }

    print_tensors(&model);
    print_nodes(&model);

    let runtime = Runtime::new(RuntimeConfig::default())?;
    let graph = compile_model(&model, runtime.registry(), runtime.device())
        .context("Failed to compile model")?;
    print_edges(&model, &graph);
    Ok(())
}

fn format_shape(shape: &TensorShape) -> String {
    match shape {
        TensorShape::Static(dims) => format!("{:?}", dims),
        TensorShape::Dynamic(dims) => format!("{:?}", dims),
        TensorShape::Unknown => "?".to_string(),
    }
}

fn print_tensors(model: &Model) {
    println!("\nTensors ({}):", model.tensors.len());
    for (i, tensor) in model.tensors.iter().enumerate() {
        println!(
            "  [{i}] {} {:?} {:?} {}",
            tensor.name,
            tensor.kind,
            tensor.dtype,
            format_shape(&tensor.shape)
        );
    }
}

fn print_nodes(model: &Model) {
    println!("\nNodes ({}):", model.nodes.len());
    for (i, node) in model.nodes.iter().enumerate() {
        let names = |ids: &[usize]| {
            ids.iter()
                .map(|&id| model.tensors.get(id).map_or("?", |t| t.name.as_str()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "  [{i}] {} ({}): ({}) -> ({})",
            node.display_name(),
            node.op_type,
            names(&node.inputs),
            names(&node.outputs)
        );
        let mut attributes: Vec<_> = node.attributes.iter().collect();
        attributes.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in attributes {
            println!("      {key}: {value:?}");
        }
    }
}

fn print_edges(model: &Model, graph: &CompiledGraph) {
    println!("\nEdges ({}):", graph.edges().len());
    let node = |id: Option<usize>| {
        id.and_then(|id| graph.nodes().get(id))
            .map_or("graph".to_string(), |n| n.debug_name.clone())
    };
    for edge in graph.edges() {
        let tensor = &model.tensors[edge.tensor_index].name;
        let kind = match edge.kind {
            EdgeKind::Input => "input",
            EdgeKind::Output => "output",
            EdgeKind::Intermediate => "intermediate",
        };
        println!(
            "  {kind:<12} {tensor}: {}:{} -> {}:{}",
            node(edge.src_node),
            edge.src_slot.map_or("-".to_string(), |s| s.to_string()),
            node(edge.dst_node),
            edge.dst_slot.map_or("-".to_string(), |s| s.to_string()),
        );
    }
}
