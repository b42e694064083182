//! Property-based tests for edge resolution.
//!
//! Generates random acyclic models in which every tensor is consumed at
//! most once and checks that compilation resolves one edge per tensor.

mod common;

use basalt_compiler::{EdgeKind, compile_model};
use basalt_core::Accelerator;
use basalt_model::Model;
use basalt_operators::{CatalogOptions, core_operator_registry};
use common::*;
use proptest::prelude::*;
use std::sync::Arc;

const SHAPE: &[usize] = &[2];

/// Abstract graph: tensor ids are assigned in creation order.
#[derive(Debug)]
struct GraphPlan {
    inputs: usize,
    tensors: usize,
    nodes: Vec<(&'static str, Vec<usize>, usize)>,
    outputs: Vec<usize>,
}

/// Each step consumes one or two unconsumed tensors and produces one.
/// Graph inputs left over at the end get a `Neg` each; whatever remains
/// unconsumed becomes a model output.
fn plan_graph(inputs: usize, steps: &[(bool, usize, usize)]) -> GraphPlan {
    let mut pool: Vec<usize> = (0..inputs).collect();
    let mut next = inputs;
    let mut nodes = Vec::new();

    let mut consume = |pool: &mut Vec<usize>, op: &'static str, operands: Vec<usize>| {
        nodes.push((op, operands, next));
        pool.push(next);
        next += 1;
    };

    for &(binary, a, b) in steps {
        let first = pool.remove(a % pool.len());
        if binary && !pool.is_empty() {
            let second = pool.remove(b % pool.len());
            consume(&mut pool, "Add", vec![first, second]);
        } else {
            consume(&mut pool, "Neg", vec![first]);
        }
    }
    while let Some(pos) = pool.iter().position(|&t| t < inputs) {
        let t = pool.remove(pos);
        consume(&mut pool, "Neg", vec![t]);
    }

    GraphPlan {
        inputs,
        tensors: next,
        nodes,
        outputs: pool,
    }
}

fn build_model(plan: &GraphPlan) -> Model {
    let mut model = Model::new();
    for id in 0..plan.tensors {
        let name = format!("t{id}");
        let index = if id < plan.inputs {
            input(&mut model, &name, SHAPE)
        } else if plan.outputs.contains(&id) {
            output(&mut model, &name, SHAPE)
        } else {
            intermediate(&mut model, &name, SHAPE)
        };
        assert_eq!(index, id);
    }
    for (i, (op, operands, result)) in plan.nodes.iter().enumerate() {
        model.add_node(node(op, &format!("n{i}"), operands, &[*result]));
    }
    model
}

fn graph_strategy() -> impl Strategy<Value = GraphPlan> {
    (
        1usize..5,
        prop::collection::vec((any::<bool>(), 0usize..8, 0usize..8), 0..10),
    )
        .prop_map(|(inputs, steps)| plan_graph(inputs, &steps))
}

proptest! {
    #[test]
    fn test_valid_models_resolve_every_edge(plan in graph_strategy()) {
        let model = build_model(&plan);
        let device: Arc<dyn Accelerator> = Arc::new(MockAccelerator::default());
        let registry = core_operator_registry(&CatalogOptions::default());

        let graph = compile_model(&model, &registry, &device).unwrap();

        let count = |kind: EdgeKind| graph.edges().iter().filter(|e| e.kind == kind).count();
        prop_assert_eq!(graph.edges().len(), plan.tensors);
        prop_assert_eq!(count(EdgeKind::Input), plan.inputs);
        prop_assert_eq!(count(EdgeKind::Output), plan.outputs.len());
        prop_assert_eq!(
            count(EdgeKind::Intermediate),
            plan.tensors - plan.inputs - plan.outputs.len()
        );
        prop_assert!(graph.edges().iter().all(|e| e.is_resolved()));
        prop_assert_eq!(graph.nodes().len(), plan.nodes.len());
    }
}

#[test]
fn test_leftover_inputs_are_consumed() {
    let plan = plan_graph(3, &[(true, 0, 0)]);
    // Add(t0, t1) -> t3, then Neg(t2) -> t4.
    assert_eq!(plan.nodes.len(), 2);
    assert_eq!(plan.outputs, vec![3, 4]);
}
