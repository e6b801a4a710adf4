//! Property tests for the DAG layout engines.

use float_cmp::approx_eq;
use proptest::{prelude::*, test_runner::TestCaseError};

use strata::{
    StrataError,
    identifier::Id,
    layout::{DagNode, EngineBuilder, LayoutEngine, compute_coordinates},
};

fn node_id(i: usize) -> Id {
    Id::new(&format!("n{i}"))
}

/// Acyclic inputs: a node only lists parents of a lower index.
fn dag_strategy() -> impl Strategy<Value = Vec<DagNode>> {
    (1usize..16).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::vec(any::<bool>(), n), n).prop_map(move |edges| {
            (0..n)
                .map(|i| DagNode::new(node_id(i), (0..i).filter(|&j| edges[i][j]).map(node_id)))
                .collect()
        })
    })
}

fn check_one_position_per_node(nodes: &[DagNode]) -> Result<(), TestCaseError> {
    let mut engines = EngineBuilder::new();
    let coordinates = compute_coordinates(engines.engine(LayoutEngine::Layered), nodes, 0.0)
        .map_err(|err| TestCaseError::fail(err.to_string()))?;

    prop_assert_eq!(coordinates.len(), nodes.len());
    for node in nodes {
        prop_assert!(coordinates.contains_key(&node.id()));
    }
    Ok(())
}

fn check_centroid_is_origin(nodes: &[DagNode]) -> Result<(), TestCaseError> {
    let mut engines = EngineBuilder::new();
    let coordinates = compute_coordinates(engines.engine(LayoutEngine::Layered), nodes, 5.0)
        .map_err(|err| TestCaseError::fail(err.to_string()))?;

    let count = coordinates.len() as f32;
    let sum = coordinates.values().fold((0.0f32, 0.0f32), |acc, v| (acc.0 + v.x, acc.1 + v.y));
    prop_assert!(approx_eq!(f32, sum.0 / count, 0.0, epsilon = 0.01));
    prop_assert!(approx_eq!(f32, sum.1 / count, 0.0, epsilon = 0.01));
    prop_assert!(coordinates.values().all(|v| approx_eq!(f32, v.z, 5.0)));
    Ok(())
}

fn check_layout_is_deterministic(nodes: &[DagNode]) -> Result<(), TestCaseError> {
    let mut engines = EngineBuilder::new();
    let first = compute_coordinates(engines.engine(LayoutEngine::Layered), nodes, 0.0)
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
    let second = compute_coordinates(engines.engine(LayoutEngine::Layered), nodes, 0.0)
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
    prop_assert_eq!(first, second);
    Ok(())
}

fn check_parents_are_upstream(nodes: &[DagNode]) -> Result<(), TestCaseError> {
    let mut engines = EngineBuilder::new();
    let coordinates = compute_coordinates(engines.engine(LayoutEngine::Layered), nodes, 0.0)
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
    for node in nodes {
        for parent in node.parent_ids() {
            prop_assert!(coordinates[parent].x < coordinates[&node.id()].x);
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn one_position_per_node(nodes in dag_strategy()) {
        check_one_position_per_node(&nodes)?;
    }

    #[test]
    fn centroid_is_origin(nodes in dag_strategy()) {
        check_centroid_is_origin(&nodes)?;
    }

    #[test]
    fn layout_is_deterministic(nodes in dag_strategy()) {
        check_layout_is_deterministic(&nodes)?;
    }

    #[test]
    fn parents_are_upstream(nodes in dag_strategy()) {
        check_parents_are_upstream(&nodes)?;
    }
}

#[test]
fn test_cycle_is_rejected_by_every_engine() {
    let nodes = vec![
        DagNode::new("a", [Id::new("c")]),
        DagNode::new("b", [Id::new("a")]),
        DagNode::new("c", [Id::new("b")]),
    ];
    let mut engines = EngineBuilder::new();
    for kind in [LayoutEngine::Layered, LayoutEngine::Sugiyama] {
        let result = compute_coordinates(engines.engine(kind), &nodes, 0.0);
        assert!(matches!(result, Err(StrataError::InvalidGraph(_))), "{kind}");
    }
}

#[test]
fn test_empty_input_gives_empty_output() {
    let mut engines = EngineBuilder::new();
    for kind in [LayoutEngine::Layered, LayoutEngine::Sugiyama] {
        let coordinates = compute_coordinates(engines.engine(kind), &[], 0.0).expect("empty input is valid");
        assert!(coordinates.is_empty());
    }
}

#[test]
fn test_sugiyama_ranks_a_chain() {
    let nodes = vec![
        DagNode::new("a", []),
        DagNode::new("b", [Id::new("a")]),
        DagNode::new("c", [Id::new("b")]),
        DagNode::new("d", [Id::new("a")]),
    ];
    let mut engines = EngineBuilder::new();
    let coordinates =
        compute_coordinates(engines.engine(LayoutEngine::Sugiyama), &nodes, 0.0).expect("acyclic input");
    assert_eq!(coordinates.len(), 4);
    let x = |id: &str| coordinates[&Id::new(id)].x;
    assert_ne!(x("a"), x("b"));
    assert_ne!(x("b"), x("c"));
    assert_ne!(x("a"), x("c"));
}
