//! DAG layout of the entities of a layer.
//!
//! A layer hands its entities to a layout engine as a flat list of
//! [`DagNode`]s (an id plus the ids of its upstream entities) and receives a
//! 2D position per id. Engines place layers of the DAG along +X, stack nodes
//! of a same layer along Y and re-center the result on the origin.

pub mod engines;

use indexmap::{IndexMap, IndexSet};
use log::trace;
use petgraph::{
    algo::toposort,
    graph::{DiGraph, NodeIndex},
};

use strata_core::{
    geometry::{Point, Vec3},
    identifier::Id,
};

use crate::StrataError;

pub use engines::{DagEngine, EngineBuilder, LayoutEngine};

/// One node of a layer's DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagNode {
    id: Id,
    parent_ids: IndexSet<Id>,
}

impl DagNode {
    /// Creates a node; duplicated parents are kept once, in first-seen order.
    pub fn new(id: impl Into<Id>, parent_ids: impl IntoIterator<Item = Id>) -> Self {
        Self {
            id: id.into(),
            parent_ids: parent_ids.into_iter().collect(),
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn parent_ids(&self) -> &IndexSet<Id> {
        &self.parent_ids
    }
}

/// Positions computed by an engine, in input order.
pub type Positions = IndexMap<Id, Point>;

/// Validated DAG: the input as a graph plus a topological order.
pub(crate) struct Dag {
    pub graph: DiGraph<Id, ()>,
    pub order: Vec<NodeIndex>,
}

impl Dag {
    /// Builds the graph, rejecting duplicated ids, unknown parents and cycles.
    pub fn new(nodes: &[DagNode]) -> Result<Self, StrataError> {
        let mut graph = DiGraph::new();
        let mut indices: IndexMap<Id, NodeIndex> = IndexMap::with_capacity(nodes.len());

        for node in nodes {
            if indices.contains_key(&node.id) {
                return Err(StrataError::InvalidGraph(format!("duplicated node `{}`", node.id)));
            }
            indices.insert(node.id, graph.add_node(node.id));
        }

        for node in nodes {
            let child = indices[&node.id];
            for parent_id in &node.parent_ids {
                let parent = indices.get(parent_id).ok_or_else(|| {
                    StrataError::InvalidGraph(format!(
                        "node `{}` references unknown parent `{parent_id}`",
                        node.id
                    ))
                })?;
                graph.add_edge(*parent, child, ());
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            StrataError::InvalidGraph(format!("cycle through node `{}`", graph[cycle.node_id()]))
        })?;

        Ok(Self { graph, order })
    }
}

/// Shifts `positions` so that their centroid is the origin.
pub(crate) fn recenter(positions: &mut Positions) {
    if let Some(centroid) = Point::centroid(positions.values().copied()) {
        for position in positions.values_mut() {
            *position = position.sub_point(centroid);
        }
    }
}

/// Lays out `nodes` with `engine` and lifts the result to depth `z`.
///
/// `z` is `0` for the root layer and the configured child layer depth for
/// nested layers. Empty input yields an empty map.
pub fn compute_coordinates(
    engine: &dyn DagEngine,
    nodes: &[DagNode],
    z: f32,
) -> Result<IndexMap<Id, Vec3>, StrataError> {
    if nodes.is_empty() {
        return Ok(IndexMap::new());
    }
    let positions = engine.layout(nodes)?;
    trace!(nodes = nodes.len(), z; "Computed layer coordinates");
    Ok(positions
        .into_iter()
        .map(|(id, point)| (id, point.to_vec3(z)))
        .collect())
}
