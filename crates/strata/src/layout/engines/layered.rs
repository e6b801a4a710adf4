//! Layered layout engine.
//!
//! Classic Sugiyama pipeline implemented in place:
//! 1. longest-path layering from the roots,
//! 2. dummy vertices on edges spanning more than one layer,
//! 3. alternating barycenter sweeps, keeping the ordering with the fewest
//!    crossings,
//! 4. packing of each layer along Y with wide real nodes and narrow dummies.

use log::debug;
use petgraph::Direction;

use strata_core::geometry::Point;

use crate::{
    StrataError,
    layout::{Dag, DagNode, Positions, engines::DagEngine, recenter},
};

/// Base width of a real node, along the stacking axis.
const NODE_WIDTH: f32 = 3.6 * 10.0;

/// Base width of a dummy vertex.
const DUMMY_WIDTH: f32 = 0.25 * 10.0;

/// Base distance between two consecutive layers.
const LAYER_SPACING: f32 = 20.0;

pub struct Engine {
    expansion_factor: f32,
    max_sweeps: usize,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            expansion_factor: 1.0,
            max_sweeps: 24,
        }
    }

    pub fn set_expansion_factor(&mut self, factor: f32) -> &mut Self {
        self.expansion_factor = factor;
        self
    }

    pub fn set_max_sweeps(&mut self, sweeps: usize) -> &mut Self {
        self.max_sweeps = sweeps;
        self
    }
}

/// Proper layering: every edge joins two consecutive layers.
struct Layering {
    /// `real[v]` is `true` for input nodes, `false` for dummies.
    real: Vec<bool>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    layers: Vec<Vec<usize>>,
}

impl Layering {
    fn new(nodes: &[DagNode], dag: &Dag) -> Self {
        let count = nodes.len();
        let mut rank = vec![0usize; count];
        for &index in &dag.order {
            rank[index.index()] = dag
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .map(|parent| rank[parent.index()] + 1)
                .max()
                .unwrap_or(0);
        }

        let depth = rank.iter().copied().max().unwrap_or(0) + 1;
        let mut layering = Self {
            real: vec![true; count],
            successors: vec![Vec::new(); count],
            predecessors: vec![Vec::new(); count],
            layers: vec![Vec::new(); depth],
        };
        for (vertex, &r) in rank.iter().enumerate() {
            layering.layers[r].push(vertex);
        }

        // Node indices follow input order, see `Dag::new`.
        for (child, node) in nodes.iter().enumerate() {
            for parent_id in node.parent_ids() {
                let Some(parent) = nodes.iter().position(|n| n.id() == *parent_id) else {
                    continue;
                };
                let mut previous = parent;
                for r in rank[parent] + 1..rank[child] {
                    let dummy = layering.add_dummy(r);
                    layering.link(previous, dummy);
                    previous = dummy;
                }
                layering.link(previous, child);
            }
        }
        layering
    }

    fn add_dummy(&mut self, rank: usize) -> usize {
        let vertex = self.real.len();
        self.real.push(false);
        self.successors.push(Vec::new());
        self.predecessors.push(Vec::new());
        self.layers[rank].push(vertex);
        vertex
    }

    fn link(&mut self, from: usize, to: usize) {
        self.successors[from].push(to);
        self.predecessors[to].push(from);
    }

    fn width(&self, vertex: usize) -> f32 {
        if self.real[vertex] { NODE_WIDTH } else { DUMMY_WIDTH }
    }
}

/// Index of every vertex within its layer.
fn positions_in_layers(order: &[Vec<usize>], vertex_count: usize) -> Vec<usize> {
    let mut positions = vec![0; vertex_count];
    for layer in order {
        for (i, &vertex) in layer.iter().enumerate() {
            positions[vertex] = i;
        }
    }
    positions
}

fn count_crossings(order: &[Vec<usize>], successors: &[Vec<usize>]) -> usize {
    let positions = positions_in_layers(order, successors.len());
    order
        .iter()
        .map(|layer| {
            let edges: Vec<(usize, usize)> = layer
                .iter()
                .flat_map(|&u| successors[u].iter().map(move |&v| (u, v)))
                .map(|(u, v)| (positions[u], positions[v]))
                .collect();
            let mut crossings = 0;
            for (i, &(a1, b1)) in edges.iter().enumerate() {
                for &(a2, b2) in &edges[i + 1..] {
                    if (a1 < a2 && b1 > b2) || (a1 > a2 && b1 < b2) {
                        crossings += 1;
                    }
                }
            }
            crossings
        })
        .sum()
}

/// Sorts `order[rank]` by the barycenter of each vertex's neighbors in the
/// adjacent, fixed layer. Vertices without neighbors keep their slot.
fn reorder_layer(order: &mut [Vec<usize>], rank: usize, neighbors: &[Vec<usize>]) {
    let positions = positions_in_layers(order, neighbors.len());
    let mut keyed: Vec<(f32, usize)> = order[rank]
        .iter()
        .enumerate()
        .map(|(i, &vertex)| {
            let adjacent = &neighbors[vertex];
            let barycenter = if adjacent.is_empty() {
                i as f32
            } else {
                adjacent.iter().map(|&n| positions[n] as f32).sum::<f32>() / adjacent.len() as f32
            };
            (barycenter, vertex)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    order[rank] = keyed.into_iter().map(|(_, vertex)| vertex).collect();
}

impl Engine {
    fn minimize_crossings(&self, layering: &Layering) -> Vec<Vec<usize>> {
        let mut order = layering.layers.clone();
        let mut best = order.clone();
        let mut best_crossings = count_crossings(&order, &layering.successors);

        for _ in 0..self.max_sweeps {
            if best_crossings == 0 {
                break;
            }
            for rank in 1..order.len() {
                reorder_layer(&mut order, rank, &layering.predecessors);
            }
            for rank in (0..order.len().saturating_sub(1)).rev() {
                reorder_layer(&mut order, rank, &layering.successors);
            }
            let crossings = count_crossings(&order, &layering.successors);
            if crossings < best_crossings {
                best_crossings = crossings;
                best = order.clone();
            }
        }

        debug!(crossings = best_crossings; "Layered engine ordering");
        best
    }
}

impl DagEngine for Engine {
    fn layout(&self, nodes: &[DagNode]) -> Result<Positions, StrataError> {
        if nodes.is_empty() {
            return Ok(Positions::new());
        }
        let dag = Dag::new(nodes)?;
        let layering = Layering::new(nodes, &dag);
        let order = self.minimize_crossings(&layering);

        let factor = self.expansion_factor;
        let mut coordinates = vec![Point::default(); layering.real.len()];
        for (rank, layer) in order.iter().enumerate() {
            let x = rank as f32 * LAYER_SPACING * factor;
            let mut offsets = Vec::with_capacity(layer.len());
            let mut y = 0.0;
            for (i, &vertex) in layer.iter().enumerate() {
                if i > 0 {
                    y += (layering.width(layer[i - 1]) + layering.width(vertex)) * 0.5 * factor;
                }
                offsets.push(y);
            }
            let middle = y * 0.5;
            for (&vertex, offset) in layer.iter().zip(offsets) {
                coordinates[vertex] = Point::new(x, offset - middle);
            }
        }

        let mut positions: Positions = nodes
            .iter()
            .enumerate()
            .map(|(vertex, node)| (node.id(), coordinates[vertex]))
            .collect();
        recenter(&mut positions);
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;
    use strata_core::identifier::Id;

    use super::*;

    fn node(id: &str, parents: &[&str]) -> DagNode {
        DagNode::new(id, parents.iter().map(|p| Id::new(p)))
    }

    fn position(positions: &Positions, id: &str) -> Point {
        positions[&Id::new(id)]
    }

    #[test]
    fn test_chain_flows_along_x() {
        let positions = Engine::new()
            .layout(&[node("a", &[]), node("b", &["a"]), node("c", &["b"])])
            .expect("valid dag");
        let (a, b, c) = (position(&positions, "a"), position(&positions, "b"), position(&positions, "c"));
        assert!(approx_eq!(f32, b.x() - a.x(), LAYER_SPACING));
        assert!(approx_eq!(f32, c.x() - b.x(), LAYER_SPACING));
        assert!(approx_eq!(f32, a.y(), 0.0));
        assert!(approx_eq!(f32, b.x(), 0.0));
    }

    #[test]
    fn test_siblings_do_not_overlap() {
        let positions = Engine::new()
            .layout(&[node("root", &[]), node("left", &["root"]), node("right", &["root"])])
            .expect("valid dag");
        let (left, right) = (position(&positions, "left"), position(&positions, "right"));
        assert!(approx_eq!(f32, left.x(), right.x()));
        assert!(approx_eq!(f32, (left.y() - right.y()).abs(), NODE_WIDTH));
    }

    #[test]
    fn test_long_edges_get_dummies() {
        let nodes = [node("a", &[]), node("b", &["a"]), node("c", &["a", "b"])];
        let dag = Dag::new(&nodes).expect("valid dag");
        let layering = Layering::new(&nodes, &dag);
        assert_eq!(layering.layers.len(), 3);
        assert_eq!(layering.real.iter().filter(|real| !**real).count(), 1);
        assert_eq!(layering.layers[1].len(), 2);
    }

    #[test]
    fn test_crossings_are_removed() {
        let nodes = [
            node("a", &[]),
            node("b", &[]),
            node("c", &["b"]),
            node("d", &["a"]),
        ];
        let dag = Dag::new(&nodes).expect("valid dag");
        let layering = Layering::new(&nodes, &dag);
        assert_eq!(count_crossings(&layering.layers, &layering.successors), 1);

        let positions = Engine::new().layout(&nodes).expect("valid dag");
        assert!(position(&positions, "d").y() < position(&positions, "c").y());
    }

    #[test]
    fn test_expansion_factor_scales_layout() {
        let nodes = [node("a", &[]), node("b", &["a"])];
        let mut engine = Engine::new();
        engine.set_expansion_factor(2.0);
        let positions = engine.layout(&nodes).expect("valid dag");
        let distance = position(&positions, "b").x() - position(&positions, "a").x();
        assert!(approx_eq!(f32, distance, 2.0 * LAYER_SPACING));
    }
}
