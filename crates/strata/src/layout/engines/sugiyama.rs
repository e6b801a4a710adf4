//! Sugiyama layout engine backed by the rust-sugiyama crate.

use std::collections::HashMap;

use log::debug;
use rust_sugiyama::configure::Config;

use strata_core::{geometry::Point, identifier::Id};

use crate::{
    StrataError,
    layout::{Dag, DagNode, Positions, engines::DagEngine, recenter},
};

/// Distance between layers, and between nodes of a layer, before scaling.
const LAYER_SPACING: f32 = 20.0;
const NODE_SPACING: f32 = 3.6 * 10.0;

/// Hierarchical engine delegating ordering and coordinates to rust-sugiyama.
///
/// rust-sugiyama only sees nodes taking part in an edge. Isolated nodes are
/// stacked on an extra column after the deepest layer.
pub struct Engine {
    expansion_factor: f32,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            expansion_factor: 1.0,
        }
    }

    pub fn set_expansion_factor(&mut self, factor: f32) -> &mut Self {
        self.expansion_factor = factor;
        self
    }
}

impl DagEngine for Engine {
    fn layout(&self, nodes: &[DagNode]) -> Result<Positions, StrataError> {
        if nodes.is_empty() {
            return Ok(Positions::new());
        }
        // rust-sugiyama does not report cycles or dangling references itself.
        Dag::new(nodes)?;

        let node_ids: HashMap<Id, u32> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id(), i as u32))
            .collect();
        let mut edges = Vec::new();
        for node in nodes {
            let target = node_ids[&node.id()];
            for parent in node.parent_ids() {
                if let Some(&source) = node_ids.get(parent) {
                    edges.push((source, target));
                }
            }
        }

        let mut grid: HashMap<u32, (f64, f64)> = HashMap::new();
        if !edges.is_empty() {
            debug!(nodes = nodes.len(), edges = edges.len(); "Applying rust-sugiyama");

            let layouts = std::panic::catch_unwind(move || {
                let config = Config {
                    minimum_length: 1,
                    vertex_spacing: 1.0,
                    ..Default::default()
                };
                rust_sugiyama::from_edges(&edges, &config)
            })
            .map_err(|err| {
                let message = if let Some(panic_msg) = err.downcast_ref::<String>() {
                    format!("Rust-sugiyama layout engine panicked: {panic_msg}")
                } else if let Some(panic_msg) = err.downcast_ref::<&str>() {
                    format!("Rust-sugiyama layout engine panicked: {panic_msg}")
                } else {
                    "Rust-sugiyama layout engine panicked with unknown error".to_string()
                };
                StrataError::Layout(message)
            })?;

            if layouts.is_empty() {
                return Err(StrataError::Layout(
                    "Rust-sugiyama returned empty layout results".to_string(),
                ));
            }

            // Components come back independently laid out; stack them along
            // the node axis.
            let mut offset = 0.0;
            for (coords, _, _) in &layouts {
                let min = coords.iter().map(|(_, (x, _))| *x).fold(f64::INFINITY, f64::min);
                let max = coords.iter().map(|(_, (x, _))| *x).fold(f64::NEG_INFINITY, f64::max);
                for &(id, (x, y)) in coords {
                    let Ok(id) = u32::try_from(id) else {
                        debug!(id; "Node ID from rust-sugiyama result is out of valid range");
                        continue;
                    };
                    grid.insert(id, (x - min + offset, y.abs()));
                }
                offset += (max - min) + 1.0;
            }
        }

        let factor = self.expansion_factor;
        let deepest = grid.values().map(|(_, rank)| *rank).fold(0.0, f64::max);
        let isolated_column = if grid.is_empty() { 0.0 } else { deepest + 1.0 };

        let mut isolated = 0usize;
        let mut positions = Positions::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            let (along, rank) = match grid.get(&(i as u32)) {
                Some(&cell) => cell,
                None => {
                    isolated += 1;
                    ((isolated - 1) as f64, isolated_column)
                }
            };
            positions.insert(
                node.id(),
                Point::new(
                    rank as f32 * LAYER_SPACING * factor,
                    along as f32 * NODE_SPACING * factor,
                ),
            );
        }

        recenter(&mut positions);
        Ok(positions)
    }
}
