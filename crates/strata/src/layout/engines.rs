//! Layout engine factory module
//!
//! This module provides the engines that position the entities of a layer and
//! a builder that creates and caches them from the layout configuration.
//!
//! - [`LayoutEngine::Layered`]: longest-path layering, dummy nodes on long
//!   edges and barycenter crossing minimization. Default.
//! - [`LayoutEngine::Sugiyama`]: delegates ordering and coordinates to the
//!   rust-sugiyama crate.

pub(crate) mod layered;
mod sugiyama;

use std::{
    collections::HashMap,
    fmt::{self, Display},
    str::FromStr,
};

use serde::Deserialize;

use super::{DagNode, Positions};
use crate::StrataError;

/// Available layout engines.
///
/// The names match external configuration strings (snake_case).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutEngine {
    /// Layered engine with barycenter crossing minimization (default)
    #[default]
    Layered,
    /// Sugiyama engine backed by rust-sugiyama
    Sugiyama,
}

impl FromStr for LayoutEngine {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "layered" => Ok(Self::Layered),
            "sugiyama" => Ok(Self::Sugiyama),
            _ => Err("Unsupported layout engine"),
        }
    }
}

impl From<LayoutEngine> for &'static str {
    fn from(val: LayoutEngine) -> Self {
        match val {
            LayoutEngine::Layered => "layered",
            LayoutEngine::Sugiyama => "sugiyama",
        }
    }
}

impl Display for LayoutEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &'static str = (*self).into();
        write!(f, "{s}")
    }
}

/// Trait defining the interface for DAG layout engines
pub trait DagEngine {
    /// Calculate a position for every node.
    ///
    /// Positions are centered on the origin and deterministic for a given
    /// input, including its order.
    ///
    /// # Errors
    /// Returns `StrataError::InvalidGraph` for cycles or unknown parents and
    /// `StrataError::Layout` if the engine fails to calculate positions.
    fn layout(&self, nodes: &[DagNode]) -> Result<Positions, StrataError>;
}

/// Builder for creating and configuring layout engines.
pub struct EngineBuilder {
    // Cache for reusing engines with the same configuration
    engines: HashMap<LayoutEngine, Box<dyn DagEngine>>,

    // Configuration options
    expansion_factor: f32,
    max_sweeps: usize,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            engines: HashMap::new(),
            expansion_factor: 1.0,
            max_sweeps: 24,
        }
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .field("expansion_factor", &self.expansion_factor)
            .field("max_sweeps", &self.max_sweeps)
            .finish()
    }
}

impl EngineBuilder {
    /// Create a new engine builder with default engine cache and configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the multiplier applied to node sizes and layer spacing
    pub fn with_expansion_factor(mut self, factor: f32) -> Self {
        self.expansion_factor = factor;
        self
    }

    /// Set the maximum number of crossing-minimization sweeps
    pub fn with_max_sweeps(mut self, sweeps: usize) -> Self {
        self.max_sweeps = sweeps;
        self
    }

    /// Get an engine of the specified type with configured options
    pub fn engine(&mut self, engine_type: LayoutEngine) -> &dyn DagEngine {
        let expansion_factor = self.expansion_factor;
        let max_sweeps = self.max_sweeps;
        let engine = self.engines.entry(engine_type).or_insert_with(|| {
            let engine: Box<dyn DagEngine> = match engine_type {
                LayoutEngine::Layered => {
                    let mut e = layered::Engine::new();
                    e.set_expansion_factor(expansion_factor)
                        .set_max_sweeps(max_sweeps);
                    Box::new(e)
                }
                LayoutEngine::Sugiyama => {
                    let mut e = sugiyama::Engine::new();
                    e.set_expansion_factor(expansion_factor);
                    Box::new(e)
                }
            };
            engine
        });
        &**engine
    }
}
