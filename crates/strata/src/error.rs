//! Error types for Strata operations.
//!
//! This module provides the main error type [`StrataError`] covering layout,
//! layer organization, cross-layer resolution and configuration failures.

use thiserror::Error;

use strata_core::{identifier::Id, model::SlotRef};

/// The main error type for Strata operations.
///
/// # Recoverable Variants
///
/// `RelativeNotFound` is reported by the organizer but handled by the
/// resolvers: the affected edge is logged and skipped. Every other variant is
/// propagated to the caller.
#[derive(Debug, Error)]
pub enum StrataError {
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("No relative found for slot `{slot}` from layer `{layer}`")]
    RelativeNotFound { slot: SlotRef, layer: Id },

    #[error("Missing connections hint for slot `{slot}` of module `{module}`")]
    MissingConnectionsHint { module: Id, slot: SlotRef },

    #[error("Unknown layer `{0}`")]
    UnknownLayer(String),

    #[error("Unknown entity `{0}`")]
    UnknownEntity(Id),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Layout error: {0}")]
    Layout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration format error: {0}")]
    ConfigFormat(#[from] toml::de::Error),
}

impl StrataError {
    /// Create a new `InvalidState` error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Returns `true` for errors the resolvers drop instead of propagating.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RelativeNotFound { .. })
    }
}
