//! Structural view of a layer: what it contains and how it is wired.
//!
//! - [`entity`] - the four kinds of things a layer shows, and their
//!   capabilities
//! - [`connection`] - edges inside a layer and across layer boundaries
//! - [`organizer`] - classification of a layer's content and upward lookup of
//!   connections crossing its boundary

pub mod connection;
pub mod entity;
pub mod organizer;

pub use connection::{InterLayerConnection, IntraLayerConnection};
pub use entity::{Entity, EntityKind, ExpandableGrouper, HasSlots, Selectable, Selection};
pub use organizer::{GroupConnections, LayerKind, LayerOrganizer, OrganizerParams, Relative};
