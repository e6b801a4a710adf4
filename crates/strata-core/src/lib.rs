//! Strata Core Types and Definitions
//!
//! This crate provides the foundational types shared by the Strata scene
//! engine. It includes:
//!
//! - **Identifiers**: Efficient string-interned identifiers ([`identifier::Id`])
//! - **Colors**: Color handling with CSS color support ([`color::Color`])
//! - **Geometry**: Basic geometric types ([`geometry`] module)
//! - **Observables**: Single-threaded value streams ([`observable`] module)
//! - **Model**: Structural workflow definitions ([`model`] module)
//! - **Runtime**: Deployed instances and their streams ([`runtime`] module)

pub mod color;
pub mod geometry;
pub mod identifier;
pub mod model;
pub mod observable;
pub mod runtime;
