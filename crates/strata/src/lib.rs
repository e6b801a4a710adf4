//! # Strata
//!
//! Strata turns a dataflow workflow into a stack of 3D layers that the user
//! can open and close. Each layer lays out its entities (modules, groups,
//! macros and nested modules) as a DAG, and draws the connections that cross
//! from a parent layer into an opened child.
//!
//! ## Overview
//!
//! - [`layout`] - DAG layout engines and 3D coordinates
//! - [`structure`] - entity classification and upward connection lookup
//! - [`crossing`] - connections crossing a parent/child layer boundary
//! - [`scene`] - the arena of live layers, their proxies and animations
//! - [`environment`] - the host: project tracking, pointer input, render loop
//! - [`config`] - TOML configuration
//!
//! The crate installs no logger and renders nothing: it exposes proxy data for
//! a renderer and calls into a [`environment::StateCapability`] for side
//! panels.
//!
//! ## Quick Start
//!
//! ```
//! use std::rc::Rc;
//!
//! use strata::{
//!     Environment,
//!     config::AppConfig,
//!     environment::{NoopState, ProjectSource},
//!     model::{Layer, Project, WorkflowModel},
//!     observable::Observable,
//!     runtime::InstancePool,
//! };
//!
//! let workflow = WorkflowModel::new("main", vec![], vec![], Layer::new("root", std::iter::empty()));
//! let project = Rc::new(Project::new(workflow, InstancePool::new("main")));
//! let projects = Observable::with_value(project);
//!
//! let mut environment = Environment::new(AppConfig::default(), Rc::new(NoopState)).unwrap();
//! environment.track(ProjectSource::main(projects));
//! environment.tick().unwrap();
//! assert!(environment.front_layer().is_some());
//! ```

pub mod config;
pub mod crossing;
pub mod environment;
pub mod layout;
pub mod scene;
pub mod structure;

mod error;

pub use strata_core::{color, geometry, identifier, model, observable, runtime};

pub use environment::Environment;
pub use error::StrataError;
