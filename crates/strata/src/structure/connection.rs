//! Connections drawn by the scene.

use std::rc::Rc;

use strata_core::{
    identifier::Id,
    model::{ConnectionModel, Extremity, SlotRef},
    observable::Observable,
    runtime::{ConnectionInstance, ConnectionStatus},
};

/// A connection between two entities of the same layer.
///
/// Equivalent connections standing for a group's traffic keep the uid and
/// the runtime instance of the workflow connection they replace.
#[derive(Debug, Clone)]
pub struct IntraLayerConnection {
    model: ConnectionModel,
    instance: Option<Rc<ConnectionInstance>>,
}

impl IntraLayerConnection {
    pub fn new(model: ConnectionModel, instance: Option<Rc<ConnectionInstance>>) -> Self {
        Self { model, instance }
    }

    pub fn uid(&self) -> Id {
        self.model.uid()
    }

    pub fn model(&self) -> &ConnectionModel {
        &self.model
    }

    pub fn instance(&self) -> Option<&Rc<ConnectionInstance>> {
        self.instance.as_ref()
    }

    pub fn endpoint(&self, extremity: Extremity) -> SlotRef {
        self.model.endpoint(extremity)
    }
}

/// A connection crossing the boundary between a parent and a child layer.
///
/// `start_layer` and `end_layer` name the layers holding each extremity; the
/// parent side may be any open ancestor of the child layer.
#[derive(Debug, Clone)]
pub struct InterLayerConnection {
    model: ConnectionModel,
    start_layer: Id,
    end_layer: Id,
    status: Option<Observable<ConnectionStatus>>,
}

impl InterLayerConnection {
    pub fn new(model: ConnectionModel, start_layer: Id, end_layer: Id) -> Self {
        Self {
            model,
            start_layer,
            end_layer,
            status: None,
        }
    }

    pub fn with_status(mut self, status: Observable<ConnectionStatus>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn uid(&self) -> Id {
        self.model.uid()
    }

    pub fn model(&self) -> &ConnectionModel {
        &self.model
    }

    pub fn start_layer(&self) -> Id {
        self.start_layer
    }

    pub fn end_layer(&self) -> Id {
        self.end_layer
    }

    /// Layer holding the given extremity.
    pub fn layer(&self, extremity: Extremity) -> Id {
        match extremity {
            Extremity::Start => self.start_layer,
            Extremity::End => self.end_layer,
        }
    }

    pub fn status(&self) -> Option<&Observable<ConnectionStatus>> {
        self.status.as_ref()
    }

    /// Returns `true` if an extremity sits on `module` within `layer`.
    pub fn touches(&self, layer: Id, module: Id) -> bool {
        (self.start_layer == layer && self.model.start().module_id() == module)
            || (self.end_layer == layer && self.model.end().module_id() == module)
    }
}
