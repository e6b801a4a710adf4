//! Layer organizer.
//!
//! A [`LayerOrganizer`] is built each time a layer is shown. It classifies
//! the layer's modules into plain modules, macros and nested modules, wraps
//! its child layers as groups and lists the connections drawn inside the
//! layer. Connections touching a child group are re-expressed as equivalent
//! connections ending on the group itself.
//!
//! Organizers form a chain through their `parent` reference. The chain is
//! only walked upwards, by [`LayerOrganizer::find_relative`], to find where a
//! connection crossing a layer boundary really starts or ends.

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use log::{debug, trace, warn};
use petgraph::{
    algo::has_path_connecting,
    graph::{DiGraph, NodeIndex},
};

use strata_core::{
    identifier::Id,
    model::{ConnectionModel, Extremity, Layer, MacroModel, Project, SlotRef, WorkflowModel},
    runtime::{ConnectionsHint, HintEntry, InstancePool, SlotKind},
};

use super::{
    connection::IntraLayerConnection,
    entity::{Entity, GroupEntity, HasSlots, MacroEntity, ModuleEntity, NestedModuleEntity},
};
use crate::{StrataError, layout::DagNode};

/// How a layer was entered, and therefore how lookups hop to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerKind {
    /// The root layer of the tracked workflow.
    Root,
    /// A child layer of the parent's workflow.
    Group { group_id: Id },
    /// The workflow of a macro. `hint` maps the macro's inner slots to its
    /// outer slot positions.
    Macro { uid: Id, hint: ConnectionsHint },
    /// The flattened instance pool of a nested module; the hint comes with
    /// the pool.
    Nested { uid: Id },
}

impl LayerKind {
    /// Kind of the layer opened from macro `uid`. The hint pairs each
    /// declared slot of `model` with its position.
    pub fn for_macro(uid: Id, model: &MacroModel) -> Self {
        let inputs = model
            .inputs()
            .iter()
            .enumerate()
            .map(|(i, slot)| HintEntry::new(SlotKind::Input, i, *slot));
        let outputs = model
            .outputs()
            .iter()
            .enumerate()
            .map(|(i, slot)| HintEntry::new(SlotKind::Output, i, *slot));
        LayerKind::Macro {
            uid,
            hint: ConnectionsHint::V1(inputs.chain(outputs).collect()),
        }
    }
}

/// Inputs of [`LayerOrganizer::new`].
#[derive(Debug, Clone)]
pub struct OrganizerParams {
    pub project: Rc<Project>,
    pub instance_pool: Rc<InstancePool>,
    pub workflow: Rc<WorkflowModel>,
    pub layer_id: Id,
    pub parent: Option<Rc<LayerOrganizer>>,
    pub kind: LayerKind,
}

/// Result of [`LayerOrganizer::find_relative`].
#[derive(Debug, Clone)]
pub struct Relative {
    /// Connection found, as drawn in `layer_id`.
    pub connection: IntraLayerConnection,
    /// Layer holding the connection.
    pub layer_id: Id,
    /// Slot at the other extremity of the connection.
    pub slot: SlotRef,
}

/// Connections between a child group and the modules of its parent layer.
#[derive(Debug, Clone, Default)]
pub struct GroupConnections {
    /// From the group to this layer; starts on `<group>.output_<i>`.
    pub downstream: Vec<IntraLayerConnection>,
    /// From this layer to the group; ends on `<group>.input_<i>`.
    pub upstream: Vec<IntraLayerConnection>,
}

#[derive(Debug)]
pub struct LayerOrganizer {
    project: Rc<Project>,
    instance_pool: Rc<InstancePool>,
    workflow: Rc<WorkflowModel>,
    parent: Option<Rc<LayerOrganizer>>,
    layer_id: Id,
    kind: LayerKind,
    module_ids: Vec<Id>,
    /// Modules, groups, macros then nested modules.
    entities: Vec<Entity>,
    intra_connections: Vec<IntraLayerConnection>,
}

impl LayerOrganizer {
    /// Classifies the content of `params.layer_id`.
    ///
    /// # Errors
    /// Returns `StrataError::UnknownLayer` if the workflow has no such layer.
    pub fn new(params: OrganizerParams) -> Result<Self, StrataError> {
        let OrganizerParams {
            project,
            instance_pool,
            workflow,
            layer_id,
            parent,
            kind,
        } = params;

        let layer = workflow
            .layer(layer_id)
            .ok_or_else(|| StrataError::UnknownLayer(layer_id.to_string()))?
            .clone();
        let module_ids = layer.module_ids().to_vec();

        let mut organizer = Self {
            project,
            instance_pool,
            workflow,
            parent,
            layer_id,
            kind,
            module_ids,
            entities: Vec::new(),
            intra_connections: Vec::new(),
        };

        let mut modules = Vec::new();
        let mut macros = Vec::new();
        let mut nested = Vec::new();
        for &uid in &organizer.module_ids {
            let Some(model) = organizer.workflow.module(uid) else {
                warn!(module = uid.to_string(), layer = layer_id.to_string(); "Layer refers to an unknown module");
                continue;
            };
            let instance = organizer.instance_pool.module(uid).cloned();

            if organizer.project.is_macro_type(model.type_id()) {
                if let Some(macro_model) = organizer.project.macro_model(model.type_id()) {
                    macros.push(Entity::Macro(MacroEntity::new(
                        model.clone(),
                        Rc::clone(macro_model),
                        instance,
                    )));
                    continue;
                }
                warn!(module = uid.to_string(), type_id = model.type_id().to_string();
                    "Macro type without catalog entry, shown as a module");
            } else if let Some((instance, pool)) = instance
                .as_ref()
                .and_then(|instance| instance.instance_pool().map(|pool| (instance, pool)))
            {
                nested.push(Entity::Nested(NestedModuleEntity::new(
                    model.clone(),
                    Rc::clone(instance),
                    pool.clone(),
                )));
                continue;
            }
            modules.push(Entity::Module(ModuleEntity::new(
                model.clone(),
                instance,
                &organizer.workflow,
            )));
        }

        let mut groups = Vec::new();
        let mut group_connections = Vec::new();
        for child in layer.children() {
            let equivalents = organizer.equivalent_connections(child);
            groups.push(Entity::Group(GroupEntity::new(
                child.clone(),
                Rc::clone(&organizer.workflow),
                equivalents.upstream.len(),
                equivalents.downstream.len(),
            )));
            group_connections.extend(equivalents.downstream);
            group_connections.extend(equivalents.upstream);
        }

        let direct: Vec<IntraLayerConnection> = organizer
            .workflow
            .connections()
            .iter()
            .filter(|connection| {
                organizer.module_ids.contains(&connection.start().module_id())
                    && organizer.module_ids.contains(&connection.end().module_id())
            })
            .map(|connection| organizer.bind(connection.clone()))
            .collect();

        organizer.entities = modules
            .into_iter()
            .chain(groups)
            .chain(macros)
            .chain(nested)
            .collect();
        organizer.intra_connections = direct.into_iter().chain(group_connections).collect();

        debug!(
            layer = layer_id.to_string(),
            entities = organizer.entities.len(),
            connections = organizer.intra_connections.len();
            "Organized layer"
        );
        Ok(organizer)
    }

    pub fn layer_id(&self) -> Id {
        self.layer_id
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn project(&self) -> &Rc<Project> {
        &self.project
    }

    pub fn instance_pool(&self) -> &Rc<InstancePool> {
        &self.instance_pool
    }

    pub fn workflow(&self) -> &Rc<WorkflowModel> {
        &self.workflow
    }

    pub fn parent(&self) -> Option<&Rc<LayerOrganizer>> {
        self.parent.as_ref()
    }

    /// Every entity of the layer: modules, groups, macros, nested modules.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, uid: Id) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.uid() == uid)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| matches!(e, Entity::Module(_)))
    }

    pub fn groups(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| matches!(e, Entity::Group(_)))
    }

    pub fn macros(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| matches!(e, Entity::Macro(_)))
    }

    pub fn nested_modules(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| matches!(e, Entity::Nested(_)))
    }

    /// Connections drawn inside the layer, equivalent group connections last.
    pub fn intra_connections(&self) -> &[IntraLayerConnection] {
        &self.intra_connections
    }

    /// Nodes handed to the layout engine, one per entity.
    ///
    /// Parents are the upstream entities along intra connections. Self loops
    /// are not part of the DAG, and neither is an edge closing a cycle, which
    /// a group folding several modules into one box can produce.
    pub fn dag_data(&self) -> Vec<DagNode> {
        let mut graph: DiGraph<Id, ()> = DiGraph::new();
        let indices: IndexMap<Id, NodeIndex> = self
            .entities
            .iter()
            .map(|entity| (entity.uid(), graph.add_node(entity.uid())))
            .collect();

        let mut edges: Vec<(Id, Id)> = Vec::new();
        for connection in &self.intra_connections {
            let from = connection.model().start().module_id();
            let to = connection.model().end().module_id();
            let (Some(&from_index), Some(&to_index)) = (indices.get(&from), indices.get(&to)) else {
                continue;
            };
            if from == to || edges.contains(&(from, to)) {
                continue;
            }
            if has_path_connecting(&graph, to_index, from_index, None) {
                debug!(connection = connection.uid().to_string(), layer = self.layer_id.to_string();
                    "Edge closes a cycle, left out of the layout");
                continue;
            }
            graph.add_edge(from_index, to_index, ());
            edges.push((from, to));
        }

        self.entities
            .iter()
            .map(|entity| {
                let uid = entity.uid();
                let parents = edges.iter().filter(|(_, to)| *to == uid).map(|(from, _)| *from);
                DagNode::new(uid, parents)
            })
            .collect()
    }

    /// First intra connection whose `extremity` endpoint is `slot`.
    pub fn connection_from_slot(&self, slot: SlotRef, extremity: Extremity) -> Option<&IntraLayerConnection> {
        let kind = slot_kind(extremity);
        let target = self.normalize(kind, slot);
        let connection = self
            .intra_connections
            .iter()
            .find(|c| self.normalize(kind, c.endpoint(extremity)) == target);
        if connection.is_none() {
            debug!(slot = slot.to_string(), layer = self.layer_id.to_string(); "No connection from slot");
        }
        connection
    }

    /// Finds the connection attached to `slot` at `from_extremity`, looking
    /// in this layer first and then in the enclosing layers.
    ///
    /// # Errors
    /// - `StrataError::RelativeNotFound` if no enclosing layer resolves the
    ///   slot, or if the parent layer does not contain the owning module.
    /// - `StrataError::MissingConnectionsHint` if a macro or nested layer has
    ///   no hint for the slot.
    pub fn find_relative(&self, slot: SlotRef, from_extremity: Extremity) -> Result<Relative, StrataError> {
        if let Some(connection) = self.connection_from_slot(slot, from_extremity) {
            return Ok(Relative {
                connection: connection.clone(),
                layer_id: self.layer_id,
                slot: connection.endpoint(from_extremity.opposite()),
            });
        }
        let not_found = || StrataError::RelativeNotFound {
            slot,
            layer: self.layer_id,
        };
        let Some(parent) = self.parent.as_ref() else {
            return Err(not_found());
        };

        match &self.kind {
            LayerKind::Root => Err(not_found()),
            LayerKind::Group { group_id } => {
                let equivalents = parent.equivalent_group_connections(*group_id)?;
                let candidates = match from_extremity {
                    Extremity::End => &equivalents.upstream,
                    Extremity::Start => &equivalents.downstream,
                };
                let kind = slot_kind(from_extremity);
                let target = self.normalize(kind, slot);
                let equivalent = candidates.iter().find(|c| {
                    parent
                        .raw_connection(c.uid())
                        .is_some_and(|raw| self.normalize(kind, raw.endpoint(from_extremity)) == target)
                });
                match equivalent {
                    Some(equivalent) => {
                        trace!(slot = slot.to_string(), group = group_id.to_string(); "Hop through group slot");
                        parent.find_relative(equivalent.endpoint(from_extremity), from_extremity)
                    }
                    // The connection crosses more than one group boundary.
                    None => parent.find_relative(slot, from_extremity),
                }
            }
            LayerKind::Macro { uid, hint } => self.hop_to_owner(parent, *uid, Some(hint), slot, from_extremity),
            LayerKind::Nested { uid } => {
                self.hop_to_owner(parent, *uid, self.instance_pool.connections_hint(), slot, from_extremity)
            }
        }
    }

    /// Connections between `group_id` and the modules directly in this
    /// layer, computed from the raw workflow connections.
    ///
    /// # Errors
    /// Returns `StrataError::UnknownLayer` if the workflow has no such layer.
    pub fn equivalent_group_connections(&self, group_id: Id) -> Result<GroupConnections, StrataError> {
        let group = self
            .workflow
            .root_layer()
            .find(group_id)
            .ok_or_else(|| StrataError::UnknownLayer(group_id.to_string()))?;
        Ok(self.equivalent_connections(group))
    }

    /// The workflow connection behind an intra or equivalent connection.
    pub fn raw_connection(&self, uid: Id) -> Option<&ConnectionModel> {
        self.workflow.connection(uid)
    }

    fn equivalent_connections(&self, group: &Layer) -> GroupConnections {
        let group_id = group.uid();
        let inner: IndexSet<Id> = group.all_module_ids().into_iter().collect();
        let direct = |uid: Id| self.module_ids.contains(&uid);
        let connections = self.workflow.connections();

        let downstream = connections
            .iter()
            .filter(|c| inner.contains(&c.start().module_id()) && direct(c.end().module_id()))
            .enumerate()
            .map(|(i, c)| self.bind(c.with_start(SlotRef::named(group_id, &format!("output_{i}")))))
            .collect();
        let upstream = connections
            .iter()
            .filter(|c| direct(c.start().module_id()) && inner.contains(&c.end().module_id()))
            .enumerate()
            .map(|(i, c)| self.bind(c.with_end(SlotRef::named(group_id, &format!("input_{i}")))))
            .collect();

        GroupConnections { downstream, upstream }
    }

    fn hop_to_owner(
        &self,
        parent: &LayerOrganizer,
        owner: Id,
        hint: Option<&ConnectionsHint>,
        slot: SlotRef,
        from_extremity: Extremity,
    ) -> Result<Relative, StrataError> {
        if parent.entity(owner).is_none() {
            warn!(owner = owner.to_string(), layer = parent.layer_id.to_string(); "Owner not found in parent layer");
            return Err(StrataError::RelativeNotFound {
                slot,
                layer: parent.layer_id,
            });
        }
        let missing = || StrataError::MissingConnectionsHint { module: owner, slot };
        let hint = hint.ok_or_else(missing)?;
        let index = self
            .instance_pool
            .outer_slot_index(hint, slot_kind(from_extremity), slot)
            .ok_or_else(missing)?;
        trace!(slot = slot.to_string(), owner = owner.to_string(), index; "Hop through owner slot");
        parent.find_relative(SlotRef::at(owner, index), from_extremity)
    }

    fn bind(&self, model: ConnectionModel) -> IntraLayerConnection {
        let instance = self.instance_pool.connection(model.uid()).cloned();
        IntraLayerConnection::new(model, instance)
    }

    /// Rewrites `slot` to its positional form so that named and indexed
    /// references of a same slot compare equal.
    fn normalize(&self, kind: SlotKind, slot: SlotRef) -> SlotRef {
        match self.entity(slot.module_id()) {
            Some(entity) => entity
                .slot_index(kind, slot.slot_id())
                .map_or(slot, |index| SlotRef::at(slot.module_id(), index)),
            None => self.instance_pool.normalize_slot(kind, slot),
        }
    }
}

/// Slot kind found at a connection extremity.
fn slot_kind(extremity: Extremity) -> SlotKind {
    match extremity {
        Extremity::Start => SlotKind::Output,
        Extremity::End => SlotKind::Input,
    }
}
