//! Live state of one open layer.

use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, error};

use strata_core::{
    color::Color,
    geometry::{Bounds3, Vec3},
    identifier::Id,
    model::{ConnectionModel, Extremity, SlotRef},
    observable::{Observable, Subscriptions},
    runtime::{InstancePool, PoolStream, SlotKind},
};

use super::{
    LayerKey,
    proxies::{ConnectionProxy, EntityProxy, LayerBackground},
    registry::BoundaryRegistry,
};
use crate::{
    StrataError,
    config::Style,
    structure::{Entity, ExpandableGrouper, HasSlots, LayerKind, LayerOrganizer},
};

/// Lifecycle of a [`LayerContent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Constructing,
    Live,
    ExpandingChild,
    Collapsing,
    Disposed,
}

/// Entries of an entity's action row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityAction {
    View,
    Journal,
    Documentation,
    InspectWorker,
    Expand,
}

/// Where a layer sits in the stack.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub parent: Option<LayerKey>,
    /// Entity of the parent layer the layer was expanded from.
    pub from_entity: Option<Id>,
    pub depth: usize,
}

/// What expanding an entity changed in its layer, to undo on collapse.
#[derive(Debug, Clone)]
pub(crate) struct ExpandedChild {
    pub key: LayerKey,
    pub color: Color,
    pub opacity: f32,
    pub connections: Vec<(Id, f32)>,
    pub boundaries: Vec<(Id, f32)>,
}

#[derive(Debug)]
pub struct LayerContent {
    key: LayerKey,
    placement: Placement,
    organizer: Rc<LayerOrganizer>,
    pool_stream: Option<PoolStream>,
    entities: IndexMap<Id, EntityProxy>,
    connections: Vec<ConnectionProxy>,
    background: Option<LayerBackground>,
    pub(crate) expanded: IndexMap<Id, ExpandedChild>,
    pub(crate) boundaries: BoundaryRegistry,
    is_front: Observable<bool>,
    pub(crate) state: LayerState,
    pub(crate) scale: f32,
    opacity: f32,
    transparent: bool,
    pub(crate) subscriptions: Subscriptions,
    pub(crate) pending_pool: Option<Rc<InstancePool>>,
}

impl LayerContent {
    /// Builds the proxies of a layer from its organizer and the computed
    /// coordinates of its entities.
    pub(crate) fn new(
        key: LayerKey,
        placement: Placement,
        organizer: Rc<LayerOrganizer>,
        pool_stream: Option<PoolStream>,
        coordinates: &IndexMap<Id, Vec3>,
        style: &Style,
    ) -> Self {
        let mut content = Self {
            key,
            placement,
            organizer,
            pool_stream,
            entities: IndexMap::new(),
            connections: Vec::new(),
            background: None,
            expanded: IndexMap::new(),
            boundaries: BoundaryRegistry::new(),
            is_front: Observable::with_value(placement.parent.is_none()),
            state: LayerState::Constructing,
            scale: 1.0,
            opacity: 1.0,
            transparent: false,
            subscriptions: Subscriptions::new(),
            pending_pool: None,
        };
        content.populate(coordinates, style);
        content.state = LayerState::Live;
        content
    }

    /// Replaces the organizer and every proxy, keeping the layer's place in
    /// the stack, its subscriptions and its transparency.
    pub(crate) fn rebuild(&mut self, organizer: Rc<LayerOrganizer>, coordinates: &IndexMap<Id, Vec3>, style: &Style) {
        self.state = LayerState::Constructing;
        self.organizer = organizer;
        self.populate(coordinates, style);
        self.state = LayerState::Live;
    }

    fn populate(&mut self, coordinates: &IndexMap<Id, Vec3>, style: &Style) {
        self.entities = self
            .organizer
            .entities()
            .iter()
            .map(|entity| {
                let uid = entity.uid();
                let position = coordinates.get(&uid).copied().unwrap_or(Vec3::ZERO);
                let mut proxy = EntityProxy::new(entity.clone(), position, style.module_color);
                proxy.set_opacity(self.opacity);
                (uid, proxy)
            })
            .collect();

        let mut connections = Vec::with_capacity(self.organizer.intra_connections().len());
        for connection in self.organizer.intra_connections() {
            let start = self.get_connected_slot(connection.model(), Extremity::End);
            let end = self.get_connected_slot(connection.model(), Extremity::Start);
            if let (Some(start), Some(end)) = (start, end) {
                let mut proxy = ConnectionProxy::new(connection.clone(), start, end);
                proxy.set_opacity(self.opacity);
                connections.push(proxy);
            } else {
                debug!(connection = connection.uid().to_string(); "Connection omitted");
            }
        }
        self.connections = connections;

        let base_color = style.palette.color(self.placement.depth);
        self.background = LayerBackground::new(self.entities.values(), base_color, style.background_whitening)
            .map(|mut background| {
                background.set_opacity(self.opacity);
                background
            });
        debug!(
            layer = self.uid().to_string(),
            entities = self.entities.len(),
            connections = self.connections.len();
            "Layer proxies built"
        );
    }

    pub fn key(&self) -> LayerKey {
        self.key
    }

    /// Uid of the workflow layer shown.
    pub fn uid(&self) -> Id {
        self.organizer.layer_id()
    }

    pub fn depth(&self) -> usize {
        self.placement.depth
    }

    pub fn parent(&self) -> Option<LayerKey> {
        self.placement.parent
    }

    pub fn from_entity(&self) -> Option<Id> {
        self.placement.from_entity
    }

    pub fn kind(&self) -> &LayerKind {
        self.organizer.kind()
    }

    pub fn organizer(&self) -> &Rc<LayerOrganizer> {
        &self.organizer
    }

    pub fn pool_stream(&self) -> Option<&PoolStream> {
        self.pool_stream.as_ref()
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    /// Emits `true` while the layer is the deepest interactive layer.
    pub fn is_front(&self) -> &Observable<bool> {
        &self.is_front
    }

    pub(crate) fn set_front(&self, front: bool) {
        if self.is_front.value() != Some(front) {
            self.is_front.next(front);
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityProxy> {
        self.entities.values()
    }

    pub fn entity(&self, uid: Id) -> Option<&EntityProxy> {
        self.entities.get(&uid)
    }

    pub fn connections(&self) -> &[ConnectionProxy] {
        &self.connections
    }

    pub fn background(&self) -> Option<&LayerBackground> {
        self.background.as_ref()
    }

    pub fn boundaries(&self) -> &BoundaryRegistry {
        &self.boundaries
    }

    /// Child layers opened from this layer, by entity uid.
    pub fn expanded(&self) -> impl Iterator<Item = (Id, LayerKey)> + '_ {
        self.expanded.iter().map(|(uid, child)| (*uid, child.key))
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Box of the layer's proxies, in layer coordinates.
    pub fn bounds(&self) -> Option<Bounds3> {
        let entities = self.entities.values().map(EntityProxy::bounds);
        let background = self.background.iter().map(LayerBackground::bounds);
        entities.chain(background).reduce(Bounds3::merge)
    }

    /// Anchor of the slot at the other end of `connection` from
    /// `to_extremity`: its start slot when asked for `End`, and conversely.
    ///
    /// Missing modules or slots are logged and give `None`.
    pub fn get_connected_slot(&self, connection: &ConnectionModel, to_extremity: Extremity) -> Option<Vec3> {
        let slot = connection.endpoint(to_extremity.opposite());
        let kind = match to_extremity {
            Extremity::End => SlotKind::Output,
            Extremity::Start => SlotKind::Input,
        };
        let Some(entity) = self.entities.get(&slot.module_id()) else {
            error!(module = slot.module_id().to_string(), layer = self.uid().to_string(); "Can not find module");
            return None;
        };
        let anchor = entity
            .entity()
            .slot_index(kind, slot.slot_id())
            .and_then(|index| entity.slot_anchor(kind, index));
        if anchor.is_none() {
            error!(slot = slot.to_string(), layer = self.uid().to_string(); "Can not find slot");
        }
        anchor
    }

    /// Anchor of `slot`, without logging.
    pub fn slot_anchor(&self, slot: SlotRef, kind: SlotKind) -> Option<Vec3> {
        let entity = self.entities.get(&slot.module_id())?;
        let index = entity.entity().slot_index(kind, slot.slot_id())?;
        entity.slot_anchor(kind, index)
    }

    /// Alternates the layer's opacity between opaque and `transparent_opacity`.
    ///
    /// Only this layer's own proxies are affected, not the expanded children.
    pub fn toggle_transparent(&mut self, transparent_opacity: f32) {
        self.transparent = !self.transparent;
        self.opacity = if self.transparent { transparent_opacity } else { 1.0 };
        let opacity = self.opacity;
        self.entities.values_mut().for_each(|proxy| proxy.set_opacity(opacity));
        self.connections.iter_mut().for_each(|proxy| proxy.set_opacity(opacity));
        if let Some(background) = self.background.as_mut() {
            background.set_opacity(opacity);
        }
    }

    /// Action row of `uid`. Empty unless the layer is the front layer.
    ///
    /// # Errors
    /// Returns `StrataError::UnknownEntity` if the layer has no such entity.
    pub fn actions(&self, uid: Id, running: bool) -> Result<Vec<EntityAction>, StrataError> {
        let proxy = self.entities.get(&uid).ok_or(StrataError::UnknownEntity(uid))?;
        if self.is_front.value() != Some(true) {
            return Ok(Vec::new());
        }
        let entity = proxy.entity();
        let mut actions = Vec::new();
        if let Some(instance) = entity.instance() {
            if instance.has_html_view() {
                actions.push(EntityAction::View);
            }
            if running {
                actions.push(EntityAction::Journal);
            }
            if instance.documentation().is_some() {
                actions.push(EntityAction::Documentation);
            }
            if instance.worker().is_some() {
                actions.push(EntityAction::InspectWorker);
            }
        }
        if entity.can_expand(running) && !self.expanded.contains_key(&uid) {
            actions.push(EntityAction::Expand);
        }
        Ok(actions)
    }

    /// Dims `uid` and the intra connections touching it, and recolors it.
    /// Returns what is needed to undo it, boundaries aside.
    pub(crate) fn dim_entity(&mut self, uid: Id, opacity: f32, color: Color) -> Option<ExpandedChild> {
        let proxy = self.entities.get_mut(&uid)?;
        let original = (proxy.color(), proxy.opacity());
        proxy.set_color(color);
        proxy.set_opacity(opacity);

        let connections = self
            .connections
            .iter_mut()
            .filter(|connection| connection.touches(uid))
            .map(|connection| {
                let previous = connection.opacity();
                connection.set_opacity(opacity);
                (connection.uid(), previous)
            })
            .collect();

        Some(ExpandedChild {
            key: self.key,
            color: original.0,
            opacity: original.1,
            connections,
            boundaries: Vec::new(),
        })
    }

    /// Undoes [`dim_entity`](Self::dim_entity).
    pub(crate) fn restore_entity(&mut self, uid: Id, record: &ExpandedChild) {
        if let Some(proxy) = self.entities.get_mut(&uid) {
            proxy.set_color(record.color);
            proxy.set_opacity(record.opacity);
        }
        for (connection_uid, opacity) in &record.connections {
            self.connections
                .iter_mut()
                .filter(|connection| connection.uid() == *connection_uid)
                .for_each(|connection| connection.set_opacity(*opacity));
        }
    }

    pub(crate) fn entity_of(&self, uid: Id) -> Result<&Entity, StrataError> {
        self.entities
            .get(&uid)
            .map(EntityProxy::entity)
            .ok_or(StrataError::UnknownEntity(uid))
    }
}
