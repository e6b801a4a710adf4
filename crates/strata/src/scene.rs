//! The stack of open layers.
//!
//! A [`Scene`] owns every open [`LayerContent`] in an arena keyed by
//! [`LayerKey`]. Layers refer to each other by key only: a child knows its
//! parent key and the entity it was expanded from, a parent knows the keys
//! of its expanded children.
//!
//! Structural changes are driven by [`Command`]s. Expand and collapse start
//! an [`Animation`]; its completion comes back as a command on the next
//! [`Scene::tick`], which is where the layer stack is actually updated.
//! Instance pool emissions of nested and macro layers also arrive as
//! commands and rebuild the layer once its open descendants are collapsed.

pub mod animation;
pub mod content;
pub mod proxies;
pub mod registry;

use std::{
    fmt,
    rc::Rc,
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
};

use indexmap::IndexMap;
use log::{debug, info, trace};

use strata_core::{
    geometry::{Bounds3, Vec3},
    identifier::Id,
    model::{Extremity, Project, WorkflowModel},
    observable::Notification,
    runtime::{InstancePool, PoolStream, SlotKind},
};

use crate::{
    StrataError,
    config::{AnimationConfig, AppConfig, LayoutConfig, Style},
    crossing::{self, BoundaryContext},
    layout::{EngineBuilder, compute_coordinates},
    structure::{Entity, ExpandableGrouper, LayerKind, LayerOrganizer, OrganizerParams},
};

pub use animation::{Animation, Sample, Track, Transition};
pub use content::{EntityAction, LayerContent, LayerState, Placement};
pub use proxies::{BoundaryProxy, ConnectionProxy, EntityProxy, LayerBackground};
pub use registry::{BoundaryKey, BoundaryRegistry};

/// Handle on an open layer. Keys are never reused within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerKey(u64);

impl LayerKey {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Requests processed by [`Scene::tick`].
#[derive(Debug, Clone)]
pub enum Command {
    Expand { layer: LayerKey, entity: Id },
    Collapse { layer: LayerKey },
    AnimationFinished { transition: Transition, layer: Option<LayerKey> },
    PoolChanged { layer: LayerKey, pool: Rc<InstancePool> },
}

/// Placement of a layer in world space: `world = offset + local * scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub offset: Vec3,
    pub scale: f32,
}

impl Transform {
    pub fn apply(&self, local: Vec3) -> Vec3 {
        self.offset + local * self.scale
    }
}

/// Rebuild waiting for the descendants of a layer to collapse.
#[derive(Debug)]
struct RebuildPlan {
    pool: Rc<InstancePool>,
}

#[derive(Debug)]
pub struct Scene {
    layers: IndexMap<LayerKey, LayerContent>,
    next_key: u64,
    root: Option<LayerKey>,
    front: Option<LayerKey>,
    project: Option<Rc<Project>>,
    root_offset: Vec3,
    animations: IndexMap<String, Animation>,
    rebuilds: IndexMap<LayerKey, RebuildPlan>,
    engines: EngineBuilder,
    layout: LayoutConfig,
    animation: AnimationConfig,
    style: Style,
    sender: Sender<Command>,
    receiver: Receiver<Command>,
}

impl Scene {
    /// # Errors
    /// Returns `StrataError::Config` if the style section does not resolve.
    pub fn new(config: &AppConfig) -> Result<Self, StrataError> {
        let style = config.style().resolve().map_err(StrataError::Config)?;
        let engines = EngineBuilder::new()
            .with_expansion_factor(config.layout().expansion_factor())
            .with_max_sweeps(config.layout().max_sweeps());
        let (sender, receiver) = mpsc::channel();
        Ok(Self {
            layers: IndexMap::new(),
            next_key: 0,
            root: None,
            front: None,
            project: None,
            root_offset: Vec3::ZERO,
            animations: IndexMap::new(),
            rebuilds: IndexMap::new(),
            engines,
            layout: config.layout().clone(),
            animation: config.animation().clone(),
            style,
            sender,
            receiver,
        })
    }

    /// Discards the current stack and opens the root layer of `workflow`.
    ///
    /// # Errors
    /// Propagates organizer and layout errors; the scene is left empty.
    pub fn load(
        &mut self,
        project: Rc<Project>,
        workflow: Rc<WorkflowModel>,
        instance_pool: Rc<InstancePool>,
    ) -> Result<LayerKey, StrataError> {
        self.clear();
        let layer_id = workflow.root_layer().uid();
        let organizer = Rc::new(LayerOrganizer::new(OrganizerParams {
            project: Rc::clone(&project),
            instance_pool,
            workflow,
            layer_id,
            parent: None,
            kind: LayerKind::Root,
        })?);
        let placement = Placement {
            parent: None,
            from_entity: None,
            depth: 0,
        };
        let content = self.build_content(placement, organizer, None)?;
        let key = content.key();
        self.layers.insert(key, content);
        self.root = Some(key);
        self.front = Some(key);
        self.project = Some(project);
        info!(layer = layer_id.to_string(); "Root layer loaded");
        Ok(key)
    }

    /// Drops every layer, animation and queued command.
    pub fn clear(&mut self) {
        for content in self.layers.values_mut() {
            content.state = LayerState::Disposed;
            content.subscriptions.clear();
        }
        self.layers.clear();
        self.animations.clear();
        self.rebuilds.clear();
        while self.receiver.try_recv().is_ok() {}
        self.root = None;
        self.front = None;
        self.project = None;
        self.root_offset = Vec3::ZERO;
    }

    pub fn root(&self) -> Option<LayerKey> {
        self.root
    }

    /// The deepest interactive layer.
    pub fn front(&self) -> Option<LayerKey> {
        self.front
    }

    pub fn project(&self) -> Option<&Rc<Project>> {
        self.project.as_ref()
    }

    pub fn layer(&self, key: LayerKey) -> Option<&LayerContent> {
        self.layers.get(&key)
    }

    pub fn layers(&self) -> impl Iterator<Item = &LayerContent> {
        self.layers.values()
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn root_offset(&self) -> Vec3 {
        self.root_offset
    }

    pub fn animations(&self) -> impl Iterator<Item = (&str, &Animation)> {
        self.animations.iter().map(|(name, animation)| (name.as_str(), animation))
    }

    /// A handle to queue commands for the next tick.
    pub fn sender(&self) -> Sender<Command> {
        self.sender.clone()
    }

    /// Returns `true` while the project is running. No project counts as
    /// stopped.
    pub fn is_running(&self) -> bool {
        self.project.as_ref().is_some_and(|project| project.is_running())
    }

    /// Advances every animation by `step` seconds, then processes queued
    /// commands, completions included.
    ///
    /// # Errors
    /// Returns the first failing command. Commands queued after it are kept
    /// for the next tick.
    pub fn tick(&mut self, step: f32) -> Result<(), StrataError> {
        let mut finished = Vec::new();
        let mut samples = Vec::new();
        for (name, animation) in self.animations.iter_mut() {
            samples.extend(animation.advance(step));
            if animation.is_finished() {
                finished.push(name.clone());
            }
        }
        for sample in samples {
            match sample {
                Sample::LayerScale { layer, scale } => {
                    if let Some(content) = self.layers.get_mut(&layer) {
                        content.scale = scale;
                    }
                }
                Sample::RootTranslation(offset) => self.root_offset = offset,
            }
        }
        for name in finished {
            if let Some(animation) = self.animations.shift_remove(&name) {
                trace!(animation = name; "Animation finished");
                self.queue(Command::AnimationFinished {
                    transition: animation.transition(),
                    layer: animation.subject(),
                });
            }
        }

        loop {
            match self.receiver.try_recv() {
                Ok(command) => self.handle(command)?,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        Ok(())
    }

    /// Processes a single command.
    ///
    /// # Errors
    /// Propagates the error of the operation the command stands for.
    pub fn handle(&mut self, command: Command) -> Result<(), StrataError> {
        match command {
            Command::Expand { layer, entity } => self.expand(layer, entity).map(|_| ()),
            Command::Collapse { layer } => self.collapse(layer),
            Command::AnimationFinished { transition, layer } => {
                match (transition, layer) {
                    (Transition::Expand, Some(layer)) => self.finish_expand(layer)?,
                    (Transition::Collapse, Some(layer)) => self.finish_collapse(layer)?,
                    _ => {}
                }
                self.flush_pending_pools()
            }
            Command::PoolChanged { layer, pool } => self.pool_changed(layer, pool),
        }
    }

    /// Opens the child layer of entity `uid` of the front layer `layer`.
    ///
    /// The child appears through the expand animation. It becomes the front
    /// layer, with its boundary connections, when the animation completes.
    ///
    /// # Errors
    /// - `StrataError::UnknownLayer` or `StrataError::UnknownEntity` for bad
    ///   addresses.
    /// - `StrataError::InvalidState` if `layer` is not the front layer, is
    ///   busy, if `uid` is already expanded or may not expand.
    pub fn expand(&mut self, layer: LayerKey, uid: Id) -> Result<LayerKey, StrataError> {
        let content = self
            .layers
            .get(&layer)
            .ok_or_else(|| StrataError::UnknownLayer(layer.to_string()))?;
        if self.front != Some(layer) {
            return Err(StrataError::invalid_state(format!("layer {layer} is not the front layer")));
        }
        if content.state() != LayerState::Live || self.rebuild_pending(layer) {
            return Err(StrataError::invalid_state(format!("layer {layer} is busy")));
        }
        if content.expanded.contains_key(&uid) {
            return Err(StrataError::invalid_state(format!("`{uid}` is already expanded")));
        }
        let entity = content.entity_of(uid)?.clone();
        if !entity.can_expand(self.is_running()) {
            return Err(StrataError::invalid_state(format!("`{uid}` can not be expanded")));
        }

        let parent_organizer = Rc::clone(content.organizer());
        let depth = content.depth() + 1;
        let (params, pool_stream) = child_params(&parent_organizer, &entity)?;
        let organizer = Rc::new(LayerOrganizer::new(params)?);
        let placement = Placement {
            parent: Some(layer),
            from_entity: Some(uid),
            depth,
        };
        let mut child = self.build_content(placement, organizer, pool_stream)?;
        let child_key = child.key();
        self.watch_pool(&mut child);

        let color = self.style.palette.color(depth);
        let dim = self.style.dim_opacity;
        let parent = self
            .layers
            .get_mut(&layer)
            .ok_or_else(|| StrataError::UnknownLayer(layer.to_string()))?;
        let mut record = parent
            .dim_entity(uid, dim, color)
            .ok_or(StrataError::UnknownEntity(uid))?;
        record.key = child_key;
        parent.set_front(false);
        parent.state = LayerState::ExpandingChild;
        record.boundaries = self.dim_boundaries(layer, uid, dim);
        if let Some(parent) = self.layers.get_mut(&layer) {
            parent.expanded.insert(uid, record);
        }
        self.layers.insert(child_key, child);

        let target = self
            .layer_world_bounds(child_key)
            .map_or(self.root_offset, |bounds| self.root_offset - bounds.center());
        if let Some(child) = self.layers.get_mut(&child_key) {
            child.scale = 0.0;
        }
        let animation = Animation::new(Transition::Expand, Some(child_key), self.animation.expand_duration())
            .with_track(Track::LayerScale {
                layer: child_key,
                from: 0.0,
                to: 1.0,
            })
            .with_track(Track::RootTranslation {
                from: self.root_offset,
                to: target,
            });
        self.animations.insert(format!("expand:{child_key}"), animation);

        info!(layer = layer.to_string(), entity = uid.to_string(), child = child_key.to_string(); "Expanding");
        Ok(child_key)
    }

    /// Starts closing `layer`. The parent becomes the front layer at once; the
    /// layer is removed when the collapse animation completes.
    ///
    /// Collapsing an unknown, collapsing or disposed layer does nothing.
    ///
    /// # Errors
    /// `StrataError::InvalidState` for the root layer, a layer with expanded
    /// children, or a layer still appearing.
    pub fn collapse(&mut self, layer: LayerKey) -> Result<(), StrataError> {
        let Some(content) = self.layers.get(&layer) else {
            return Ok(());
        };
        if matches!(content.state(), LayerState::Collapsing | LayerState::Disposed) {
            return Ok(());
        }
        let (Some(parent), Some(from_entity)) = (content.parent(), content.from_entity()) else {
            return Err(StrataError::invalid_state("the root layer can not be collapsed"));
        };
        if content.expanded().next().is_some() {
            return Err(StrataError::invalid_state(format!("layer {layer} has expanded children")));
        }
        if self.animations.values().any(|a| a.subject() == Some(layer)) {
            return Err(StrataError::invalid_state(format!("layer {layer} is still animating")));
        }
        let uid = content.uid();
        let from_scale = content.scale();

        if let Some(content) = self.layers.get_mut(&layer) {
            content.state = LayerState::Collapsing;
            content.set_front(false);
        }
        self.front = Some(parent);
        if let Some(parent) = self.layers.get_mut(&parent) {
            parent.set_front(true);
            parent.boundaries.remove(&(from_entity, uid));
        }

        let target = self
            .layer_world_bounds(parent)
            .map_or(self.root_offset, |bounds| self.root_offset - bounds.center());
        let animation = Animation::new(Transition::Collapse, Some(layer), self.animation.collapse_duration())
            .with_track(Track::LayerScale {
                layer,
                from: from_scale,
                to: 0.0,
            })
            .with_track(Track::RootTranslation {
                from: self.root_offset,
                to: target,
            });
        self.animations.insert(format!("collapse:{layer}"), animation);

        info!(layer = layer.to_string(), parent = parent.to_string(); "Collapsing");
        Ok(())
    }

    /// Moves the camera onto `layer`.
    ///
    /// # Errors
    /// Returns `StrataError::UnknownLayer` if the layer is not open.
    pub fn focus(&mut self, layer: LayerKey) -> Result<(), StrataError> {
        if !self.layers.contains_key(&layer) {
            return Err(StrataError::UnknownLayer(layer.to_string()));
        }
        let Some(bounds) = self.layer_world_bounds(layer) else {
            return Ok(());
        };
        let animation = Animation::new(Transition::Focus, None, self.animation.focus_duration()).with_track(
            Track::RootTranslation {
                from: self.root_offset,
                to: self.root_offset - bounds.center(),
            },
        );
        self.animations.insert("focus".to_string(), animation);
        debug!(layer = layer.to_string(); "Focus");
        Ok(())
    }

    /// # Errors
    /// Returns `StrataError::UnknownLayer` if the layer is not open.
    pub fn toggle_transparent(&mut self, layer: LayerKey) -> Result<(), StrataError> {
        let opacity = self.style.transparent_opacity;
        let content = self
            .layers
            .get_mut(&layer)
            .ok_or_else(|| StrataError::UnknownLayer(layer.to_string()))?;
        content.toggle_transparent(opacity);
        Ok(())
    }

    /// Returns `true` while an animation touches `layer` or one of its
    /// descendants, or a rebuild of it is under way.
    pub fn is_busy(&self, layer: LayerKey) -> bool {
        let mut subtree = self.descendants(layer);
        subtree.push(layer);
        self.rebuilds.contains_key(&layer)
            || self
                .animations
                .values()
                .filter_map(Animation::subject)
                .any(|subject| subtree.contains(&subject))
    }

    /// Open descendants of `layer`, deepest first.
    pub fn descendants(&self, layer: LayerKey) -> Vec<LayerKey> {
        let mut out = Vec::new();
        self.collect_descendants(layer, &mut out);
        out
    }

    fn collect_descendants(&self, layer: LayerKey, out: &mut Vec<LayerKey>) {
        let Some(content) = self.layers.get(&layer) else {
            return;
        };
        for (_, child) in content.expanded() {
            self.collect_descendants(child, out);
            out.push(child);
        }
    }

    /// Open ancestors of `layer`, parent first.
    pub fn ancestors(&self, layer: LayerKey) -> Vec<LayerKey> {
        let mut out = Vec::new();
        let mut current = self.layers.get(&layer).and_then(LayerContent::parent);
        while let Some(key) = current {
            out.push(key);
            current = self.layers.get(&key).and_then(LayerContent::parent);
        }
        out
    }

    /// World placement of `layer`. A child is anchored on the entity it was
    /// expanded from and scaled relative to its parent.
    pub fn transform(&self, layer: LayerKey) -> Option<Transform> {
        let content = self.layers.get(&layer)?;
        match (content.parent(), content.from_entity()) {
            (Some(parent), Some(from_entity)) => {
                let parent_transform = self.transform(parent)?;
                let anchor = self.layers.get(&parent)?.entity(from_entity)?.position();
                Some(Transform {
                    offset: parent_transform.apply(anchor),
                    scale: parent_transform.scale * content.scale(),
                })
            }
            _ => Some(Transform {
                offset: self.root_offset,
                scale: content.scale(),
            }),
        }
    }

    /// Box of `layer` in world space; `None` for an empty layer.
    pub fn layer_world_bounds(&self, layer: LayerKey) -> Option<Bounds3> {
        let transform = self.transform(layer)?;
        let bounds = self.layers.get(&layer)?.bounds()?;
        Some(bounds.transform(transform.scale, transform.offset))
    }

    /// Box of every open layer in world space.
    pub fn bounds(&self) -> Option<Bounds3> {
        self.layers
            .keys()
            .filter_map(|key| self.layer_world_bounds(*key))
            .reduce(Bounds3::merge)
    }

    /// World anchors of the two extremities of a boundary connection.
    pub fn boundary_endpoints(&self, proxy: &BoundaryProxy) -> Option<(Vec3, Vec3)> {
        let model = proxy.connection().model();
        let anchor = |extremity: Extremity, kind: SlotKind| {
            let layer = proxy.layer(extremity);
            let local = self.layers.get(&layer)?.slot_anchor(model.endpoint(extremity), kind)?;
            Some(self.transform(layer)?.apply(local))
        };
        let endpoints = anchor(Extremity::Start, SlotKind::Output).zip(anchor(Extremity::End, SlotKind::Input));
        if endpoints.is_none() {
            trace!(connection = proxy.uid().to_string(); "Boundary endpoint not drawn");
        }
        endpoints
    }

    fn next_key(&mut self) -> LayerKey {
        let key = LayerKey::new(self.next_key);
        self.next_key += 1;
        key
    }

    /// Queues `command` for the next tick.
    pub fn queue(&self, command: Command) {
        if self.sender.send(command).is_err() {
            debug!("Command channel closed");
        }
    }

    fn coordinates(&mut self, organizer: &LayerOrganizer, depth: usize) -> Result<IndexMap<Id, Vec3>, StrataError> {
        let z = if depth == 0 {
            0.0
        } else {
            self.layout.child_layer_depth()
        };
        let engine = self.engines.engine(self.layout.engine());
        compute_coordinates(engine, &organizer.dag_data(), z)
    }

    fn build_content(
        &mut self,
        placement: Placement,
        organizer: Rc<LayerOrganizer>,
        pool_stream: Option<PoolStream>,
    ) -> Result<LayerContent, StrataError> {
        let coordinates = self.coordinates(&organizer, placement.depth)?;
        let key = self.next_key();
        Ok(LayerContent::new(
            key,
            placement,
            organizer,
            pool_stream,
            &coordinates,
            &self.style,
        ))
    }

    /// Forwards the pool emissions of `content` after the current one.
    fn watch_pool(&self, content: &mut LayerContent) {
        let Some(stream) = content.pool_stream() else {
            return;
        };
        let key = content.key();
        let sender = self.sender.clone();
        let mut skip = stream.value().is_some();
        let subscription = stream.subscribe(move |notification| {
            if let Notification::Next(pool) = notification {
                if skip {
                    skip = false;
                    return;
                }
                let command = Command::PoolChanged {
                    layer: key,
                    pool: Rc::clone(pool),
                };
                if sender.send(command).is_err() {
                    debug!(layer = key.to_string(); "Command channel closed");
                }
            }
        });
        content.subscriptions.push(subscription);
    }

    /// Dims the boundaries drawn in any open layer that touch `uid` in
    /// `layer`. Returns their previous opacities.
    fn dim_boundaries(&mut self, layer: LayerKey, uid: Id, opacity: f32) -> Vec<(Id, f32)> {
        let mut dimmed = Vec::new();
        for content in self.layers.values_mut() {
            for proxy in content.boundaries.proxies_mut() {
                if proxy.touches(layer, uid) {
                    dimmed.push((proxy.uid(), proxy.opacity()));
                    proxy.set_opacity(opacity);
                }
            }
        }
        dimmed
    }

    fn restore_boundaries(&mut self, layer: LayerKey, uid: Id, previous: &[(Id, f32)]) {
        for content in self.layers.values_mut() {
            for proxy in content.boundaries.proxies_mut() {
                if !proxy.touches(layer, uid) {
                    continue;
                }
                if let Some((_, opacity)) = previous.iter().find(|(boundary, _)| *boundary == proxy.uid()) {
                    proxy.set_opacity(*opacity);
                }
            }
        }
    }

    fn finish_expand(&mut self, child: LayerKey) -> Result<(), StrataError> {
        let Some(content) = self.layers.get(&child) else {
            return Ok(());
        };
        let (Some(parent), Some(from_entity)) = (content.parent(), content.from_entity()) else {
            return Ok(());
        };
        if let Some(parent) = self.layers.get_mut(&parent) {
            parent.state = LayerState::Live;
        }
        if let Some(content) = self.layers.get(&child) {
            content.set_front(true);
        }
        self.front = Some(child);
        self.synthesize_boundaries(child)?;
        info!(layer = child.to_string(), entity = from_entity.to_string(); "Expanded");
        Ok(())
    }

    /// Resolves the boundary connections between `child` and the open layers
    /// above it, and registers them in the parent layer.
    fn synthesize_boundaries(&mut self, child: LayerKey) -> Result<(), StrataError> {
        let Some(content) = self.layers.get(&child) else {
            return Ok(());
        };
        let (Some(parent_key), Some(from_entity)) = (content.parent(), content.from_entity()) else {
            return Ok(());
        };
        let Some(parent) = self.layers.get(&parent_key) else {
            return Ok(());
        };
        let ancestors = std::iter::once(parent_key)
            .chain(self.ancestors(parent_key))
            .filter_map(|key| self.layers.get(&key).map(|layer| (layer.uid(), key)))
            .collect();
        let entity = parent.entity_of(from_entity)?;
        let ctx = BoundaryContext {
            parent: parent.organizer(),
            child: (content.uid(), child),
            child_pool: content.organizer().instance_pool(),
            ancestors,
        };
        let proxies = crossing::inter_connections(&ctx, entity)?;
        let key = (from_entity, content.uid());
        if let Some(parent) = self.layers.get_mut(&parent_key) {
            parent.boundaries.insert(key, proxies);
        }
        Ok(())
    }

    fn finish_collapse(&mut self, layer: LayerKey) -> Result<(), StrataError> {
        let Some(mut content) = self.layers.shift_remove(&layer) else {
            return Ok(());
        };
        content.state = LayerState::Disposed;
        content.subscriptions.clear();
        let (Some(parent_key), Some(from_entity)) = (content.parent(), content.from_entity()) else {
            return Ok(());
        };

        let record = self
            .layers
            .get_mut(&parent_key)
            .and_then(|parent| parent.expanded.shift_remove(&from_entity));
        if let Some(record) = record {
            if let Some(parent) = self.layers.get_mut(&parent_key) {
                parent.restore_entity(from_entity, &record);
            }
            self.restore_boundaries(parent_key, from_entity, &record.boundaries);
        }
        let is_front = self.front == Some(parent_key);
        if let Some(parent) = self.layers.get(&parent_key) {
            parent.set_front(is_front);
        }
        info!(layer = layer.to_string(), parent = parent_key.to_string(); "Collapsed");

        let waiting: Vec<LayerKey> = self.rebuilds.keys().copied().collect();
        for key in waiting {
            self.advance_rebuild(key)?;
        }
        Ok(())
    }

    fn rebuild_pending(&self, layer: LayerKey) -> bool {
        std::iter::once(layer)
            .chain(self.ancestors(layer))
            .any(|key| self.rebuilds.contains_key(&key))
    }

    fn pool_changed(&mut self, layer: LayerKey, pool: Rc<InstancePool>) -> Result<(), StrataError> {
        let Some(content) = self.layers.get(&layer) else {
            return Ok(());
        };
        if matches!(content.state(), LayerState::Collapsing | LayerState::Disposed) {
            return Ok(());
        }
        if self.is_busy(layer) {
            debug!(layer = layer.to_string(); "Rebuild deferred");
            if let Some(content) = self.layers.get_mut(&layer) {
                content.pending_pool = Some(pool);
            }
            return Ok(());
        }
        debug!(layer = layer.to_string(), modules = pool.modules().len(); "Instance pool changed");
        self.rebuilds.insert(layer, RebuildPlan { pool });
        self.advance_rebuild(layer)
    }

    /// Collapses the deepest open descendant of `layer`, one at a time, then
    /// rebuilds `layer` or collapses it for an empty pool.
    fn advance_rebuild(&mut self, layer: LayerKey) -> Result<(), StrataError> {
        if !self.layers.contains_key(&layer) {
            self.rebuilds.shift_remove(&layer);
            return Ok(());
        }
        if let Some(&deepest) = self.descendants(layer).first() {
            let collapsing = self
                .layers
                .get(&deepest)
                .is_some_and(|content| content.state() == LayerState::Collapsing);
            if !collapsing {
                self.collapse(deepest)?;
            }
            return Ok(());
        }
        let Some(plan) = self.rebuilds.shift_remove(&layer) else {
            return Ok(());
        };
        if plan.pool.is_empty() {
            info!(layer = layer.to_string(); "Instance pool emptied");
            return self.collapse(layer);
        }
        self.rebuild(layer, plan.pool)
    }

    fn rebuild(&mut self, layer: LayerKey, pool: Rc<InstancePool>) -> Result<(), StrataError> {
        let Some(content) = self.layers.get(&layer) else {
            return Ok(());
        };
        let old = Rc::clone(content.organizer());
        let old_uid = content.uid();
        let depth = content.depth();
        let (workflow, layer_id) = match old.kind() {
            LayerKind::Nested { .. } => {
                let workflow = Rc::new(pool.to_flat_workflow_model());
                let layer_id = workflow.root_layer().uid();
                (workflow, layer_id)
            }
            _ => (Rc::clone(old.workflow()), old.layer_id()),
        };
        let organizer = Rc::new(LayerOrganizer::new(OrganizerParams {
            project: Rc::clone(old.project()),
            instance_pool: pool,
            workflow,
            layer_id,
            parent: old.parent().cloned(),
            kind: old.kind().clone(),
        })?);
        let coordinates = self.coordinates(&organizer, depth)?;
        let Some(content) = self.layers.get_mut(&layer) else {
            return Ok(());
        };
        content.rebuild(organizer, &coordinates, &self.style);
        let (parent, from_entity) = (content.parent(), content.from_entity());

        if let (Some(parent), Some(from_entity)) = (parent, from_entity) {
            if let Some(parent) = self.layers.get_mut(&parent) {
                parent.boundaries.remove(&(from_entity, old_uid));
            }
            self.synthesize_boundaries(layer)?;
        }
        info!(layer = layer.to_string(); "Layer rebuilt");
        Ok(())
    }

    /// Replays deferred pool emissions of layers that are no longer busy.
    fn flush_pending_pools(&mut self) -> Result<(), StrataError> {
        let ready: Vec<LayerKey> = self
            .layers
            .iter()
            .filter(|(key, content)| content.pending_pool.is_some() && !self.is_busy(**key))
            .map(|(key, _)| *key)
            .collect();
        for key in ready {
            let pool = self.layers.get_mut(&key).and_then(|content| content.pending_pool.take());
            if let Some(pool) = pool {
                self.pool_changed(key, pool)?;
            }
        }
        Ok(())
    }
}

/// Organizer inputs and pool stream of the child layer opened from `entity`.
fn child_params(
    parent: &Rc<LayerOrganizer>,
    entity: &Entity,
) -> Result<(OrganizerParams, Option<PoolStream>), StrataError> {
    let project = Rc::clone(parent.project());
    let current_pool = || {
        entity
            .current_pool()
            .ok_or_else(|| StrataError::invalid_state(format!("`{}` has no instance pool", entity.uid())))
    };
    match entity {
        Entity::Group(group) => Ok((
            OrganizerParams {
                project,
                instance_pool: Rc::clone(parent.instance_pool()),
                workflow: Rc::clone(parent.workflow()),
                layer_id: group.layer().uid(),
                parent: Some(Rc::clone(parent)),
                kind: LayerKind::Group {
                    group_id: group.layer().uid(),
                },
            },
            None,
        )),
        Entity::Macro(macro_entity) => {
            let workflow = Rc::clone(macro_entity.model().workflow());
            Ok((
                OrganizerParams {
                    project,
                    instance_pool: current_pool()?,
                    layer_id: workflow.root_layer().uid(),
                    workflow,
                    parent: Some(Rc::clone(parent)),
                    kind: LayerKind::for_macro(entity.uid(), macro_entity.model()),
                },
                entity.pool_stream().cloned(),
            ))
        }
        Entity::Nested(nested) => {
            let pool = current_pool()?;
            let workflow = Rc::new(pool.to_flat_workflow_model());
            Ok((
                OrganizerParams {
                    project,
                    instance_pool: pool,
                    layer_id: workflow.root_layer().uid(),
                    workflow,
                    parent: Some(Rc::clone(parent)),
                    kind: LayerKind::Nested { uid: entity.uid() },
                },
                Some(nested.pool().clone()),
            ))
        }
        Entity::Module(_) => Err(StrataError::invalid_state(format!(
            "module `{}` has no child layer",
            entity.uid()
        ))),
    }
}
