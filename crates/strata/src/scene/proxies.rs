//! Renderer-facing proxy objects.
//!
//! Proxies carry what a renderer needs to draw a layer: positions, colors,
//! opacities and slot anchors. Positions are local to the owning layer; see
//! [`Scene::transform`](super::Scene::transform) for world coordinates.

use strata_core::{
    color::Color,
    geometry::{Bounds3, Vec3},
    identifier::Id,
    model::Extremity,
    observable::Subscription,
    runtime::{ConnectionStatus, SlotKind},
};

use super::LayerKey;
use crate::structure::{Entity, HasSlots, InterLayerConnection, IntraLayerConnection};

/// Size of an entity box along X (the flow direction).
pub const ENTITY_WIDTH: f32 = 8.0;

/// Size of an entity box along Y.
pub const ENTITY_HEIGHT: f32 = 10.0;

pub const ENTITY_DEPTH: f32 = 1.0;

/// Gap between an entity box and its slot anchors.
const SLOT_PADDING: f32 = 1.0;

/// Distance between a connection extremity and its bezier control point.
const CURVE_TANGENT: f32 = 10.0;

/// Width of the background strip drawn on the left of a layer.
const BACKGROUND_WIDTH: f32 = 5.0;

#[derive(Debug, Clone)]
pub struct EntityProxy {
    entity: Entity,
    position: Vec3,
    color: Color,
    opacity: f32,
}

impl EntityProxy {
    pub fn new(entity: Entity, position: Vec3, color: Color) -> Self {
        Self {
            entity,
            position,
            color,
            opacity: 1.0,
        }
    }

    pub fn uid(&self) -> Id {
        self.entity.uid()
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity;
    }

    /// Box of the entity, in layer coordinates.
    pub fn bounds(&self) -> Bounds3 {
        Bounds3::from_center(
            self.position,
            Vec3::new(ENTITY_WIDTH, ENTITY_HEIGHT, ENTITY_DEPTH) * 0.5,
        )
    }

    /// Anchor of the `index`-th slot of `kind`. Inputs sit on the left of
    /// the box, outputs on the right, spread evenly along Y.
    pub fn slot_anchor(&self, kind: SlotKind, index: usize) -> Option<Vec3> {
        let count = self.entity.slots(kind).len();
        if index >= count {
            return None;
        }
        let delta = (ENTITY_HEIGHT - SLOT_PADDING) / count as f32;
        let y = -(index as f32 - (count as f32 - 1.0) / 2.0) * delta;
        let x = match kind {
            SlotKind::Input => -(ENTITY_WIDTH * 0.5 + SLOT_PADDING),
            SlotKind::Output => ENTITY_WIDTH * 0.5 + SLOT_PADDING,
        };
        Some(self.position + Vec3::new(x, y, 0.0))
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionProxy {
    connection: IntraLayerConnection,
    start: Vec3,
    end: Vec3,
    opacity: f32,
}

impl ConnectionProxy {
    pub fn new(connection: IntraLayerConnection, start: Vec3, end: Vec3) -> Self {
        Self {
            connection,
            start,
            end,
            opacity: 1.0,
        }
    }

    pub fn uid(&self) -> Id {
        self.connection.uid()
    }

    pub fn connection(&self) -> &IntraLayerConnection {
        &self.connection
    }

    pub fn start(&self) -> Vec3 {
        self.start
    }

    pub fn end(&self) -> Vec3 {
        self.end
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity;
    }

    /// Returns `true` if an extremity sits on `module`.
    pub fn touches(&self, module: Id) -> bool {
        self.connection.model().touches(module)
    }

    /// Current runtime status; undeployed connections are `Unconnected`.
    pub fn status(&self) -> ConnectionStatus {
        self.connection
            .instance()
            .and_then(|instance| instance.status().value())
            .unwrap_or(ConnectionStatus::Unconnected)
    }

    pub fn has_adaptor(&self) -> bool {
        self.connection.model().configuration().adaptor().is_some()
    }

    /// Points of the curve drawn between the two anchors.
    pub fn curve_points(&self, segments: usize) -> Vec<Vec3> {
        curve_points(self.start, self.end, segments)
    }
}

/// A connection crossing a layer boundary, between two open layers.
#[derive(Debug)]
pub struct BoundaryProxy {
    connection: InterLayerConnection,
    start_layer: LayerKey,
    end_layer: LayerKey,
    opacity: f32,
    status_subscription: Option<Subscription>,
}

impl BoundaryProxy {
    pub fn new(connection: InterLayerConnection, start_layer: LayerKey, end_layer: LayerKey) -> Self {
        Self {
            connection,
            start_layer,
            end_layer,
            opacity: 1.0,
            status_subscription: None,
        }
    }

    /// Keeps the subscription feeding the connection's status alive as long
    /// as the proxy is drawn.
    pub fn with_status_subscription(mut self, subscription: Subscription) -> Self {
        self.status_subscription = Some(subscription);
        self
    }

    pub fn uid(&self) -> Id {
        self.connection.uid()
    }

    pub fn connection(&self) -> &InterLayerConnection {
        &self.connection
    }

    /// Layer holding the given extremity.
    pub fn layer(&self, extremity: Extremity) -> LayerKey {
        match extremity {
            Extremity::Start => self.start_layer,
            Extremity::End => self.end_layer,
        }
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity;
    }

    /// Returns `true` if an extremity sits on `module` within `layer`.
    pub fn touches(&self, layer: LayerKey, module: Id) -> bool {
        let model = self.connection.model();
        (self.start_layer == layer && model.start().module_id() == module)
            || (self.end_layer == layer && model.end().module_id() == module)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection
            .status()
            .and_then(|status| status.value())
            .unwrap_or(ConnectionStatus::Connected)
    }
}

impl Drop for BoundaryProxy {
    fn drop(&mut self) {
        if let Some(subscription) = self.status_subscription.take() {
            subscription.unsubscribe();
        }
    }
}

/// Pickable strip on the left of a layer, tinted after the layer depth.
#[derive(Debug, Clone)]
pub struct LayerBackground {
    bounds: Bounds3,
    base_color: Color,
    whitening: f32,
    opacity: f32,
}

impl LayerBackground {
    /// Builds the strip covering the Y extent of `content`, or nothing for an
    /// empty layer.
    pub fn new<'a>(
        content: impl IntoIterator<Item = &'a EntityProxy>,
        base_color: Color,
        whitening: f32,
    ) -> Option<Self> {
        let content = content
            .into_iter()
            .map(EntityProxy::bounds)
            .reduce(Bounds3::merge)?;
        let (min, max) = (content.min(), content.max());
        let height = (max.y - min.y) * 1.1;
        let center = Vec3::new(min.x - BACKGROUND_WIDTH, 0.5 * (min.y + max.y), min.z);
        Some(Self {
            bounds: Bounds3::from_center(center, Vec3::new(BACKGROUND_WIDTH * 0.5, height * 0.5, 0.0)),
            base_color,
            whitening,
            opacity: 1.0,
        })
    }

    pub fn bounds(&self) -> Bounds3 {
        self.bounds
    }

    pub fn color(&self) -> Color {
        self.base_color.whiten(self.whitening)
    }

    /// Color while hovered.
    pub fn hovered_color(&self) -> Color {
        self.base_color.whiten(self.whitening + 0.1)
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity;
    }
}

/// Cubic bezier leaving `start` and reaching `end` horizontally.
pub fn curve_points(start: Vec3, end: Vec3, segments: usize) -> Vec<Vec3> {
    let segments = segments.max(1);
    let p1 = start + Vec3::X * CURVE_TANGENT;
    let p2 = end - Vec3::X * CURVE_TANGENT;
    (0..=segments)
        .map(|i| {
            let t = i as f32 / segments as f32;
            let u = 1.0 - t;
            start * (u * u * u) + p1 * (3.0 * u * u * t) + p2 * (3.0 * u * t * t) + end * (t * t * t)
        })
        .collect()
}
