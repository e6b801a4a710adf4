//! Cross-layer connection resolution.
//!
//! When a child layer finishes opening, the connections crossing the
//! boundary between it and the open layers above are synthesized here. There
//! is one strategy per kind of expanded entity:
//!
//! - [`macro_inter_connections`] resolves each declared macro slot upwards
//!   through [`LayerOrganizer::find_relative`];
//! - [`group_inter_connections`] reuses the organizer's equivalent group
//!   connections;
//! - [`nested_inter_connections`] follows the connections hint carried by the
//!   nested instance pool.
//!
//! Every strategy returns the boundary proxies to register in the parent
//! layer. Runtime statuses of macro and nested boundaries are derived from the
//! inner slot's message stream, not taken from the outer connection.

use log::{debug, warn};

use strata_core::{
    identifier::Id,
    model::{ConnectionModel, Extremity, MacroModel, SlotRef},
    observable::{Observable, Subscription},
    runtime::{ConnectionStatus, InstancePool, SlotKind},
};

use crate::{
    StrataError,
    scene::{LayerKey, proxies::BoundaryProxy},
    structure::{Entity, InterLayerConnection, LayerOrganizer, Relative},
};

/// Open layers a boundary may join, and the child's runtime content.
#[derive(Debug)]
pub struct BoundaryContext<'a> {
    /// Organizer of the layer the child was expanded from.
    pub parent: &'a LayerOrganizer,
    pub child: (Id, LayerKey),
    pub child_pool: &'a InstancePool,
    /// Open layers from the parent up to the root.
    pub ancestors: Vec<(Id, LayerKey)>,
}

impl BoundaryContext<'_> {
    fn key_of(&self, layer: Id) -> Option<LayerKey> {
        self.ancestors
            .iter()
            .find(|(uid, _)| *uid == layer)
            .map(|(_, key)| *key)
    }

    fn parent_key(&self) -> Option<LayerKey> {
        self.ancestors.first().map(|(_, key)| *key)
    }

    /// Status following the traffic on an inner slot of the child pool.
    fn inner_status(&self, slot: SlotRef, kind: SlotKind) -> Option<(Observable<ConnectionStatus>, Subscription)> {
        let status = self
            .child_pool
            .module(slot.module_id())
            .and_then(|module| module.slot(kind, slot.slot_id()))
            .map(|slot| slot.derived_status());
        if status.is_none() {
            debug!(slot = slot.to_string(), layer = self.child.0.to_string(); "No inner slot to follow");
        }
        status
    }
}

/// Boundary proxies for `entity`, dispatched on its kind.
///
/// # Errors
/// Propagates `StrataError::MissingConnectionsHint` and any non-recoverable
/// organizer error. Unresolved slots are logged and skipped.
pub fn inter_connections(ctx: &BoundaryContext<'_>, entity: &Entity) -> Result<Vec<BoundaryProxy>, StrataError> {
    let proxies = match entity {
        Entity::Macro(macro_entity) => macro_inter_connections(ctx, entity.uid(), macro_entity.model())?,
        Entity::Group(_) => group_inter_connections(ctx, entity.uid())?,
        Entity::Nested(_) => nested_inter_connections(ctx, entity.uid())?,
        Entity::Module(_) => {
            return Err(StrataError::invalid_state(format!(
                "module `{}` has no child layer",
                entity.uid()
            )));
        }
    };
    debug!(entity = entity.uid().to_string(), boundaries = proxies.len(); "Resolved boundary connections");
    Ok(proxies)
}

/// Boundaries of macro `uid`: one per declared input, then one per declared
/// output.
///
/// # Errors
/// Propagates `StrataError::MissingConnectionsHint`.
pub fn macro_inter_connections(
    ctx: &BoundaryContext<'_>,
    uid: Id,
    model: &MacroModel,
) -> Result<Vec<BoundaryProxy>, StrataError> {
    let inputs = model
        .inputs()
        .iter()
        .enumerate()
        .map(|(i, inner)| (SlotKind::Input, i, *inner));
    let outputs = model
        .outputs()
        .iter()
        .enumerate()
        .map(|(i, inner)| (SlotKind::Output, i, *inner));

    let mut proxies = Vec::new();
    for (kind, index, inner) in inputs.chain(outputs) {
        let Some(relative) = resolve(ctx, SlotRef::at(uid, index), kind)? else {
            continue;
        };
        let model = match kind {
            SlotKind::Input => relative.connection.model().with_end(inner),
            SlotKind::Output => relative.connection.model().with_start(inner),
        };
        if let Some(proxy) = boundary(ctx, model, relative.layer_id, inner, kind) {
            proxies.push(proxy);
        }
    }
    Ok(proxies)
}

/// Boundaries of group `group_id`: its upstream equivalents, entering the
/// group, then its downstream ones, leaving it. Each is drawn as the raw
/// workflow connection it stands for.
///
/// # Errors
/// Returns `StrataError::UnknownLayer` if the parent workflow has no such
/// group.
pub fn group_inter_connections(ctx: &BoundaryContext<'_>, group_id: Id) -> Result<Vec<BoundaryProxy>, StrataError> {
    let equivalents = ctx.parent.equivalent_group_connections(group_id)?;
    let Some(parent_key) = ctx.parent_key() else {
        return Ok(Vec::new());
    };
    let (child_uid, child_key) = ctx.child;

    let upstream = equivalents.upstream.iter().map(|c| (c, true));
    let downstream = equivalents.downstream.iter().map(|c| (c, false));
    let proxies = upstream
        .chain(downstream)
        .filter_map(|(equivalent, entering)| {
            let raw = ctx.parent.raw_connection(equivalent.uid())?.clone();
            let (start, end) = if entering {
                ((ctx.parent.layer_id(), parent_key), (child_uid, child_key))
            } else {
                ((child_uid, child_key), (ctx.parent.layer_id(), parent_key))
            };
            let mut connection = InterLayerConnection::new(raw, start.0, end.0);
            if let Some(instance) = equivalent.instance() {
                connection = connection.with_status(instance.status().clone());
            }
            Some(BoundaryProxy::new(connection, start.1, end.1))
        })
        .collect();
    Ok(proxies)
}

/// Boundaries of nested module `uid`, one per entry of the child pool's
/// connections hint. Uids read `<uid>>><inner>` for inputs and
/// `<inner>>><uid>` for outputs.
///
/// Without a hint nothing can be drawn: a warning is logged and no boundary
/// is returned.
///
/// # Errors
/// Propagates `StrataError::MissingConnectionsHint` raised further up.
pub fn nested_inter_connections(ctx: &BoundaryContext<'_>, uid: Id) -> Result<Vec<BoundaryProxy>, StrataError> {
    let Some(hint) = ctx.child_pool.connections_hint() else {
        warn!(module = uid.to_string(); "No connections hint, nested boundaries not drawn");
        return Ok(Vec::new());
    };

    let mut proxies = Vec::new();
    for entry in hint.entries() {
        let inner = entry.child();
        let kind = entry.kind();
        let Some(relative) = resolve(ctx, SlotRef::at(uid, entry.parent()), kind)? else {
            continue;
        };
        let model = match kind {
            SlotKind::Input => ConnectionModel::new(
                Id::new(&format!("{uid}>>{}", inner.module_id())),
                relative.slot,
                inner,
            ),
            SlotKind::Output => ConnectionModel::new(
                Id::new(&format!("{}>>{uid}", inner.module_id())),
                inner,
                relative.slot,
            ),
        };
        if let Some(proxy) = boundary(ctx, model, relative.layer_id, inner, kind) {
            proxies.push(proxy);
        }
    }
    Ok(proxies)
}

/// Outer relative of the owner slot `outer`. Inputs are fed by an upstream
/// connection, outputs feed a downstream one.
fn resolve(ctx: &BoundaryContext<'_>, outer: SlotRef, kind: SlotKind) -> Result<Option<Relative>, StrataError> {
    let extremity = match kind {
        SlotKind::Input => Extremity::End,
        SlotKind::Output => Extremity::Start,
    };
    match ctx.parent.find_relative(outer, extremity) {
        Ok(relative) => Ok(Some(relative)),
        Err(err) if err.is_recoverable() => {
            warn!(slot = outer.to_string(), err:err; "Boundary connection skipped");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Boundary between the layer `outer_layer` and the child, its status
/// derived from the inner slot.
fn boundary(
    ctx: &BoundaryContext<'_>,
    model: ConnectionModel,
    outer_layer: Id,
    inner: SlotRef,
    kind: SlotKind,
) -> Option<BoundaryProxy> {
    let Some(outer_key) = ctx.key_of(outer_layer) else {
        warn!(layer = outer_layer.to_string(), connection = model.uid().to_string(); "Relative layer is not open");
        return None;
    };
    let (child_uid, child_key) = ctx.child;
    let (connection, start_key, end_key) = match kind {
        SlotKind::Input => (InterLayerConnection::new(model, outer_layer, child_uid), outer_key, child_key),
        SlotKind::Output => (InterLayerConnection::new(model, child_uid, outer_layer), child_key, outer_key),
    };
    match ctx.inner_status(inner, kind) {
        Some((status, subscription)) => Some(
            BoundaryProxy::new(connection.with_status(status), start_key, end_key)
                .with_status_subscription(subscription),
        ),
        None => Some(BoundaryProxy::new(connection, start_key, end_key)),
    }
}
