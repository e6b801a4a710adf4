//! Deployed instances and their live streams.
//!
//! An [`InstancePool`] holds the runtime side of a workflow: one
//! [`ModuleInstance`] per deployed module, with its slots as message streams,
//! and one [`ConnectionInstance`] per wired connection, with its status
//! stream. Modules running a dynamic sub-graph expose their own pool as an
//! observable that re-emits whenever the sub-graph changes.

use std::{fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    identifier::Id,
    model::{ConnectionModel, Layer, ModuleModel, SlotId, SlotRef, WorkflowModel},
    observable::{Notification, Observable, Subscription},
};

/// Payload carried by slot streams. The engine only observes its arrival.
pub type Message = String;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Disconnected,
    Unconnected,
    Connected,
    Started,
    Completed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Unconnected => "unconnected",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Started => "started",
            ConnectionStatus::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Direction of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Input,
    Output,
}

/// A runtime slot and the messages flowing through it.
#[derive(Debug, Clone)]
pub struct SlotInstance {
    slot_id: Id,
    messages: Observable<Message>,
}

impl SlotInstance {
    pub fn new(slot_id: impl Into<Id>) -> Self {
        Self {
            slot_id: slot_id.into(),
            messages: Observable::new(),
        }
    }

    pub fn slot_id(&self) -> Id {
        self.slot_id
    }

    pub fn messages(&self) -> &Observable<Message> {
        &self.messages
    }

    /// Status stream following the traffic on this slot.
    ///
    /// Starts as [`ConnectionStatus::Connected`], switches to
    /// [`ConnectionStatus::Started`] on the first message and to
    /// [`ConnectionStatus::Completed`] when the slot completes. The returned
    /// subscription keeps the status in sync.
    pub fn derived_status(&self) -> (Observable<ConnectionStatus>, Subscription) {
        let status = Observable::with_value(ConnectionStatus::Connected);
        let sink = status.clone();
        let subscription = self.messages.subscribe(move |notification| match notification {
            Notification::Next(_) => {
                if sink.value() == Some(ConnectionStatus::Connected) {
                    sink.next(ConnectionStatus::Started);
                }
            }
            Notification::Complete => sink.next(ConnectionStatus::Completed),
        });
        (status, subscription)
    }
}

/// Worker a module instance runs in, when deployed in a worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRef {
    pool_id: Id,
    worker_id: Id,
}

impl WorkerRef {
    pub fn new(pool_id: impl Into<Id>, worker_id: impl Into<Id>) -> Self {
        Self {
            pool_id: pool_id.into(),
            worker_id: worker_id.into(),
        }
    }

    pub fn pool_id(&self) -> Id {
        self.pool_id
    }

    pub fn worker_id(&self) -> Id {
        self.worker_id
    }
}

/// Observable reference to a nested instance pool.
pub type PoolStream = Observable<Rc<InstancePool>>;

#[derive(Debug, Clone)]
pub struct ModuleInstance {
    uid: Id,
    type_id: Id,
    toolbox_id: Id,
    input_slots: Vec<SlotInstance>,
    output_slots: Vec<SlotInstance>,
    instance_pool: Option<PoolStream>,
    html_view: bool,
    documentation: Option<String>,
    worker: Option<WorkerRef>,
}

impl ModuleInstance {
    pub fn new(uid: impl Into<Id>, type_id: impl Into<Id>, toolbox_id: impl Into<Id>) -> Self {
        Self {
            uid: uid.into(),
            type_id: type_id.into(),
            toolbox_id: toolbox_id.into(),
            input_slots: Vec::new(),
            output_slots: Vec::new(),
            instance_pool: None,
            html_view: false,
            documentation: None,
            worker: None,
        }
    }

    /// Instance matching a structural module, without slots.
    pub fn from_model(model: &ModuleModel) -> Self {
        Self::new(model.uid(), model.type_id(), model.toolbox_id())
    }

    pub fn with_input(mut self, slot_id: &str) -> Self {
        self.input_slots.push(SlotInstance::new(slot_id));
        self
    }

    pub fn with_output(mut self, slot_id: &str) -> Self {
        self.output_slots.push(SlotInstance::new(slot_id));
        self
    }

    pub fn with_instance_pool(mut self, pool: PoolStream) -> Self {
        self.instance_pool = Some(pool);
        self
    }

    pub fn with_html_view(mut self) -> Self {
        self.html_view = true;
        self
    }

    pub fn with_documentation(mut self, url: impl Into<String>) -> Self {
        self.documentation = Some(url.into());
        self
    }

    pub fn with_worker(mut self, worker: WorkerRef) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn uid(&self) -> Id {
        self.uid
    }

    pub fn type_id(&self) -> Id {
        self.type_id
    }

    pub fn toolbox_id(&self) -> Id {
        self.toolbox_id
    }

    pub fn input_slots(&self) -> &[SlotInstance] {
        &self.input_slots
    }

    pub fn output_slots(&self) -> &[SlotInstance] {
        &self.output_slots
    }

    pub fn slots(&self, kind: SlotKind) -> &[SlotInstance] {
        match kind {
            SlotKind::Input => &self.input_slots,
            SlotKind::Output => &self.output_slots,
        }
    }

    /// Position of a slot within its direction, by index or by name.
    pub fn slot_index(&self, kind: SlotKind, slot_id: SlotId) -> Option<usize> {
        let slots = self.slots(kind);
        match slot_id {
            SlotId::Index(index) => (index < slots.len()).then_some(index),
            SlotId::Name(name) => slots.iter().position(|slot| slot.slot_id == name),
        }
    }

    pub fn slot(&self, kind: SlotKind, slot_id: SlotId) -> Option<&SlotInstance> {
        self.slot_index(kind, slot_id)
            .and_then(|index| self.slots(kind).get(index))
    }

    /// Nested pool of a dynamic module.
    pub fn instance_pool(&self) -> Option<&PoolStream> {
        self.instance_pool.as_ref()
    }

    pub fn has_html_view(&self) -> bool {
        self.html_view
    }

    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }

    pub fn worker(&self) -> Option<&WorkerRef> {
        self.worker.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionInstance {
    uid: Id,
    start: SlotRef,
    end: SlotRef,
    status: Observable<ConnectionStatus>,
}

impl ConnectionInstance {
    pub fn new(uid: impl Into<Id>, start: SlotRef, end: SlotRef) -> Self {
        Self {
            uid: uid.into(),
            start,
            end,
            status: Observable::with_value(ConnectionStatus::Connected),
        }
    }

    /// Instance sharing the endpoints of `model`.
    pub fn from_model(model: &ConnectionModel) -> Self {
        Self::new(model.uid(), model.start(), model.end())
    }

    /// Same connection with a provided status stream.
    pub fn with_status(mut self, status: Observable<ConnectionStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn uid(&self) -> Id {
        self.uid
    }

    pub fn start(&self) -> SlotRef {
        self.start
    }

    pub fn end(&self) -> SlotRef {
        self.end
    }

    pub fn status(&self) -> &Observable<ConnectionStatus> {
        &self.status
    }
}

/// One link between an inner slot and an outer virtual slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HintEntry {
    kind: SlotKind,
    parent: usize,
    child: SlotRef,
}

impl HintEntry {
    pub fn new(kind: SlotKind, parent: usize, child: SlotRef) -> Self {
        Self {
            kind,
            parent,
            child,
        }
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// Index of the outer slot on the module owning the pool.
    pub fn parent(&self) -> usize {
        self.parent
    }

    pub fn child(&self) -> SlotRef {
        self.child
    }
}

/// Outer slots of one inner module, in the second hint revision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NestedSlotsHint {
    input_slot: Option<usize>,
    output_slot: Option<usize>,
}

impl NestedSlotsHint {
    pub fn new(input_slot: Option<usize>, output_slot: Option<usize>) -> Self {
        Self {
            input_slot,
            output_slot,
        }
    }

    pub fn input_slot(&self) -> Option<usize> {
        self.input_slot
    }

    pub fn output_slot(&self) -> Option<usize> {
        self.output_slot
    }
}

/// Mapping from inner slots of a pool to the outer slots of its owner.
///
/// Both revisions of the contract are kept as they are received; neither is
/// inferred from the other. [`entries`](Self::entries) gives the common view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionsHint {
    /// Explicit `{kind, parent index, child slot}` entries.
    V1(Vec<HintEntry>),
    /// Per inner module, the outer index of its first input and output slot.
    V2(IndexMap<Id, NestedSlotsHint>),
}

impl ConnectionsHint {
    /// Normalized entries. For `V2`, inputs come before outputs per module.
    pub fn entries(&self) -> Vec<HintEntry> {
        match self {
            ConnectionsHint::V1(entries) => entries.clone(),
            ConnectionsHint::V2(modules) => modules
                .iter()
                .flat_map(|(uid, slots)| {
                    let input = slots
                        .input_slot
                        .map(|parent| HintEntry::new(SlotKind::Input, parent, SlotRef::at(*uid, 0)));
                    let output = slots
                        .output_slot
                        .map(|parent| HintEntry::new(SlotKind::Output, parent, SlotRef::at(*uid, 0)));
                    input.into_iter().chain(output)
                })
                .collect(),
        }
    }
}

/// The live set of module and connection instances backing a workflow.
#[derive(Debug, Clone)]
pub struct InstancePool {
    parent_uid: Id,
    modules: Vec<Rc<ModuleInstance>>,
    connections: Vec<Rc<ConnectionInstance>>,
    connections_hint: Option<ConnectionsHint>,
}

impl InstancePool {
    pub fn new(parent_uid: impl Into<Id>) -> Self {
        Self {
            parent_uid: parent_uid.into(),
            modules: Vec::new(),
            connections: Vec::new(),
            connections_hint: None,
        }
    }

    pub fn with_module(mut self, module: ModuleInstance) -> Self {
        self.modules.push(Rc::new(module));
        self
    }

    pub fn with_connection(mut self, connection: ConnectionInstance) -> Self {
        self.connections.push(Rc::new(connection));
        self
    }

    pub fn with_connections_hint(mut self, hint: ConnectionsHint) -> Self {
        self.connections_hint = Some(hint);
        self
    }

    /// Uid of the module (or workflow) owning this pool.
    pub fn parent_uid(&self) -> Id {
        self.parent_uid
    }

    pub fn modules(&self) -> &[Rc<ModuleInstance>] {
        &self.modules
    }

    pub fn connections(&self) -> &[Rc<ConnectionInstance>] {
        &self.connections
    }

    pub fn connections_hint(&self) -> Option<&ConnectionsHint> {
        self.connections_hint.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module(&self, uid: Id) -> Option<&Rc<ModuleInstance>> {
        self.modules.iter().find(|module| module.uid == uid)
    }

    pub fn connection(&self, uid: Id) -> Option<&Rc<ConnectionInstance>> {
        self.connections
            .iter()
            .find(|connection| connection.uid == uid)
    }

    /// Rewrites `slot` to its positional form when its module is deployed
    /// here, so that named and indexed references compare equal.
    pub fn normalize_slot(&self, kind: SlotKind, slot: SlotRef) -> SlotRef {
        self.module(slot.module_id())
            .and_then(|module| module.slot_index(kind, slot.slot_id()))
            .map_or(slot, |index| SlotRef::at(slot.module_id(), index))
    }

    /// Outer slot index mapped to the inner `slot` by `hint`.
    pub fn outer_slot_index(&self, hint: &ConnectionsHint, kind: SlotKind, slot: SlotRef) -> Option<usize> {
        let slot = self.normalize_slot(kind, slot);
        hint.entries()
            .into_iter()
            .find(|entry| entry.kind == kind && self.normalize_slot(kind, entry.child) == slot)
            .map(|entry| entry.parent)
    }

    /// A workflow with a single layer holding every module of this pool.
    pub fn to_flat_workflow_model(&self) -> WorkflowModel {
        let modules = self
            .modules
            .iter()
            .map(|module| ModuleModel::new(module.uid, module.type_id, module.toolbox_id))
            .collect();
        let connections = self
            .connections
            .iter()
            .map(|connection| ConnectionModel::new(connection.uid, connection.start, connection.end))
            .collect();
        let layer_uid = Id::new(&format!("layer_{}", self.parent_uid));
        let root_layer = Layer::new(layer_uid, self.modules.iter().map(|module| module.uid));
        WorkflowModel::new(self.parent_uid, modules, connections, root_layer)
    }
}
