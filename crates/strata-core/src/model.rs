//! Structural workflow definitions.
//!
//! A [`WorkflowModel`] is what the editor authored: modules, the connections
//! between their slots and a tree of [`Layer`]s grouping modules together.
//! A [`Project`] bundles the main workflow with the macro catalog, the
//! toolboxes and the live [`InstancePool`] that runs it.
//!
//! These types are read-only inputs to the scene engine. They are shared
//! behind `Rc` because several layers of the scene refer to the same workflow.

use std::{fmt, rc::Rc};

use indexmap::IndexSet;

use crate::{identifier::Id, runtime::InstancePool};

/// Address of a slot within a module: by declaration position or by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    Index(usize),
    Name(Id),
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotId::Index(index) => write!(f, "{index}"),
            SlotId::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<usize> for SlotId {
    fn from(index: usize) -> Self {
        SlotId::Index(index)
    }
}

impl From<&str> for SlotId {
    fn from(name: &str) -> Self {
        SlotId::Name(Id::new(name))
    }
}

impl From<Id> for SlotId {
    fn from(name: Id) -> Self {
        SlotId::Name(name)
    }
}

/// A `(module, slot)` pair, one end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    module_id: Id,
    slot_id: SlotId,
}

impl SlotRef {
    pub fn new(module_id: impl Into<Id>, slot_id: SlotId) -> Self {
        Self {
            module_id: module_id.into(),
            slot_id,
        }
    }

    /// Slot addressed by position.
    pub fn at(module_id: impl Into<Id>, index: usize) -> Self {
        Self::new(module_id, SlotId::Index(index))
    }

    /// Slot addressed by name.
    pub fn named(module_id: impl Into<Id>, name: &str) -> Self {
        Self::new(module_id, SlotId::Name(Id::new(name)))
    }

    pub fn module_id(&self) -> Id {
        self.module_id
    }

    pub fn slot_id(&self) -> SlotId {
        self.slot_id
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module_id, self.slot_id)
    }
}

/// Which end of a connection is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extremity {
    Start,
    End,
}

impl Extremity {
    pub fn opposite(self) -> Self {
        match self {
            Extremity::Start => Extremity::End,
            Extremity::End => Extremity::Start,
        }
    }
}

/// Per-connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfiguration {
    adaptor: Option<String>,
}

impl ConnectionConfiguration {
    pub fn with_adaptor(adaptor: impl Into<String>) -> Self {
        Self {
            adaptor: Some(adaptor.into()),
        }
    }

    pub fn adaptor(&self) -> Option<&str> {
        self.adaptor.as_deref()
    }
}

/// A directed edge from an output slot to an input slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionModel {
    uid: Id,
    start: SlotRef,
    end: SlotRef,
    configuration: ConnectionConfiguration,
}

impl ConnectionModel {
    pub fn new(uid: impl Into<Id>, start: SlotRef, end: SlotRef) -> Self {
        Self {
            uid: uid.into(),
            start,
            end,
            configuration: ConnectionConfiguration::default(),
        }
    }

    pub fn with_configuration(mut self, configuration: ConnectionConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Same connection with its start re-pointed to `start`.
    pub fn with_start(&self, start: SlotRef) -> Self {
        Self {
            start,
            ..self.clone()
        }
    }

    /// Same connection with its end re-pointed to `end`.
    pub fn with_end(&self, end: SlotRef) -> Self {
        Self {
            end,
            ..self.clone()
        }
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

    pub fn endpoint(&self, extremity: Extremity) -> SlotRef {
        match extremity {
            Extremity::Start => self.start,
            Extremity::End => self.end,
        }
    }

    pub fn configuration(&self) -> &ConnectionConfiguration {
        &self.configuration
    }

    /// Returns `true` if either end sits on `module_id`.
    pub fn touches(&self, module_id: Id) -> bool {
        self.start.module_id == module_id || self.end.module_id == module_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleModel {
    uid: Id,
    type_id: Id,
    toolbox_id: Id,
}

impl ModuleModel {
    pub fn new(uid: impl Into<Id>, type_id: impl Into<Id>, toolbox_id: impl Into<Id>) -> Self {
        Self {
            uid: uid.into(),
            type_id: type_id.into(),
            toolbox_id: toolbox_id.into(),
        }
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
}

/// A named subset of modules plus nested child layers.
///
/// Layers form a strict tree rooted at [`WorkflowModel::root_layer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    uid: Id,
    module_ids: Vec<Id>,
    children: Vec<Layer>,
}

impl Layer {
    pub fn new(uid: impl Into<Id>, module_ids: impl IntoIterator<Item = Id>) -> Self {
        Self {
            uid: uid.into(),
            module_ids: module_ids.into_iter().collect(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: Layer) -> Self {
        self.children.push(child);
        self
    }

    pub fn uid(&self) -> Id {
        self.uid
    }

    /// Modules directly in this layer, in declaration order.
    pub fn module_ids(&self) -> &[Id] {
        &self.module_ids
    }

    pub fn children(&self) -> &[Layer] {
        &self.children
    }

    pub fn contains_module(&self, uid: Id) -> bool {
        self.module_ids.contains(&uid)
    }

    /// This layer followed by all its descendants, depth first.
    pub fn flat(&self) -> Vec<&Layer> {
        let mut layers = vec![self];
        for child in &self.children {
            layers.extend(child.flat());
        }
        layers
    }

    /// Finds this layer or a descendant by uid.
    pub fn find(&self, uid: Id) -> Option<&Layer> {
        if self.uid == uid {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(uid))
    }

    /// Modules of this layer and of every descendant layer.
    pub fn all_module_ids(&self) -> Vec<Id> {
        self.flat()
            .into_iter()
            .flat_map(|layer| layer.module_ids.iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowModel {
    uid: Id,
    modules: Vec<ModuleModel>,
    connections: Vec<ConnectionModel>,
    root_layer: Layer,
}

impl WorkflowModel {
    pub fn new(
        uid: impl Into<Id>,
        modules: Vec<ModuleModel>,
        connections: Vec<ConnectionModel>,
        root_layer: Layer,
    ) -> Self {
        Self {
            uid: uid.into(),
            modules,
            connections,
            root_layer,
        }
    }

    pub fn uid(&self) -> Id {
        self.uid
    }

    pub fn modules(&self) -> &[ModuleModel] {
        &self.modules
    }

    pub fn connections(&self) -> &[ConnectionModel] {
        &self.connections
    }

    pub fn root_layer(&self) -> &Layer {
        &self.root_layer
    }

    pub fn module(&self, uid: Id) -> Option<&ModuleModel> {
        self.modules.iter().find(|module| module.uid == uid)
    }

    pub fn connection(&self, uid: Id) -> Option<&ConnectionModel> {
        self.connections
            .iter()
            .find(|connection| connection.uid == uid)
    }

    pub fn layer(&self, uid: Id) -> Option<&Layer> {
        self.root_layer.find(uid)
    }
}

/// A reusable sub-workflow shown as a single module.
///
/// `inputs[i]` (resp. `outputs[i]`) is the inner slot behind the macro's
/// `i`-th outer input (resp. output).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroModel {
    workflow: Rc<WorkflowModel>,
    inputs: Vec<SlotRef>,
    outputs: Vec<SlotRef>,
}

impl MacroModel {
    pub fn new(workflow: WorkflowModel, inputs: Vec<SlotRef>, outputs: Vec<SlotRef>) -> Self {
        Self {
            workflow: Rc::new(workflow),
            inputs,
            outputs,
        }
    }

    pub fn uid(&self) -> Id {
        self.workflow.uid()
    }

    pub fn workflow(&self) -> &Rc<WorkflowModel> {
        &self.workflow
    }

    pub fn inputs(&self) -> &[SlotRef] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[SlotRef] {
        &self.outputs
    }
}

/// Display metadata of a toolbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolbox {
    uid: Id,
    name: String,
    icon: Option<String>,
}

impl Toolbox {
    pub fn new(uid: impl Into<Id>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            icon: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn uid(&self) -> Id {
        self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }
}

/// Workflow id under which [`Project::main`] is tracked.
pub const MAIN_WORKFLOW_ID: &str = "main";

/// A snapshot of the project being visualized.
#[derive(Debug, Clone)]
pub struct Project {
    main: Rc<WorkflowModel>,
    macros: Vec<Rc<MacroModel>>,
    macros_toolbox: IndexSet<Id>,
    toolboxes: Vec<Toolbox>,
    instance_pool: Rc<InstancePool>,
    running: bool,
}

impl Project {
    pub fn new(main: WorkflowModel, instance_pool: InstancePool) -> Self {
        Self {
            main: Rc::new(main),
            macros: Vec::new(),
            macros_toolbox: IndexSet::new(),
            toolboxes: Vec::new(),
            instance_pool: Rc::new(instance_pool),
            running: false,
        }
    }

    /// Adds a macro to the catalog and declares its uid as a macro type id.
    pub fn with_macro(mut self, macro_model: MacroModel) -> Self {
        self.macros_toolbox.insert(macro_model.uid());
        self.macros.push(Rc::new(macro_model));
        self
    }

    pub fn with_toolbox(mut self, toolbox: Toolbox) -> Self {
        self.toolboxes.push(toolbox);
        self
    }

    pub fn with_running(mut self, running: bool) -> Self {
        self.running = running;
        self
    }

    pub fn main(&self) -> &Rc<WorkflowModel> {
        &self.main
    }

    pub fn macros(&self) -> &[Rc<MacroModel>] {
        &self.macros
    }

    pub fn toolboxes(&self) -> &[Toolbox] {
        &self.toolboxes
    }

    pub fn instance_pool(&self) -> &Rc<InstancePool> {
        &self.instance_pool
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Returns `true` if modules of `type_id` are macros.
    pub fn is_macro_type(&self, type_id: Id) -> bool {
        self.macros_toolbox.contains(&type_id)
    }

    /// The macro definition behind a module of `type_id`.
    pub fn macro_model(&self, type_id: Id) -> Option<&Rc<MacroModel>> {
        self.macros.iter().find(|model| model.uid() == type_id)
    }

    pub fn toolbox(&self, uid: Id) -> Option<&Toolbox> {
        self.toolboxes.iter().find(|toolbox| toolbox.uid == uid)
    }

    /// Resolves a tracked workflow id: [`MAIN_WORKFLOW_ID`] or a macro uid.
    pub fn workflow(&self, workflow_id: Id) -> Option<Rc<WorkflowModel>> {
        if workflow_id == MAIN_WORKFLOW_ID {
            return Some(Rc::clone(&self.main));
        }
        self.macro_model(workflow_id)
            .map(|model| Rc::clone(model.workflow()))
    }
}
