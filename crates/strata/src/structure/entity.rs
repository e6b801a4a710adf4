//! Entities shown inside a layer.
//!
//! An [`Entity`] is a tagged variant over the four kinds of objects a layer
//! lays out. What the scene can do with an entity is expressed by the
//! capability traits [`HasSlots`], [`Selectable`] and [`ExpandableGrouper`].

use std::rc::Rc;

use indexmap::IndexSet;

use strata_core::{
    identifier::Id,
    model::{Layer, MacroModel, ModuleModel, SlotId, WorkflowModel},
    runtime::{InstancePool, ModuleInstance, PoolStream, SlotKind},
};

/// Kind of an [`Entity`], also the kind of layer it opens when expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Module,
    Group,
    Macro,
    Nested,
}

/// Declared slots of an entity, in declaration order.
pub trait HasSlots {
    fn slots(&self, kind: SlotKind) -> &[SlotId];

    /// Position of `slot` among the slots of `kind`, whether it is addressed
    /// by name or by index.
    fn slot_index(&self, kind: SlotKind, slot: SlotId) -> Option<usize> {
        let slots = self.slots(kind);
        match slot {
            SlotId::Index(index) if index < slots.len() => Some(index),
            SlotId::Index(_) => None,
            SlotId::Name(_) => slots.iter().position(|candidate| *candidate == slot),
        }
    }
}

/// What the state capability receives when an entity is selected.
#[derive(Debug, Clone)]
pub struct Selection {
    pub uid: Id,
    pub instance: Option<Rc<ModuleInstance>>,
}

pub trait Selectable {
    fn selection(&self) -> Selection;
}

/// Entities that open a child layer.
pub trait ExpandableGrouper {
    /// Kind of child layer this entity opens, if any.
    fn expand_kind(&self) -> Option<EntityKind>;

    /// Returns `true` if the expand action should be offered.
    ///
    /// Groups always expand. Macros and nested modules only expand while the
    /// project runs and their instance pool holds at least one module.
    fn can_expand(&self, running: bool) -> bool;
}

/// A plain module.
#[derive(Debug, Clone)]
pub struct ModuleEntity {
    model: ModuleModel,
    instance: Option<Rc<ModuleInstance>>,
    inputs: Vec<SlotId>,
    outputs: Vec<SlotId>,
}

impl ModuleEntity {
    /// Slots come from the instance when it declares any. Otherwise they are
    /// the distinct slots the workflow's connections refer to.
    pub fn new(model: ModuleModel, instance: Option<Rc<ModuleInstance>>, workflow: &WorkflowModel) -> Self {
        let (inputs, outputs) = match instance.as_deref().map(instance_slots) {
            Some((inputs, outputs)) if !inputs.is_empty() || !outputs.is_empty() => (inputs, outputs),
            _ => referenced_slots(model.uid(), workflow),
        };
        Self {
            model,
            instance,
            inputs,
            outputs,
        }
    }

    pub fn model(&self) -> &ModuleModel {
        &self.model
    }

    pub fn instance(&self) -> Option<&Rc<ModuleInstance>> {
        self.instance.as_ref()
    }
}

/// A child layer of the workflow, drawn as a single box.
#[derive(Debug, Clone)]
pub struct GroupEntity {
    layer: Layer,
    workflow: Rc<WorkflowModel>,
    inputs: Vec<SlotId>,
    outputs: Vec<SlotId>,
}

impl GroupEntity {
    /// `inputs` and `outputs` count the equivalent connections entering and
    /// leaving the group; slots are named `input_<i>` and `output_<i>`.
    pub fn new(layer: Layer, workflow: Rc<WorkflowModel>, inputs: usize, outputs: usize) -> Self {
        Self {
            layer,
            workflow,
            inputs: synthetic_slots("input", inputs),
            outputs: synthetic_slots("output", outputs),
        }
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    pub fn workflow(&self) -> &Rc<WorkflowModel> {
        &self.workflow
    }
}

/// A module whose type is a macro of the project's catalog.
#[derive(Debug, Clone)]
pub struct MacroEntity {
    module: ModuleModel,
    model: Rc<MacroModel>,
    instance: Option<Rc<ModuleInstance>>,
    inputs: Vec<SlotId>,
    outputs: Vec<SlotId>,
}

impl MacroEntity {
    pub fn new(module: ModuleModel, model: Rc<MacroModel>, instance: Option<Rc<ModuleInstance>>) -> Self {
        let inputs = (0..model.inputs().len()).map(SlotId::Index).collect();
        let outputs = (0..model.outputs().len()).map(SlotId::Index).collect();
        Self {
            module,
            model,
            instance,
            inputs,
            outputs,
        }
    }

    pub fn module(&self) -> &ModuleModel {
        &self.module
    }

    pub fn model(&self) -> &Rc<MacroModel> {
        &self.model
    }

    pub fn instance(&self) -> Option<&Rc<ModuleInstance>> {
        self.instance.as_ref()
    }
}

/// A deployed module owning its own, changing, instance pool.
#[derive(Debug, Clone)]
pub struct NestedModuleEntity {
    model: ModuleModel,
    instance: Rc<ModuleInstance>,
    pool: PoolStream,
    inputs: Vec<SlotId>,
    outputs: Vec<SlotId>,
}

impl NestedModuleEntity {
    pub fn new(model: ModuleModel, instance: Rc<ModuleInstance>, pool: PoolStream) -> Self {
        let (inputs, outputs) = instance_slots(&instance);
        Self {
            model,
            instance,
            pool,
            inputs,
            outputs,
        }
    }

    pub fn model(&self) -> &ModuleModel {
        &self.model
    }

    pub fn instance(&self) -> &Rc<ModuleInstance> {
        &self.instance
    }

    pub fn pool(&self) -> &PoolStream {
        &self.pool
    }
}

#[derive(Debug, Clone)]
pub enum Entity {
    Module(ModuleEntity),
    Group(GroupEntity),
    Macro(MacroEntity),
    Nested(NestedModuleEntity),
}

impl Entity {
    pub fn uid(&self) -> Id {
        match self {
            Entity::Module(module) => module.model.uid(),
            Entity::Group(group) => group.layer.uid(),
            Entity::Macro(macro_entity) => macro_entity.module.uid(),
            Entity::Nested(nested) => nested.model.uid(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Module(_) => EntityKind::Module,
            Entity::Group(_) => EntityKind::Group,
            Entity::Macro(_) => EntityKind::Macro,
            Entity::Nested(_) => EntityKind::Nested,
        }
    }

    /// Runtime instance, absent for groups and undeployed modules.
    pub fn instance(&self) -> Option<&Rc<ModuleInstance>> {
        match self {
            Entity::Module(module) => module.instance.as_ref(),
            Entity::Group(_) => None,
            Entity::Macro(macro_entity) => macro_entity.instance.as_ref(),
            Entity::Nested(nested) => Some(&nested.instance),
        }
    }

    /// The instance pool stream a macro or nested module expands into.
    pub fn pool_stream(&self) -> Option<&PoolStream> {
        match self {
            Entity::Macro(macro_entity) => macro_entity
                .instance
                .as_ref()
                .and_then(|instance| instance.instance_pool()),
            Entity::Nested(nested) => Some(&nested.pool),
            Entity::Module(_) | Entity::Group(_) => None,
        }
    }

    /// Current value of [`pool_stream`](Self::pool_stream).
    pub fn current_pool(&self) -> Option<Rc<InstancePool>> {
        self.pool_stream().and_then(|stream| stream.value())
    }
}

impl HasSlots for Entity {
    fn slots(&self, kind: SlotKind) -> &[SlotId] {
        let (inputs, outputs) = match self {
            Entity::Module(module) => (&module.inputs, &module.outputs),
            Entity::Group(group) => (&group.inputs, &group.outputs),
            Entity::Macro(macro_entity) => (&macro_entity.inputs, &macro_entity.outputs),
            Entity::Nested(nested) => (&nested.inputs, &nested.outputs),
        };
        match kind {
            SlotKind::Input => inputs,
            SlotKind::Output => outputs,
        }
    }
}

impl Selectable for Entity {
    fn selection(&self) -> Selection {
        Selection {
            uid: self.uid(),
            instance: self.instance().cloned(),
        }
    }
}

impl ExpandableGrouper for Entity {
    fn expand_kind(&self) -> Option<EntityKind> {
        match self.kind() {
            EntityKind::Module => None,
            kind => Some(kind),
        }
    }

    fn can_expand(&self, running: bool) -> bool {
        match self {
            Entity::Group(_) => true,
            Entity::Macro(_) | Entity::Nested(_) => {
                running && self.current_pool().is_some_and(|pool| !pool.is_empty())
            }
            Entity::Module(_) => false,
        }
    }
}

fn instance_slots(instance: &ModuleInstance) -> (Vec<SlotId>, Vec<SlotId>) {
    let ids = |kind: SlotKind| -> Vec<SlotId> {
        instance
            .slots(kind)
            .iter()
            .map(|slot| SlotId::Name(slot.slot_id()))
            .collect()
    };
    (ids(SlotKind::Input), ids(SlotKind::Output))
}

fn referenced_slots(uid: Id, workflow: &WorkflowModel) -> (Vec<SlotId>, Vec<SlotId>) {
    let mut inputs = IndexSet::new();
    let mut outputs = IndexSet::new();
    for connection in workflow.connections() {
        if connection.end().module_id() == uid {
            inputs.insert(connection.end().slot_id());
        }
        if connection.start().module_id() == uid {
            outputs.insert(connection.start().slot_id());
        }
    }
    (inputs.into_iter().collect(), outputs.into_iter().collect())
}

fn synthetic_slots(prefix: &str, count: usize) -> Vec<SlotId> {
    (0..count)
        .map(|i| SlotId::Name(Id::new(&format!("{prefix}_{i}"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use strata_core::{
        model::{ConnectionModel, SlotRef},
        observable::Observable,
        runtime::InstancePool,
    };

    use super::*;

    fn workflow() -> WorkflowModel {
        WorkflowModel::new(
            "main",
            vec![ModuleModel::new("a", "map", "rxjs"), ModuleModel::new("b", "filter", "rxjs")],
            vec![
                ConnectionModel::new("c0", SlotRef::named("a", "output$"), SlotRef::named("b", "input$")),
                ConnectionModel::new("c1", SlotRef::named("a", "output$"), SlotRef::at("b", 1)),
            ],
            Layer::new("root", [Id::new("a"), Id::new("b")]),
        )
    }

    #[test]
    fn test_undeployed_module_slots_come_from_connections() {
        let workflow = workflow();
        let entity = Entity::Module(ModuleEntity::new(
            ModuleModel::new("b", "filter", "rxjs"),
            None,
            &workflow,
        ));
        assert_eq!(
            entity.slots(SlotKind::Input),
            &[SlotId::from("input$"), SlotId::Index(1)]
        );
        assert!(entity.slots(SlotKind::Output).is_empty());
        assert_eq!(entity.slot_index(SlotKind::Input, SlotId::from("input$")), Some(0));
    }

    #[test]
    fn test_deployed_module_slots_by_name_and_index() {
        let instance = ModuleInstance::new("a", "map", "rxjs")
            .with_input("input$")
            .with_output("output$")
            .with_output("error$");
        let entity = Entity::Module(ModuleEntity::new(
            ModuleModel::new("a", "map", "rxjs"),
            Some(Rc::new(instance)),
            &workflow(),
        ));
        assert_eq!(entity.slot_index(SlotKind::Output, SlotId::from("error$")), Some(1));
        assert_eq!(entity.slot_index(SlotKind::Output, SlotId::Index(1)), Some(1));
        assert_eq!(entity.slot_index(SlotKind::Output, SlotId::Index(2)), None);
        assert!(entity.selection().instance.is_some());
        assert_eq!(entity.expand_kind(), None);
    }

    #[test]
    fn test_group_synthetic_slots() {
        let group = Entity::Group(GroupEntity::new(
            Layer::new("grp", [Id::new("a")]),
            Rc::new(workflow()),
            1,
            2,
        ));
        assert_eq!(group.uid(), "grp");
        assert_eq!(group.slot_index(SlotKind::Output, SlotId::from("output_1")), Some(1));
        assert!(group.can_expand(false));
        assert!(group.selection().instance.is_none());
    }

    #[test]
    fn test_nested_expands_only_with_modules_while_running() {
        let pool: PoolStream = Observable::with_value(Rc::new(InstancePool::new("n")));
        let instance = Rc::new(ModuleInstance::new("n", "switchMap", "rxjs").with_instance_pool(pool.clone()));
        let entity = Entity::Nested(NestedModuleEntity::new(
            ModuleModel::new("n", "switchMap", "rxjs"),
            instance,
            pool.clone(),
        ));
        assert!(!entity.can_expand(true));

        pool.next(Rc::new(
            InstancePool::new("n").with_module(ModuleInstance::new("w", "map", "rxjs")),
        ));
        assert!(entity.can_expand(true));
        assert!(!entity.can_expand(false));
        assert_eq!(entity.expand_kind(), Some(EntityKind::Nested));
    }
}
