//! The scene host.
//!
//! [`Environment`] tracks a project source, drives the [`Scene`] from the
//! render loop and translates pointer input into scene operations. Anything
//! shown outside the 3D view (module views, journals, documentation, worker
//! details) goes through the [`StateCapability`] supplied by the application.

use std::{
    fmt,
    rc::Rc,
    sync::mpsc::{self, Receiver, Sender},
};

use log::{debug, info, warn};

use strata_core::{
    identifier::Id,
    model::{MAIN_WORKFLOW_ID, MacroModel, Project},
    observable::{Notification, Observable, Subscription},
    runtime::{ConnectionInstance, InstancePool, ModuleInstance, WorkerRef},
};

use crate::{
    StrataError,
    config::AppConfig,
    geometry::Bounds3,
    scene::{Command, EntityAction, LayerKey, Scene},
    structure::{Entity, Selectable, Selection},
};

/// Side panels and selection handling of the host application.
pub trait StateCapability {
    fn select(&self, selection: &[Selection]);

    fn display_module_view(&self, instance: &Rc<ModuleInstance>);

    fn display_module_journal(&self, instance: &Rc<ModuleInstance>);

    fn display_module_documentation(&self, instance: &Rc<ModuleInstance>);

    fn display_worker_environment(&self, worker: &WorkerRef);
}

/// A [`StateCapability`] ignoring every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopState;

impl StateCapability for NoopState {
    fn select(&self, _selection: &[Selection]) {}

    fn display_module_view(&self, _instance: &Rc<ModuleInstance>) {}

    fn display_module_journal(&self, _instance: &Rc<ModuleInstance>) {}

    fn display_module_documentation(&self, _instance: &Rc<ModuleInstance>) {}

    fn display_worker_environment(&self, _worker: &WorkerRef) {}
}

/// Builds the instance pool backing a macro tracked as the root workflow.
pub trait MacroDeployer {
    fn deploy(&self, model: &MacroModel) -> Result<InstancePool, StrataError>;
}

/// Deploys one idle instance per module and connection of the macro.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDeployer;

impl MacroDeployer for StaticDeployer {
    fn deploy(&self, model: &MacroModel) -> Result<InstancePool, StrataError> {
        let workflow = model.workflow();
        let pool = workflow
            .modules()
            .iter()
            .fold(InstancePool::new(model.uid()), |pool, module| {
                pool.with_module(ModuleInstance::from_model(module))
            });
        Ok(workflow.connections().iter().fold(pool, |pool, connection| {
            pool.with_connection(ConnectionInstance::from_model(connection))
        }))
    }
}

/// Project snapshots to follow, and the workflow to show from each.
#[derive(Debug, Clone)]
pub struct ProjectSource {
    projects: Observable<Rc<Project>>,
    workflow_id: Id,
}

impl ProjectSource {
    /// `workflow_id` is [`MAIN_WORKFLOW_ID`] or the uid of a macro.
    pub fn new(projects: Observable<Rc<Project>>, workflow_id: impl Into<Id>) -> Self {
        Self {
            projects,
            workflow_id: workflow_id.into(),
        }
    }

    /// Follows the main workflow.
    pub fn main(projects: Observable<Rc<Project>>) -> Self {
        Self::new(projects, MAIN_WORKFLOW_ID)
    }

    pub fn workflow_id(&self) -> Id {
        self.workflow_id
    }
}

/// Something under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PickTarget {
    Entity { layer: LayerKey, uid: Id },
    Background(LayerKey),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
}

/// The followed source; dropping it unsubscribes from the project stream.
struct Tracked {
    workflow_id: Id,
    subscription: Option<Subscription>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

pub struct Environment {
    scene: Scene,
    config: AppConfig,
    state: Rc<dyn StateCapability>,
    deployer: Box<dyn MacroDeployer>,
    tracked: Option<Tracked>,
    project_sender: Sender<Rc<Project>>,
    project_receiver: Receiver<Rc<Project>>,
    hovered: Option<PickTarget>,
    selection: Vec<Selection>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("scene", &self.scene)
            .field("workflow_id", &self.tracked.as_ref().map(|tracked| tracked.workflow_id))
            .field("hovered", &self.hovered)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// # Errors
    /// Returns `StrataError::Config` if `config` is invalid.
    pub fn new(config: AppConfig, state: Rc<dyn StateCapability>) -> Result<Self, StrataError> {
        config.validate()?;
        let scene = Scene::new(&config)?;
        let (project_sender, project_receiver) = mpsc::channel();
        Ok(Self {
            scene,
            config,
            state,
            deployer: Box::new(StaticDeployer),
            tracked: None,
            project_sender,
            project_receiver,
            hovered: None,
            selection: Vec::new(),
        })
    }

    pub fn with_deployer(mut self, deployer: impl MacroDeployer + 'static) -> Self {
        self.deployer = Box::new(deployer);
        self
    }

    /// Follows `source`, replacing the previously tracked one. Snapshots are
    /// loaded on the next [`tick`](Self::tick).
    pub fn track(&mut self, source: ProjectSource) {
        if let Some(previous) = self.tracked.take() {
            debug!(workflow = previous.workflow_id.to_string(); "Releasing tracked project");
        }
        while self.project_receiver.try_recv().is_ok() {}
        let sender = self.project_sender.clone();
        let subscription = source.projects.subscribe(move |notification| {
            if let Notification::Next(project) = notification {
                if sender.send(Rc::clone(project)).is_err() {
                    debug!("Project channel closed");
                }
            }
        });
        info!(workflow = source.workflow_id.to_string(); "Tracking project");
        self.tracked = Some(Tracked {
            workflow_id: source.workflow_id,
            subscription: Some(subscription),
        });
    }

    /// One frame: loads the latest project snapshot, if any, then advances
    /// the scene by the configured frame step.
    ///
    /// # Errors
    /// Propagates project loading and scene command errors.
    pub fn tick(&mut self) -> Result<(), StrataError> {
        let mut latest = None;
        while let Ok(project) = self.project_receiver.try_recv() {
            latest = Some(project);
        }
        if let Some(project) = latest {
            self.load(project)?;
        }
        self.scene.tick(self.config.animation().frame_step())
    }

    fn load(&mut self, project: Rc<Project>) -> Result<(), StrataError> {
        let Some(workflow_id) = self.tracked.as_ref().map(|tracked| tracked.workflow_id) else {
            return Ok(());
        };
        let Some(workflow) = project.workflow(workflow_id) else {
            warn!(workflow = workflow_id.to_string(); "Tracked workflow not in project");
            return Ok(());
        };
        let instance_pool = if workflow_id == MAIN_WORKFLOW_ID {
            Rc::clone(project.instance_pool())
        } else {
            let model = project
                .macro_model(workflow_id)
                .ok_or_else(|| StrataError::UnknownLayer(workflow_id.to_string()))?;
            Rc::new(self.deployer.deploy(model)?)
        };
        self.hovered = None;
        self.set_selection(Vec::new());
        self.scene.load(project, workflow, instance_pool)?;
        Ok(())
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn front_layer(&self) -> Option<LayerKey> {
        self.scene.front()
    }

    pub fn hovered(&self) -> Option<PickTarget> {
        self.hovered
    }

    pub fn selection(&self) -> &[Selection] {
        &self.selection
    }

    pub fn pointer_move(&mut self, target: Option<PickTarget>) {
        self.hovered = target;
    }

    /// Handles a click on `target`.
    ///
    /// - shift-click collapses the front layer, unless it is the root;
    /// - a click on nothing clears the selection;
    /// - ctrl-click on a layer background focuses the layer;
    /// - a click on a layer background toggles its transparency;
    /// - a click on an entity selects it.
    ///
    /// # Errors
    /// Propagates collapse, focus and lookup errors.
    pub fn click(&mut self, target: Option<PickTarget>, modifiers: Modifiers) -> Result<(), StrataError> {
        if modifiers.shift {
            if let Some(front) = self.scene.front().filter(|front| Some(*front) != self.scene.root()) {
                self.scene.collapse(front)?;
                self.set_selection(Vec::new());
                return Ok(());
            }
        }
        match target {
            None => self.set_selection(Vec::new()),
            Some(PickTarget::Background(layer)) if modifiers.ctrl => self.scene.focus(layer)?,
            Some(PickTarget::Background(layer)) => self.scene.toggle_transparent(layer)?,
            Some(PickTarget::Entity { layer, uid }) => {
                let selection = self.entity(layer, uid)?.selection();
                self.set_selection(vec![selection]);
            }
        }
        Ok(())
    }

    /// What the pointer may pick: the front layer's entities, then the
    /// backgrounds of the front layer and of every open ancestor.
    pub fn selectables(&self) -> Vec<PickTarget> {
        let Some(front) = self.scene.front() else {
            return Vec::new();
        };
        let entities = self
            .scene
            .layer(front)
            .into_iter()
            .flat_map(|content| content.entities())
            .map(|proxy| PickTarget::Entity {
                layer: front,
                uid: proxy.uid(),
            });
        let backgrounds = std::iter::once(front)
            .chain(self.scene.ancestors(front))
            .filter(|key| {
                self.scene
                    .layer(*key)
                    .is_some_and(|content| content.background().is_some())
            })
            .map(PickTarget::Background);
        entities.chain(backgrounds).collect()
    }

    /// Action row of entity `uid` of `layer`.
    ///
    /// # Errors
    /// `StrataError::UnknownLayer` or `StrataError::UnknownEntity`.
    pub fn actions(&self, layer: LayerKey, uid: Id) -> Result<Vec<EntityAction>, StrataError> {
        let content = self
            .scene
            .layer(layer)
            .ok_or_else(|| StrataError::UnknownLayer(layer.to_string()))?;
        content.actions(uid, self.scene.is_running())
    }

    /// Runs `action` from the action row of `uid`. Expansion is queued for
    /// the next tick.
    ///
    /// # Errors
    /// Lookup errors, or `StrataError::InvalidState` if the action is not
    /// currently offered.
    pub fn trigger_action(&mut self, layer: LayerKey, uid: Id, action: EntityAction) -> Result<(), StrataError> {
        if !self.actions(layer, uid)?.contains(&action) {
            return Err(StrataError::invalid_state(format!(
                "action {action:?} is not offered for `{uid}`"
            )));
        }
        if action == EntityAction::Expand {
            self.scene.queue(Command::Expand { layer, entity: uid });
            return Ok(());
        }
        let instance = self
            .entity(layer, uid)?
            .instance()
            .cloned()
            .ok_or(StrataError::UnknownEntity(uid))?;
        match action {
            EntityAction::View => self.state.display_module_view(&instance),
            EntityAction::Journal => self.state.display_module_journal(&instance),
            EntityAction::Documentation => self.state.display_module_documentation(&instance),
            EntityAction::InspectWorker => {
                if let Some(worker) = instance.worker() {
                    self.state.display_worker_environment(worker);
                }
            }
            EntityAction::Expand => {}
        }
        Ok(())
    }

    /// # Errors
    /// Returns `StrataError::UnknownLayer` if the layer is not open.
    pub fn focus(&mut self, layer: LayerKey) -> Result<(), StrataError> {
        self.scene.focus(layer)
    }

    /// Box of the whole scene, for camera framing.
    pub fn scene_bounds(&self) -> Option<Bounds3> {
        self.scene.bounds()
    }

    fn entity(&self, layer: LayerKey, uid: Id) -> Result<&Entity, StrataError> {
        let content = self
            .scene
            .layer(layer)
            .ok_or_else(|| StrataError::UnknownLayer(layer.to_string()))?;
        content
            .entity(uid)
            .map(|proxy| proxy.entity())
            .ok_or(StrataError::UnknownEntity(uid))
    }

    fn set_selection(&mut self, selection: Vec<Selection>) {
        self.state.select(&selection);
        self.selection = selection;
    }
}
