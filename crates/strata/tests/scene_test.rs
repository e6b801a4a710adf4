//! Expand, collapse and rebuild of layers driven through the scene loop.

use std::rc::Rc;

use float_cmp::approx_eq;

use strata::{
    StrataError,
    config::AppConfig,
    identifier::Id,
    model::{ConnectionModel, Extremity, Layer, MacroModel, ModuleModel, Project, SlotRef, WorkflowModel},
    observable::Observable,
    runtime::{ConnectionsHint, HintEntry, InstancePool, ModuleInstance, PoolStream, SlotKind},
    scene::{LayerKey, LayerState, Scene},
    structure::LayerKind,
};

const STEP: f32 = 0.1;

fn ids(uids: &[&str]) -> Vec<Id> {
    uids.iter().map(|uid| Id::new(uid)).collect()
}

fn connection(uid: &str, from: &str, to: &str) -> ConnectionModel {
    ConnectionModel::new(uid, SlotRef::at(from, 0), SlotRef::at(to, 0))
}

/// Ticks until no animation is left.
fn settle(scene: &mut Scene) {
    for _ in 0..200 {
        scene.tick(STEP).expect("tick succeeds");
        if scene.animations().next().is_none() {
            return;
        }
    }
    panic!("animations never settled");
}

fn load(project: Project) -> (Scene, LayerKey) {
    let project = Rc::new(project);
    let mut scene = Scene::new(&AppConfig::default()).expect("default config is valid");
    let root = scene
        .load(
            Rc::clone(&project),
            Rc::clone(project.main()),
            Rc::clone(project.instance_pool()),
        )
        .expect("root layer loads");
    (scene, root)
}

/// Root holds `x`, `y` and group `g` = {`p`, `q`}: `x -> p -> q -> y`.
fn grouped_project() -> Project {
    let modules = ["x", "y", "p", "q"]
        .iter()
        .map(|uid| ModuleModel::new(*uid, "map", "rxjs"))
        .collect();
    let connections = vec![
        connection("x_p", "x", "p"),
        connection("p_q", "p", "q"),
        connection("q_y", "q", "y"),
    ];
    let root = Layer::new("root", ids(&["x", "y"])).with_child(Layer::new("g", ids(&["p", "q"])));
    Project::new(
        WorkflowModel::new("main", modules, connections, root),
        InstancePool::new("main"),
    )
}

fn inner_pool(parent: &str, workers: &[&str]) -> InstancePool {
    let pool = workers.iter().fold(InstancePool::new(parent), |pool, uid| {
        pool.with_module(
            ModuleInstance::new(*uid, "map", "rxjs")
                .with_input("input$")
                .with_output("output$"),
        )
    });
    let first = workers.first().copied().unwrap_or("w");
    pool.with_connections_hint(ConnectionsHint::V1(vec![
        HintEntry::new(SlotKind::Input, 0, SlotRef::at(first, 0)),
        HintEntry::new(SlotKind::Output, 0, SlotRef::at(first, 0)),
    ]))
}

/// `src -> n -> sink`, `n` running a dynamic pool. With `grouped`, `n` sits
/// in group `g` of the root layer.
fn nested_project(grouped: bool) -> (Project, PoolStream) {
    let modules = vec![
        ModuleModel::new("src", "of", "rxjs"),
        ModuleModel::new("n", "switchMap", "rxjs"),
        ModuleModel::new("sink", "console", "debug"),
    ];
    let connections = vec![connection("src_n", "src", "n"), connection("n_sink", "n", "sink")];
    let root = if grouped {
        Layer::new("root", ids(&["src", "sink"])).with_child(Layer::new("g", ids(&["n"])))
    } else {
        Layer::new("root", ids(&["src", "n", "sink"]))
    };
    let stream: PoolStream = Observable::with_value(Rc::new(inner_pool("n", &["w"])));
    let pool = InstancePool::new("main").with_module(
        ModuleInstance::new("n", "switchMap", "rxjs")
            .with_input("input$")
            .with_output("output$")
            .with_instance_pool(stream.clone()),
    );
    let project = Project::new(WorkflowModel::new("main", modules, connections, root), pool).with_running(true);
    (project, stream)
}

fn front_is(scene: &Scene, layer: LayerKey) -> bool {
    scene.front() == Some(layer)
        && scene
            .layer(layer)
            .is_some_and(|content| content.is_front().value() == Some(true))
}

#[test]
fn test_group_expand_and_collapse_round_trip() {
    let (mut scene, root) = load(grouped_project());
    let group = Id::new("g");
    let (color, opacity) = {
        let proxy = scene.layer(root).and_then(|content| content.entity(group)).expect("group drawn");
        (proxy.color(), proxy.opacity())
    };

    let child = scene.expand(root, group).expect("groups always expand");
    let content = scene.layer(root).expect("root is open");
    assert_eq!(content.state(), LayerState::ExpandingChild);
    assert_eq!(scene.front(), Some(root));
    let dimmed = content.entity(group).expect("group drawn");
    assert!(approx_eq!(f32, dimmed.opacity(), scene.style().dim_opacity));
    assert_ne!(dimmed.color(), color);
    assert!(
        content
            .connections()
            .iter()
            .filter(|proxy| proxy.touches(group))
            .all(|proxy| approx_eq!(f32, proxy.opacity(), scene.style().dim_opacity))
    );
    assert!(scene.is_busy(root));

    settle(&mut scene);
    assert!(front_is(&scene, child));
    assert_eq!(scene.layer(root).map(|content| content.state()), Some(LayerState::Live));
    assert!(approx_eq!(f32, scene.layer(child).expect("child is open").scale(), 1.0));

    let boundaries = scene
        .layer(root)
        .and_then(|content| content.boundaries().get(&(group, group)))
        .expect("group boundaries registered");
    let uids: Vec<Id> = boundaries.iter().map(|proxy| proxy.uid()).collect();
    assert_eq!(uids, ids(&["x_p", "q_y"]));
    assert_eq!(boundaries[0].layer(Extremity::Start), root);
    assert_eq!(boundaries[0].layer(Extremity::End), child);
    assert_eq!(boundaries[1].layer(Extremity::Start), child);
    assert!(boundaries.iter().all(|proxy| scene.boundary_endpoints(proxy).is_some()));

    scene.collapse(child).expect("leaf layer collapses");
    assert!(front_is(&scene, root));
    assert_eq!(scene.layer(child).map(|content| content.state()), Some(LayerState::Collapsing));
    assert!(scene.layer(root).is_some_and(|content| content.boundaries().is_empty()));

    settle(&mut scene);
    assert!(scene.layer(child).is_none());
    let content = scene.layer(root).expect("root is open");
    assert_eq!(content.expanded().count(), 0);
    let restored = content.entity(group).expect("group drawn");
    assert_eq!(restored.color(), color);
    assert!(approx_eq!(f32, restored.opacity(), opacity));
    assert!(content.connections().iter().all(|proxy| approx_eq!(f32, proxy.opacity(), 1.0)));
}

#[test]
fn test_expand_rejects_bad_requests() {
    let (mut scene, root) = load(grouped_project());

    assert!(matches!(
        scene.expand(root, Id::new("x")),
        Err(StrataError::InvalidState(_))
    ));
    assert!(matches!(
        scene.expand(root, Id::new("missing")),
        Err(StrataError::UnknownEntity(_))
    ));
    assert!(matches!(scene.collapse(root), Err(StrataError::InvalidState(_))));

    let child = scene.expand(root, Id::new("g")).expect("groups always expand");
    assert!(matches!(
        scene.expand(root, Id::new("g")),
        Err(StrataError::InvalidState(_))
    ));
    settle(&mut scene);
    assert!(matches!(
        scene.expand(root, Id::new("g")),
        Err(StrataError::InvalidState(_))
    ));
    assert!(matches!(
        scene.expand(child, Id::new("p")),
        Err(StrataError::InvalidState(_))
    ));
}

#[test]
fn test_nested_boundary_resolves_through_group() {
    let (project, _stream) = nested_project(true);
    let (mut scene, root) = load(project);

    let group = scene.expand(root, Id::new("g")).expect("groups always expand");
    settle(&mut scene);
    let nested = scene.expand(group, Id::new("n")).expect("running nested module expands");
    settle(&mut scene);

    assert!(front_is(&scene, nested));
    assert_eq!(scene.ancestors(nested), vec![group, root]);
    assert_eq!(scene.descendants(root), vec![nested, group]);
    assert_eq!(
        scene.layer(nested).map(|content| content.kind().clone()),
        Some(LayerKind::Nested { uid: Id::new("n") })
    );

    let boundaries = scene
        .layer(group)
        .and_then(|content| content.boundaries().get(&(Id::new("n"), Id::new("layer_n"))))
        .expect("nested boundaries registered");
    assert_eq!(boundaries.len(), 2);
    assert_eq!(boundaries[0].uid(), "n>>w");
    assert_eq!(boundaries[0].connection().model().start(), SlotRef::at("src", 0));
    assert_eq!(boundaries[0].layer(Extremity::Start), root);
    assert_eq!(boundaries[0].layer(Extremity::End), nested);
    assert_eq!(boundaries[1].uid(), "w>>n");
    assert_eq!(boundaries[1].layer(Extremity::End), root);

    // The group boundaries touching `n` are dimmed while it is expanded.
    let dim = scene.style().dim_opacity;
    let group_boundaries = scene
        .layer(root)
        .and_then(|content| content.boundaries().get(&(Id::new("g"), Id::new("g"))))
        .expect("group boundaries registered");
    assert!(group_boundaries.iter().all(|proxy| approx_eq!(f32, proxy.opacity(), dim)));

    assert!(matches!(scene.collapse(group), Err(StrataError::InvalidState(_))));
    scene.collapse(nested).expect("leaf layer collapses");
    assert!(front_is(&scene, group));
    settle(&mut scene);

    let group_boundaries = scene
        .layer(root)
        .and_then(|content| content.boundaries().get(&(Id::new("g"), Id::new("g"))))
        .expect("group boundaries kept");
    assert!(group_boundaries.iter().all(|proxy| approx_eq!(f32, proxy.opacity(), 1.0)));
}

#[test]
fn test_macro_boundaries_join_declared_slots() {
    let macro_workflow = WorkflowModel::new(
        "my_macro",
        vec![ModuleModel::new("inner", "map", "rxjs")],
        Vec::new(),
        Layer::new("macro_root", ids(&["inner"])),
    );
    let catalog_entry = MacroModel::new(macro_workflow, vec![SlotRef::at("inner", 0)], vec![SlotRef::at("inner", 0)]);
    let modules = vec![
        ModuleModel::new("src", "of", "rxjs"),
        ModuleModel::new("m", "my_macro", "macros"),
        ModuleModel::new("sink", "console", "debug"),
    ];
    let connections = vec![connection("src_m", "src", "m"), connection("m_sink", "m", "sink")];
    let workflow = WorkflowModel::new("main", modules, connections, Layer::new("root", ids(&["src", "m", "sink"])));
    let stream: PoolStream = Observable::with_value(Rc::new(
        InstancePool::new("m").with_module(
            ModuleInstance::new("inner", "map", "rxjs")
                .with_input("input$")
                .with_output("output$"),
        ),
    ));
    let pool = InstancePool::new("main").with_module(ModuleInstance::new("m", "my_macro", "macros").with_instance_pool(stream));
    let project = Project::new(workflow, pool)
        .with_macro(catalog_entry)
        .with_running(true);
    let (mut scene, root) = load(project);

    let child = scene.expand(root, Id::new("m")).expect("running macro expands");
    settle(&mut scene);

    let content = scene.layer(child).expect("macro layer is open");
    assert_eq!(content.uid(), "macro_root");
    assert!(matches!(content.kind(), LayerKind::Macro { .. }));

    let boundaries = scene
        .layer(root)
        .and_then(|content| content.boundaries().get(&(Id::new("m"), Id::new("macro_root"))))
        .expect("macro boundaries registered");
    let uids: Vec<Id> = boundaries.iter().map(|proxy| proxy.uid()).collect();
    assert_eq!(uids, ids(&["src_m", "m_sink"]));
    assert_eq!(boundaries[0].connection().model().end(), SlotRef::at("inner", 0));
    assert_eq!(boundaries[1].connection().model().start(), SlotRef::at("inner", 0));
    assert!(boundaries.iter().all(|proxy| scene.boundary_endpoints(proxy).is_some()));
}

#[test]
fn test_stopped_project_does_not_expand_nested_modules() {
    let (project, _stream) = nested_project(false);
    let (mut scene, root) = load(project.with_running(false));
    assert!(matches!(
        scene.expand(root, Id::new("n")),
        Err(StrataError::InvalidState(_))
    ));
}

#[test]
fn test_nested_layer_rebuilds_on_new_pool() {
    let (project, stream) = nested_project(false);
    let (mut scene, root) = load(project);
    let child = scene.expand(root, Id::new("n")).expect("running nested module expands");
    settle(&mut scene);
    assert_eq!(scene.layer(child).map(|content| content.entities().count()), Some(1));

    stream.next(Rc::new(inner_pool("n", &["w", "w2"])));
    scene.tick(STEP).expect("tick succeeds");

    let content = scene.layer(child).expect("layer kept through rebuild");
    assert_eq!(content.state(), LayerState::Live);
    assert_eq!(content.entities().count(), 2);
    assert!(front_is(&scene, child));
    assert!(
        scene
            .layer(root)
            .is_some_and(|content| content.boundaries().contains(&(Id::new("n"), Id::new("layer_n"))))
    );
}

#[test]
fn test_pool_emitted_while_expanding_is_applied_afterwards() {
    let (project, stream) = nested_project(false);
    let (mut scene, root) = load(project);
    let child = scene.expand(root, Id::new("n")).expect("running nested module expands");

    stream.next(Rc::new(inner_pool("n", &["w", "w2", "w3"])));
    scene.tick(STEP).expect("tick succeeds");
    assert_eq!(scene.layer(child).map(|content| content.entities().count()), Some(1));

    settle(&mut scene);
    assert_eq!(scene.layer(child).map(|content| content.entities().count()), Some(3));
    assert!(front_is(&scene, child));
}

#[test]
fn test_nested_layer_collapses_when_pool_empties() {
    let (project, stream) = nested_project(false);
    let (mut scene, root) = load(project);
    let child = scene.expand(root, Id::new("n")).expect("running nested module expands");
    settle(&mut scene);

    stream.next(Rc::new(InstancePool::new("n")));
    scene.tick(STEP).expect("tick succeeds");
    assert!(front_is(&scene, root));
    assert_eq!(scene.layer(child).map(|content| content.state()), Some(LayerState::Collapsing));

    settle(&mut scene);
    assert!(scene.layer(child).is_none());
    let content = scene.layer(root).expect("root is open");
    assert_eq!(content.expanded().count(), 0);
    assert!(content.boundaries().is_empty());
}

/// `src -> n -> sink`, where `n` runs pool {`w`} and `w` runs pool {`v`}.
/// Returns the project and the stream of `n`.
fn doubly_nested_project() -> (Project, PoolStream) {
    let (project, _) = nested_project(false);
    let inner: PoolStream = Observable::with_value(Rc::new(inner_pool("w", &["v"])));
    let outer = InstancePool::new("n")
        .with_module(
            ModuleInstance::new("w", "switchMap", "rxjs")
                .with_input("input$")
                .with_output("output$")
                .with_instance_pool(inner),
        )
        .with_connections_hint(ConnectionsHint::V1(vec![
            HintEntry::new(SlotKind::Input, 0, SlotRef::at("w", 0)),
            HintEntry::new(SlotKind::Output, 0, SlotRef::at("w", 0)),
        ]));
    let stream: PoolStream = Observable::with_value(Rc::new(outer));
    let pool = InstancePool::new("main").with_module(
        ModuleInstance::new("n", "switchMap", "rxjs")
            .with_input("input$")
            .with_output("output$")
            .with_instance_pool(stream.clone()),
    );
    let project = Project::new(project.main().as_ref().clone(), pool).with_running(true);
    (project, stream)
}

fn boundary_uids(scene: &Scene, layer: LayerKey, key: (&str, &str)) -> Vec<Id> {
    scene
        .layer(layer)
        .and_then(|content| content.boundaries().get(&(Id::new(key.0), Id::new(key.1))))
        .map(|proxies| proxies.iter().map(|proxy| proxy.uid()).collect())
        .unwrap_or_default()
}

#[test]
fn test_rebuild_collapses_open_descendants_first() {
    let (project, stream) = doubly_nested_project();
    let (mut scene, root) = load(project);
    let outer = scene.expand(root, Id::new("n")).expect("running nested module expands");
    settle(&mut scene);
    let inner = scene.expand(outer, Id::new("w")).expect("nested module of a nested layer expands");
    settle(&mut scene);

    assert!(front_is(&scene, inner));
    assert_eq!(scene.descendants(root), vec![inner, outer]);
    assert_eq!(boundary_uids(&scene, root, ("n", "layer_n")), ids(&["n>>w", "w>>n"]));
    assert_eq!(boundary_uids(&scene, outer, ("w", "layer_w")), ids(&["w>>v", "v>>w"]));

    stream.next(Rc::new(inner_pool("n", &["x"])));
    scene.tick(STEP).expect("tick succeeds");

    // The open descendant goes first; `outer` keeps its content meanwhile.
    assert_eq!(scene.layer(inner).map(|content| content.state()), Some(LayerState::Collapsing));
    let content = scene.layer(outer).expect("outer layer kept");
    assert_eq!(content.entities().map(|proxy| proxy.uid()).collect::<Vec<_>>(), ids(&["w"]));
    assert!(front_is(&scene, outer));
    assert!(scene.is_busy(outer));

    settle(&mut scene);

    assert!(scene.layer(inner).is_none());
    let content = scene.layer(outer).expect("outer layer rebuilt in place");
    assert_eq!(content.state(), LayerState::Live);
    assert_eq!(content.entities().map(|proxy| proxy.uid()).collect::<Vec<_>>(), ids(&["x"]));
    assert_eq!(content.expanded().count(), 0);
    assert!(content.boundaries().is_empty());
    assert!(front_is(&scene, outer));
    assert_eq!(scene.descendants(root), vec![outer]);
    assert_eq!(boundary_uids(&scene, root, ("n", "layer_n")), ids(&["n>>x", "x>>n"]));
    assert!(
        scene
            .layer(root)
            .and_then(|content| content.boundaries().get(&(Id::new("n"), Id::new("layer_n"))))
            .is_some_and(|proxies| proxies.iter().all(|proxy| scene.boundary_endpoints(proxy).is_some()))
    );
}

#[test]
fn test_clear_drops_every_layer() {
    let (mut scene, root) = load(grouped_project());
    scene.expand(root, Id::new("g")).expect("groups always expand");
    scene.clear();
    assert!(scene.root().is_none());
    assert!(scene.front().is_none());
    assert_eq!(scene.layers().count(), 0);
    assert!(scene.animations().next().is_none());
    scene.tick(STEP).expect("an empty scene ticks");
}
