//! Property tests for layer organization and group boundaries.

use std::{collections::HashSet, rc::Rc};

use proptest::{prelude::*, test_runner::TestCaseError};

use strata::{
    identifier::Id,
    layout::{EngineBuilder, LayoutEngine, compute_coordinates},
    model::{ConnectionModel, Layer, ModuleModel, Project, SlotRef, WorkflowModel},
    runtime::{InstancePool, SlotKind},
    structure::{HasSlots, LayerKind, LayerOrganizer, OrganizerParams},
};

/// Modules `m<i>`, each either in the root layer or in group `g`, and
/// forward connections between them.
#[derive(Debug, Clone)]
struct Fixture {
    in_group: Vec<bool>,
    edges: Vec<(usize, usize)>,
}

impl Fixture {
    fn uid(i: usize) -> Id {
        Id::new(&format!("m{i}"))
    }

    fn project(&self) -> Rc<Project> {
        let modules = (0..self.in_group.len())
            .map(|i| ModuleModel::new(Self::uid(i), "map", "rxjs"))
            .collect();
        let connections = self
            .edges
            .iter()
            .enumerate()
            .map(|(k, (from, to))| {
                ConnectionModel::new(
                    Id::new(&format!("c{k}")),
                    SlotRef::at(Self::uid(*from), 0),
                    SlotRef::at(Self::uid(*to), 0),
                )
            })
            .collect();
        let members = |grouped: bool| {
            self.in_group
                .iter()
                .enumerate()
                .filter(move |(_, in_group)| **in_group == grouped)
                .map(|(i, _)| Self::uid(i))
                .collect::<Vec<_>>()
        };
        let root = Layer::new("root", members(false)).with_child(Layer::new("g", members(true)));
        Rc::new(Project::new(
            WorkflowModel::new("main", modules, connections, root),
            InstancePool::new("main"),
        ))
    }

    fn count(&self, from_group: bool, to_group: bool) -> usize {
        self.edges
            .iter()
            .filter(|(from, to)| self.in_group[*from] == from_group && self.in_group[*to] == to_group)
            .count()
    }
}

fn fixture_strategy() -> impl Strategy<Value = Fixture> {
    (2usize..9).prop_flat_map(|n| {
        let pairs: Vec<(usize, usize)> = (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j))).collect();
        let count = pairs.len();
        (
            prop::collection::vec(any::<bool>(), n),
            prop::collection::vec(any::<bool>(), count),
        )
            .prop_map(move |(in_group, keep)| Fixture {
                in_group,
                edges: pairs
                    .iter()
                    .zip(keep)
                    .filter(|(_, keep)| *keep)
                    .map(|(pair, _)| *pair)
                    .collect(),
            })
    })
}

fn root_organizer(project: Rc<Project>) -> Result<LayerOrganizer, TestCaseError> {
    LayerOrganizer::new(OrganizerParams {
        workflow: Rc::clone(project.main()),
        instance_pool: Rc::clone(project.instance_pool()),
        layer_id: Id::new("root"),
        parent: None,
        kind: LayerKind::Root,
        project,
    })
    .map_err(|err| TestCaseError::fail(err.to_string()))
}

fn check_group_slot_counts(fixture: &Fixture) -> Result<(), TestCaseError> {
    let organizer = root_organizer(fixture.project())?;
    let equivalents = organizer
        .equivalent_group_connections(Id::new("g"))
        .map_err(|err| TestCaseError::fail(err.to_string()))?;

    prop_assert_eq!(equivalents.downstream.len(), fixture.count(true, false));
    prop_assert_eq!(equivalents.upstream.len(), fixture.count(false, true));

    let group = organizer
        .entity(Id::new("g"))
        .ok_or_else(|| TestCaseError::fail("group is not an entity"))?;
    prop_assert_eq!(group.slots(SlotKind::Output).len(), equivalents.downstream.len());
    prop_assert_eq!(group.slots(SlotKind::Input).len(), equivalents.upstream.len());
    Ok(())
}

fn check_synthetic_slots_are_unique(fixture: &Fixture) -> Result<(), TestCaseError> {
    let organizer = root_organizer(fixture.project())?;
    let equivalents = organizer
        .equivalent_group_connections(Id::new("g"))
        .map_err(|err| TestCaseError::fail(err.to_string()))?;

    let starts: HashSet<SlotRef> = equivalents.downstream.iter().map(|c| c.model().start()).collect();
    let ends: HashSet<SlotRef> = equivalents.upstream.iter().map(|c| c.model().end()).collect();
    prop_assert_eq!(starts.len(), equivalents.downstream.len());
    prop_assert_eq!(ends.len(), equivalents.upstream.len());
    for (i, connection) in equivalents.downstream.iter().enumerate() {
        prop_assert_eq!(connection.model().start(), SlotRef::named("g", &format!("output_{i}")));
    }
    Ok(())
}

fn check_root_layer_lays_out(fixture: &Fixture) -> Result<(), TestCaseError> {
    let organizer = root_organizer(fixture.project())?;
    let nodes = organizer.dag_data();
    let mut engines = EngineBuilder::new();
    let coordinates = compute_coordinates(engines.engine(LayoutEngine::Layered), &nodes, 0.0)
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
    prop_assert_eq!(coordinates.len(), organizer.entities().len());
    Ok(())
}

proptest! {
    #[test]
    fn group_slot_counts(fixture in fixture_strategy()) {
        check_group_slot_counts(&fixture)?;
    }

    #[test]
    fn synthetic_slots_are_unique(fixture in fixture_strategy()) {
        check_synthetic_slots_are_unique(&fixture)?;
    }

    #[test]
    fn root_layer_lays_out(fixture in fixture_strategy()) {
        check_root_layer_lays_out(&fixture)?;
    }
}
