//! Component graph integration tests: ordering, cycle rejection and edits
//! that must leave the graph unchanged on failure.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p fossil-rig --test graph_tests
//! ```

use proptest::prelude::*;
use proptest::sample::Index;

use fossil_rig::{Component, ComponentGraph, ComponentKind, RigError, SpaceRef};

fn snapshot(graph: &ComponentGraph) -> Vec<Component> {
    graph.iter().cloned().collect()
}

fn position(order: &[&Component], name: &str) -> usize {
    order
        .iter()
        .position(|c| c.name() == name)
        .unwrap_or_else(|| panic!("{} missing from order", name))
}

// ============================================================================
// 1. Topological order
// ============================================================================

/// Random acyclic graphs: component `i` may only depend on components with a
/// lower index. Components are stored in a shuffled order so dependencies
/// point forward as well as backward in the list.
fn acyclic_graph() -> impl Strategy<Value = Vec<Component>> {
    (1usize..10)
        .prop_flat_map(|n| {
            (
                prop::collection::vec(prop::option::of(any::<Index>()), n),
                prop::collection::vec(prop::option::of(any::<Index>()), n),
                Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
            )
        })
        .prop_map(|(parents, uprights, order)| {
            let space = |i: usize, choice: &Option<Index>| match choice {
                Some(index) if i > 0 => SpaceRef::component(format!("c{}", index.index(i))),
                _ => SpaceRef::World,
            };
            order
                .into_iter()
                .map(|i| {
                    Component::new(format!("c{}", i), ComponentKind::Basic)
                        .with_parent_space(space(i, &parents[i]))
                        .with_upright_space(space(i, &uprights[i]))
                })
                .collect()
        })
}

proptest! {
    /// Every component comes after its parent and upright spaces.
    #[test]
    fn topological_order_respects_spaces(components in acyclic_graph()) {
        let graph = ComponentGraph::from_components(components.clone()).unwrap();
        let order = graph.topological_order().unwrap();
        prop_assert_eq!(order.len(), components.len());
        for component in &order {
            let index = position(&order, component.name());
            for space in [&component.base.parent_space, &component.base.upright_space] {
                if let Some(dependency) = space.name() {
                    prop_assert!(
                        position(&order, dependency) < index,
                        "'{}' ordered before its space '{}'", component.name(), dependency
                    );
                }
            }
        }
    }

    /// Without space references the order is the insertion order.
    #[test]
    fn independent_components_keep_insertion_order(count in 1usize..12) {
        let mut graph = ComponentGraph::new();
        for i in (0..count).rev() {
            graph.add(Component::new(format!("c{}", i), ComponentKind::Fk)).unwrap();
        }
        let order: Vec<&str> = graph
            .topological_order()
            .unwrap()
            .into_iter()
            .map(Component::name)
            .collect();
        prop_assert_eq!(order, graph.names());
    }
}

// ============================================================================
// 2. Failed edits leave the graph unchanged
// ============================================================================

#[test]
fn test_cycle_rejected_without_change() {
    let mut graph = ComponentGraph::new();
    graph.add(Component::new("root", ComponentKind::Basic)).unwrap();
    graph
        .add(Component::new("spine", ComponentKind::Fk).with_parent_space(SpaceRef::component("root")))
        .unwrap();
    graph
        .add(Component::new("head", ComponentKind::Fk).with_upright_space(SpaceRef::component("spine")))
        .unwrap();
    let before = snapshot(&graph);

    let err = graph
        .set_parent_space("root", SpaceRef::component("head"))
        .unwrap_err();
    assert!(matches!(err, RigError::Cycle { .. }), "got {:?}", err);
    assert_eq!(snapshot(&graph), before);

    let err = graph
        .set_space_candidates("root", vec!["spine".to_string()])
        .unwrap_err();
    assert!(matches!(err, RigError::Cycle { .. }), "got {:?}", err);
    assert_eq!(snapshot(&graph), before);

    let err = graph
        .set_parent_space("spine", SpaceRef::component("spine"))
        .unwrap_err();
    assert!(matches!(err, RigError::Cycle { .. }), "got {:?}", err);
    assert_eq!(snapshot(&graph), before);
}

#[test]
fn test_duplicate_name_and_unknown_space_rejected() {
    let mut graph = ComponentGraph::new();
    graph.add(Component::new("root", ComponentKind::Basic)).unwrap();
    let before = snapshot(&graph);

    assert!(matches!(
        graph.add(Component::new("root", ComponentKind::Fk)),
        Err(RigError::Validation(_))
    ));
    assert!(matches!(
        graph.add(Component::new("arm", ComponentKind::Fk).with_parent_space(SpaceRef::component("ghost"))),
        Err(RigError::Reference(_))
    ));
    assert_eq!(snapshot(&graph), before);
}

// ============================================================================
// 3. Remove a referenced component
// ============================================================================

#[test]
fn test_remove_referenced_then_reparent() {
    let mut graph = ComponentGraph::new();
    graph.add(Component::new("root", ComponentKind::Basic)).unwrap();
    graph
        .add(Component::new("arm", ComponentKind::Fk).with_parent_space(SpaceRef::component("root")))
        .unwrap();
    let before = snapshot(&graph);

    let err = graph.remove("root").unwrap_err();
    assert!(matches!(err, RigError::Reference(_)), "got {:?}", err);
    assert_eq!(snapshot(&graph), before);

    graph.set_parent_space("arm", SpaceRef::World).unwrap();
    let removed = graph.remove("root").unwrap();
    assert_eq!(removed.name(), "root");
    assert_eq!(graph.names(), vec!["arm"]);
}

#[test]
fn test_candidate_only_reference_does_not_block_removal() {
    let mut graph = ComponentGraph::new();
    graph.add(Component::new("root", ComponentKind::Basic)).unwrap();
    graph
        .add(
            Component::new("arm", ComponentKind::Fk)
                .with_space_switch(true)
                .with_space_candidates(["root"]),
        )
        .unwrap();
    graph.remove("root").unwrap();
    assert_eq!(graph.get("arm").unwrap().base.space_candidates, vec!["root"]);
}
