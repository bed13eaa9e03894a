//! Tests for AncestorResolver and the broken-path isolation between customers

use wastetree::domain::{
    AggregationEngine, AncestorResolver, DomainError, Label, TreeBuilder, TreeIndex,
};
use wastetree::util::testing::{init_test_setup, kitchen_points, point};

fn kitchen_tree() -> TreeIndex {
    TreeBuilder::new().build(1, kitchen_points(1)).unwrap()
}

#[test]
fn given_leaf_when_resolving_full_path_then_root_first_inclusive() {
    let index = kitchen_tree();

    let chain: Vec<_> = AncestorResolver::new(&index)
        .full_path(3)
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();

    assert_eq!(chain, vec![1, 2, 3]);
}

#[test]
fn given_root_when_resolving_full_path_then_only_itself() {
    let index = kitchen_tree();

    let chain = AncestorResolver::new(&index).full_path(10).unwrap();

    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].id, 10);
}

#[test]
fn given_point_when_building_breadcrumbs_then_names_and_labels_in_order() {
    let index = kitchen_tree();

    let crumbs = AncestorResolver::new(&index).breadcrumbs(4).unwrap();

    let labels: Vec<_> = crumbs.iter().map(|b| b.label).collect();
    assert_eq!(labels, vec![Label::Area, Label::Category, Label::Product]);
    assert_eq!(crumbs[2].name, "product 4");
}

#[test]
fn given_unknown_point_when_resolving_full_path_then_not_found() {
    let index = kitchen_tree();

    let result = AncestorResolver::new(&index).full_path(404);

    assert_eq!(result.unwrap_err(), DomainError::PointNotFound(404));
}

#[test]
fn given_path_with_nonexistent_ancestor_when_resolving_then_broken_path() {
    // Arrange: stored path references 99, which does not exist
    init_test_setup();
    let mut records = kitchen_points(1);
    records[2] = point(3, Some(2), &[1, 99], 1, Label::Product).with_cost(100.0);
    let index = TreeBuilder::new().build(1, records).unwrap();

    // Act
    let result = AncestorResolver::new(&index).full_path(3);

    // Assert: no truncated chain
    assert_eq!(
        result.unwrap_err(),
        DomainError::BrokenPath {
            point: 3,
            missing: 99
        }
    );
}

#[test]
fn given_stale_path_with_existing_ancestors_when_resolving_then_path_mismatch() {
    // Arrange: every stored id exists, but 2 is missing from 3's path
    init_test_setup();
    let mut records = kitchen_points(1);
    records[2] = point(3, Some(2), &[1], 1, Label::Product).with_cost(100.0);
    let index = TreeBuilder::new().build(1, records).unwrap();
    assert_eq!(index.drift().len(), 1);

    // Act
    let result = AncestorResolver::new(&index).full_path(3);

    // Assert
    assert_eq!(
        result.unwrap_err(),
        DomainError::PathMismatch {
            point: 3,
            stored: vec![1],
            derived: vec![1, 2]
        }
    );
    assert!(matches!(
        AggregationEngine::new().rollup(&index),
        Err(DomainError::PathMismatch { point: 3, .. })
    ));
}

#[test]
fn given_broken_path_in_one_customer_when_rolling_up_all_then_only_that_customer_fails() {
    // Arrange
    let mut records = kitchen_points(1);
    records[2] = point(3, Some(2), &[1, 99], 1, Label::Product).with_cost(100.0);
    records.extend(kitchen_points(2).into_iter().map(|mut p| {
        p.id += 100;
        p.parent_id = p.parent_id.map(|id| id + 100);
        p.path = p.path.iter().map(|id| id + 100).collect();
        p
    }));
    let build = TreeBuilder::new().build_all(records);
    let engine = AggregationEngine::new();

    // Act
    let broken = engine.rollup(build.tenants[&1].as_ref().unwrap());
    let healthy = engine.rollup(build.tenants[&2].as_ref().unwrap());

    // Assert
    assert!(matches!(
        broken,
        Err(DomainError::BrokenPath { point: 3, missing: 99 })
    ));
    let healthy = healthy.unwrap();
    assert_eq!(healthy.get(102).unwrap().cost, Some(150.0));
}
