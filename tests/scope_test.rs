//! Tests for ScopeResolver

use std::collections::BTreeSet;

use rstest::rstest;

use wastetree::domain::{
    CascadeSoftDeleter, DeletedPolicy, DomainError, Label, PointDirectory, ProjectScopeEntry,
    ScopeRejection, ScopeResolver, TreeBuilder, TreeIndex,
};
use wastetree::util::testing::{fixed_time, init_test_setup, kitchen_points, point, registration};

fn kitchen_tree() -> TreeIndex {
    TreeBuilder::new().build(1, kitchen_points(1)).unwrap()
}

fn entry(point: u64, include_children: bool) -> ProjectScopeEntry {
    ProjectScopeEntry::new(7, point, include_children)
}

fn ids(values: &[u64]) -> BTreeSet<u64> {
    values.iter().copied().collect()
}

#[test]
fn given_area_with_children_when_resolving_then_leaves_below_area() {
    // Arrange
    init_test_setup();
    let index = kitchen_tree();

    // Act
    let scope = ScopeResolver::default().effective_members(&[entry(1, true)], &index, None);

    // Assert
    assert_eq!(scope.members, ids(&[3, 4]));
    assert!(!scope.is_degraded());
}

#[test]
fn given_scope_when_filtering_registrations_then_only_members_are_admitted() {
    let index = kitchen_tree();
    let scope = ScopeResolver::default().effective_members(&[entry(1, true)], &index, None);

    assert!(scope.admits(&registration(1, 3, 1, 2.0, 10.0)));
    assert!(!scope.admits(&registration(2, 5, 1, 2.0, 10.0)));
    assert!(
        !scope.admits(&registration(3, 3, 2, 2.0, 10.0)),
        "registration of another customer"
    );
}

#[rstest]
#[case::single_point_without_children(vec![entry(5, false)], &[5])]
#[case::internal_point_without_children(vec![entry(2, false)], &[2])]
#[case::union_of_entries(vec![entry(2, true), entry(10, true)], &[3, 4, 5])]
#[case::overlapping_entries_deduplicated(vec![entry(1, true), entry(2, true), entry(3, false)], &[3, 4])]
#[case::leaf_with_children_flag(vec![entry(4, true)], &[4])]
#[case::empty_scope_means_all_leaves(vec![], &[3, 4, 5])]
fn given_entries_when_resolving_then_expected_members(
    #[case] entries: Vec<ProjectScopeEntry>,
    #[case] expected: &[u64],
) {
    let index = kitchen_tree();

    let scope = ScopeResolver::default().effective_members(&entries, &index, None);

    assert_eq!(scope.members, ids(expected));
}

#[test]
fn given_unknown_point_entry_when_resolving_then_entry_skipped_and_rest_resolved() {
    // Arrange
    let index = kitchen_tree();
    let entries = vec![entry(404, true), entry(10, true)];

    // Act
    let scope = ScopeResolver::default().effective_members(&entries, &index, None);

    // Assert
    assert_eq!(scope.members, ids(&[5]));
    assert_eq!(
        scope.rejected,
        vec![DomainError::InvalidScopeEntry {
            project: 7,
            point: 404,
            reason: ScopeRejection::UnknownPoint
        }]
    );
    assert!(scope.is_degraded());
}

#[test]
fn given_point_of_other_customer_when_resolving_then_rejected_as_foreign() {
    let index = kitchen_tree();
    let foreign = point(50, None, &[], 2, Label::Area);
    let mut records = kitchen_points(1);
    records.push(foreign);
    let directory = PointDirectory::from_records(&records);

    let scope = ScopeResolver::default().effective_members(&[entry(50, true)], &index, Some(&directory));

    assert!(scope.members.is_empty());
    assert_eq!(
        scope.rejected,
        vec![DomainError::InvalidScopeEntry {
            project: 7,
            point: 50,
            reason: ScopeRejection::ForeignTenant { owner: 2 }
        }]
    );
}

#[rstest]
#[case(DeletedPolicy::Exclude, &[3])]
#[case(DeletedPolicy::Include, &[3, 4])]
fn given_soft_deleted_leaf_when_resolving_then_policy_decides(
    #[case] policy: DeletedPolicy,
    #[case] expected: &[u64],
) {
    let mut index = kitchen_tree();
    CascadeSoftDeleter::new().delete(&mut index, 4, fixed_time(1)).unwrap();

    let scope = ScopeResolver::new(policy).effective_members(&[entry(2, true)], &index, None);

    assert_eq!(scope.members, ids(expected));
}

#[test]
fn given_inactive_leaf_when_resolving_children_then_excluded() {
    let mut index = kitchen_tree();
    index.set_active(3, false).unwrap();

    let scope = ScopeResolver::default().effective_members(&[entry(1, true)], &index, None);

    assert_eq!(scope.members, ids(&[4]));
}

#[rstest]
#[case(true)]
#[case(false)]
fn given_inactive_leaf_named_directly_when_resolving_then_kept_in_both_modes(
    #[case] include_children: bool,
) {
    let mut index = kitchen_tree();
    index.set_active(4, false).unwrap();

    let scope =
        ScopeResolver::default().effective_members(&[entry(4, include_children)], &index, None);

    assert_eq!(scope.members, ids(&[4]));
}

#[test]
fn given_stale_stored_path_when_resolving_children_then_parent_links_decide() {
    // Arrange: 3 hangs below 2 by parent link, its stored path skips 2
    let mut records = kitchen_points(1);
    records[2] = point(3, Some(2), &[1], 1, Label::Product);
    let index = TreeBuilder::new().build(1, records).unwrap();

    // Act
    let scope = ScopeResolver::default().effective_members(&[entry(2, true)], &index, None);

    // Assert
    assert_eq!(scope.members, ids(&[3, 4]));
}
