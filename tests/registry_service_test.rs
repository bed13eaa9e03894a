//! Tests for RegistryService: tenant isolation, copy-on-write mutations and rollup caching

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rstest::rstest;

use wastetree::application::services::{RegistryService, RollupStatus};
use wastetree::application::{ApplicationError, ApplicationResult};
use wastetree::config::Settings;
use wastetree::domain::{
    CustomerId, DomainError, Label, Metrics, ProjectId, ProjectScopeEntry, Registration,
    RegistrationPoint,
};
use wastetree::infrastructure::traits::{InMemoryStore, PointStore};
use wastetree::util::testing::{fixed_time, init_test_setup, kitchen_points, point};

/// Customer 1 is healthy, customer 2 has a broken stored path, customer 3 has a missing parent.
fn mixed_points() -> Vec<RegistrationPoint> {
    let mut points = kitchen_points(1);
    points.push(point(200, None, &[], 2, Label::Area));
    points.push(point(201, Some(200), &[200, 99], 2, Label::Product).with_cost(10.0));
    points.push(point(300, Some(333), &[333], 3, Label::Product));
    points
}

fn registry_with(points: Vec<RegistrationPoint>) -> (Arc<InMemoryStore>, RegistryService) {
    init_test_setup();
    let store = Arc::new(InMemoryStore::with_points(points));
    let registry = RegistryService::new(
        Arc::clone(&store) as Arc<dyn PointStore>,
        Arc::new(Settings::default()),
    );
    registry.load_all().unwrap();
    (store, registry)
}

// ============================================================
// loading
// ============================================================

#[test]
fn given_mixed_customers_when_loading_then_failed_customer_is_isolated() {
    let store = Arc::new(InMemoryStore::with_points(mixed_points()));
    let registry = RegistryService::new(store, Arc::new(Settings::default()));

    let report = registry.load_all().unwrap();

    assert_eq!(report.loaded, vec![1, 2]);
    assert!(matches!(
        report.failed.get(&3),
        Some(DomainError::MissingParent { .. })
    ));
    assert!(registry.tree(1).is_ok());
    assert!(matches!(
        registry.tree(3),
        Err(ApplicationError::TenantUnhealthy { customer: 3, .. })
    ));
    assert!(matches!(registry.tree(9), Err(ApplicationError::TenantNotFound(9))));
}

#[test]
fn given_point_id_when_looking_up_owner_then_directory_answers() {
    let (_, registry) = registry_with(mixed_points());

    assert_eq!(registry.customer_of(201).unwrap(), 2);
    assert!(registry.customer_of(404).is_err());
}

#[test]
fn given_point_when_resolving_full_path_then_breadcrumbs() {
    let (_, registry) = registry_with(kitchen_points(1));

    let crumbs = registry.full_path(1, 4).unwrap();

    let ids: Vec<_> = crumbs.iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![1, 2, 4]);
}

// ============================================================
// rollups
// ============================================================

#[test]
fn given_broken_path_in_one_customer_when_rolling_up_all_then_others_succeed() {
    // Arrange
    let (_, registry) = registry_with(mixed_points());

    // Act
    let results = registry.rollup_all().unwrap();

    // Assert: customer 3 never built, so it is not rolled up at all
    assert_eq!(results.len(), 2);
    assert_eq!(results[&1].as_ref().unwrap().get(1).unwrap().cost, Some(150.0));
    assert!(matches!(
        results[&2],
        Err(DomainError::BrokenPath { point: 201, missing: 99 })
    ));
    let view = registry.aggregates(2).unwrap();
    assert!(view.stale);
    assert!(view.result.is_none());
}

#[test]
fn given_fresh_rollup_when_rolling_up_again_then_cached_result_is_returned() {
    let (_, registry) = registry_with(kitchen_points(1));

    let first = registry.rollup(1).unwrap();
    let second = registry.rollup(1).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!registry.aggregates(1).unwrap().stale);
}

#[test]
fn given_metrics_update_when_aggregates_requested_then_stale_until_recomputed() {
    // Arrange
    let (_, registry) = registry_with(kitchen_points(1));
    registry.rollup(1).unwrap();

    // Act
    registry
        .update_metrics(
            1,
            4,
            Metrics {
                cost: Some(400.0),
                ..Metrics::default()
            },
        )
        .unwrap();

    // Assert
    let view = registry.aggregates(1).unwrap();
    assert!(view.stale);
    assert_eq!(view.result.unwrap().get(2).unwrap().cost, Some(150.0));
    assert_eq!(registry.rollup(1).unwrap().get(2).unwrap().cost, Some(250.0));
    assert!(!registry.aggregates(1).unwrap().stale);
}

#[test]
fn given_soft_delete_when_checking_rollup_then_still_fresh() {
    let (_, registry) = registry_with(kitchen_points(1));
    registry.rollup(1).unwrap();

    registry.soft_delete(1, 2, fixed_time(1)).unwrap();

    assert!(!registry.aggregates(1).unwrap().stale);
}

#[test]
fn given_rollup_when_persisting_then_internal_points_are_stored() {
    let (store, registry) = registry_with(kitchen_points(1));

    let written = registry.persist_rollup(1).unwrap();

    assert_eq!(written, 3);
    let stored = store.snapshot().unwrap();
    let category = stored.points.iter().find(|p| p.id == 2).unwrap();
    assert_eq!(category.metrics.cost, Some(150.0));
    assert!(!registry.aggregates(1).unwrap().stale);
}

// ============================================================
// mutations
// ============================================================

#[test]
fn given_reparent_when_published_then_store_and_snapshot_agree() {
    // Arrange
    let (store, registry) = registry_with(kitchen_points(1));
    let before = registry.tree(1).unwrap();

    // Act
    let rewritten = registry.reparent(1, 2, Some(10)).unwrap();

    // Assert
    assert_eq!(rewritten, vec![2, 3, 4]);
    assert_eq!(before.get(3).unwrap().path, vec![1, 2], "old snapshot untouched");
    let after = registry.tree(1).unwrap();
    assert_eq!(after.get(3).unwrap().path, vec![10, 2]);
    let stored = store.snapshot().unwrap();
    let product = stored.points.iter().find(|p| p.id == 3).unwrap();
    assert_eq!(product.path, vec![10, 2]);
}

#[test]
fn given_failing_store_when_mutating_then_nothing_is_published() {
    // Arrange
    let (store, registry) = registry_with(kitchen_points(1));
    store.set_fail_writes(true);

    // Act
    let result = registry.soft_delete(1, 2, fixed_time(1));

    // Assert
    assert!(matches!(result, Err(ApplicationError::Store { .. })));
    assert!(!registry.tree(1).unwrap().get(2).unwrap().is_deleted());
}

#[test]
fn given_cycle_when_reparenting_then_rejected_and_store_unchanged() {
    let (store, registry) = registry_with(kitchen_points(1));
    let before = store.snapshot().unwrap();

    let result = registry.reparent(1, 1, Some(3));

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::Cycle(1)))
    ));
    assert_eq!(store.snapshot().unwrap(), before);
}

#[test]
fn given_new_customer_when_inserting_first_point_then_customer_is_created() {
    let (_, registry) = registry_with(kitchen_points(1));

    registry
        .insert_point(point(500, None, &[], 5, Label::Area))
        .unwrap();
    registry
        .insert_point(point(501, Some(500), &[], 5, Label::Product))
        .unwrap();

    assert_eq!(registry.customers().unwrap(), vec![1, 5]);
    assert_eq!(registry.tree(5).unwrap().get(501).unwrap().path, vec![500]);
    assert_eq!(registry.customer_of(501).unwrap(), 5);
}

#[rstest]
#[case::missing_parent(false)]
#[case::failing_store(true)]
fn given_failed_first_insert_when_checking_health_then_customer_does_not_exist(
    #[case] fail_writes: bool,
) {
    // Arrange
    let (store, registry) = registry_with(kitchen_points(1));
    store.set_fail_writes(fail_writes);
    let parent = if fail_writes { None } else { Some(999) };

    // Act
    let result = registry.insert_point(point(500, parent, &[], 5, Label::Area));

    // Assert
    assert!(result.is_err());
    assert_eq!(registry.customers().unwrap(), vec![1]);
    assert_eq!(registry.health().unwrap().len(), 1);
    assert!(matches!(registry.tree(5), Err(ApplicationError::TenantNotFound(5))));
    assert!(registry.customer_of(500).is_err());
}

#[test]
fn given_id_owned_by_other_customer_when_inserting_then_duplicate() {
    let (_, registry) = registry_with(kitchen_points(1));

    let result = registry.insert_point(point(3, None, &[], 5, Label::Area));

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::DuplicatePoint(3)))
    ));
}

#[test]
fn given_restore_after_cascade_when_reading_snapshot_then_descendants_stay_deleted() {
    let (_, registry) = registry_with(kitchen_points(1));
    registry.soft_delete(1, 2, fixed_time(1)).unwrap();

    registry.restore(1, 2).unwrap();

    let tree = registry.tree(1).unwrap();
    assert!(!tree.get(2).unwrap().is_deleted());
    assert!(tree.get(3).unwrap().is_deleted());
}

// ============================================================
// health
// ============================================================

#[test]
fn given_mixed_customers_when_checking_health_then_reports_each() {
    // Arrange
    let (_, registry) = registry_with(mixed_points());
    registry.rollup_all().unwrap();

    // Act
    let health = registry.health().unwrap();

    // Assert
    assert_eq!(health.len(), 3);
    assert!(health[0].is_healthy());
    assert_eq!(health[0].rollup, RollupStatus::Fresh);
    assert_eq!(health[1].drift, 1);
    assert!(matches!(health[1].rollup, RollupStatus::Failed(_)));
    assert!(!health[1].is_healthy());
    assert!(health[2].error.is_some());
    assert_eq!(health[2].points, 0);
}

// ============================================================
// concurrency
// ============================================================

/// Holds writes of one customer until released.
struct GatedStore {
    inner: InMemoryStore,
    gated: CustomerId,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl PointStore for GatedStore {
    fn all_points(&self) -> ApplicationResult<Vec<RegistrationPoint>> {
        self.inner.all_points()
    }

    fn registrations(&self, customer: CustomerId) -> ApplicationResult<Vec<Registration>> {
        self.inner.registrations(customer)
    }

    fn scope_entries(&self, project: ProjectId) -> ApplicationResult<Vec<ProjectScopeEntry>> {
        self.inner.scope_entries(project)
    }

    fn replace_points(
        &self,
        customer: CustomerId,
        records: &[RegistrationPoint],
    ) -> ApplicationResult<()> {
        if customer == self.gated {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        self.inner.replace_points(customer, records)
    }
}

#[test]
fn given_write_in_flight_for_one_customer_when_using_other_customer_then_not_blocked() {
    // Arrange
    init_test_setup();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let mut points = kitchen_points(1);
    points.push(point(200, None, &[], 2, Label::Area));
    points.push(point(201, Some(200), &[200], 2, Label::Product).with_cost(10.0));
    let store = Arc::new(GatedStore {
        inner: InMemoryStore::with_points(points),
        gated: 1,
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    let registry = Arc::new(RegistryService::new(store, Arc::new(Settings::default())));
    registry.load_all().unwrap();

    let writer = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || registry.soft_delete(1, 2, fixed_time(1)))
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // Act: customer 1 is stuck in its store write
    let (done_tx, done_rx) = mpsc::channel();
    {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            let points = registry.tree(2).map(|t| t.len()).ok();
            let cost = registry
                .rollup(2)
                .ok()
                .and_then(|r| r.get(200).and_then(|m| m.cost));
            let health = registry.health().map(|h| h.len()).ok();
            let _ = done_tx.send((points, cost, health));
        });
    }
    let other = done_rx.recv_timeout(Duration::from_secs(5));
    release_tx.send(()).unwrap();

    // Assert
    let (points, cost, health) = other.expect("customer 2 waited for the write of customer 1");
    assert_eq!(points, Some(2));
    assert_eq!(cost, Some(10.0));
    assert_eq!(health, Some(2));
    let outcome = writer.join().unwrap().unwrap();
    assert_eq!(outcome.affected, vec![2, 3, 4]);
}
