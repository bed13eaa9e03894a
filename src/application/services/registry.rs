//! Tenant registry service
//!
//! Holds one immutable tree snapshot per customer. Mutations are applied to a copy,
//! persisted as one whole-tenant write and only then swapped in, so readers see either
//! the old or the new tree. Rollups are cached per customer and recomputed when dirty.
//!
//! Every customer has its own locks. Writers of one customer are serialized by its
//! writer mutex, which is held across the store write; the state lock is only taken to
//! read or publish a snapshot. The map lock is only held to look a customer up.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::application::{ApplicationError, ApplicationResult};
use crate::config::Settings;
use crate::domain::{
    AggregationEngine, AncestorResolver, Breadcrumb, CascadeOutcome, CascadeSoftDeleter,
    CustomerId, DomainError, DomainResult, Metrics, PointDirectory, PointId, RegistrationPoint,
    RollupResult, Timestamp, TreeBuilder, TreeIndex,
};
use crate::infrastructure::traits::PointStore;

/// Per-customer state.
#[derive(Debug, Default)]
struct TenantState {
    tree: Option<Arc<TreeIndex>>,
    build_error: Option<DomainError>,
    /// Bumped on every mutation.
    version: u64,
    /// Bumped on mutations that change leaf metrics or parentage.
    metrics_version: u64,
    rollup: Option<Arc<RollupResult>>,
    rollup_version: Option<u64>,
    rollup_error: Option<DomainError>,
}

impl TenantState {
    fn tree(&self, customer: CustomerId) -> ApplicationResult<Arc<TreeIndex>> {
        match (&self.tree, &self.build_error) {
            (Some(tree), None) => Ok(Arc::clone(tree)),
            (_, Some(e)) => Err(ApplicationError::TenantUnhealthy {
                customer,
                reason: e.to_string(),
            }),
            (None, None) => Err(ApplicationError::TenantNotFound(customer)),
        }
    }

    fn rollup_dirty(&self) -> bool {
        self.rollup_version != Some(self.metrics_version)
    }
}

/// Outcome of loading all customers from the store.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<CustomerId>,
    pub failed: BTreeMap<CustomerId, DomainError>,
}

/// Last good aggregates of a customer plus a data-inconsistency indicator.
#[derive(Debug, Clone)]
pub struct AggregateView {
    pub customer_id: CustomerId,
    pub result: Option<Arc<RollupResult>>,
    /// Aggregates do not reflect the current tree (last rollup failed or not yet recomputed).
    pub stale: bool,
    pub error: Option<DomainError>,
}

/// Rollup state as shown in health output.
#[derive(Debug, Clone, PartialEq)]
pub enum RollupStatus {
    Never,
    Fresh,
    Dirty,
    Failed(DomainError),
}

/// Per-customer health signal.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantHealth {
    pub customer_id: CustomerId,
    pub error: Option<DomainError>,
    pub points: usize,
    pub drift: usize,
    pub rollup: RollupStatus,
}

impl TenantHealth {
    pub fn is_healthy(&self) -> bool {
        self.error.is_none() && !matches!(self.rollup, RollupStatus::Failed(_))
    }
}

/// Locks of one customer.
#[derive(Debug, Default)]
struct Tenant {
    state: RwLock<TenantState>,
    writer: Mutex<()>,
}

impl Tenant {
    fn read(&self) -> ApplicationResult<RwLockReadGuard<'_, TenantState>> {
        self.state
            .read()
            .map_err(|_| ApplicationError::store("tenant lock poisoned"))
    }

    fn write(&self) -> ApplicationResult<RwLockWriteGuard<'_, TenantState>> {
        self.state
            .write()
            .map_err(|_| ApplicationError::store("tenant lock poisoned"))
    }

    fn writer(&self) -> ApplicationResult<MutexGuard<'_, ()>> {
        self.writer
            .lock()
            .map_err(|_| ApplicationError::store("tenant writer lock poisoned"))
    }
}

type SharedTenant = Arc<Tenant>;

/// Service owning the per-customer tree snapshots.
pub struct RegistryService {
    store: Arc<dyn PointStore>,
    settings: Arc<Settings>,
    builder: TreeBuilder,
    tenants: RwLock<BTreeMap<CustomerId, SharedTenant>>,
    /// Serializes the creation of new customers.
    creating: Mutex<()>,
    directory: RwLock<PointDirectory>,
}

impl RegistryService {
    /// Create an empty registry; call `load_all` to populate it.
    pub fn new(store: Arc<dyn PointStore>, settings: Arc<Settings>) -> Self {
        let builder = TreeBuilder::with_path_policy(settings.tree.path_policy);
        Self {
            store,
            settings,
            builder,
            tenants: RwLock::new(BTreeMap::new()),
            creating: Mutex::new(()),
            directory: RwLock::new(PointDirectory::default()),
        }
    }

    fn read_tenants(&self) -> ApplicationResult<RwLockReadGuard<'_, BTreeMap<CustomerId, SharedTenant>>> {
        self.tenants
            .read()
            .map_err(|_| ApplicationError::store("tenant registry lock poisoned"))
    }

    fn write_tenants(&self) -> ApplicationResult<RwLockWriteGuard<'_, BTreeMap<CustomerId, SharedTenant>>> {
        self.tenants
            .write()
            .map_err(|_| ApplicationError::store("tenant registry lock poisoned"))
    }

    fn find_tenant(&self, customer: CustomerId) -> ApplicationResult<Option<SharedTenant>> {
        Ok(self.read_tenants()?.get(&customer).cloned())
    }

    fn tenant(&self, customer: CustomerId) -> ApplicationResult<SharedTenant> {
        self.find_tenant(customer)?
            .ok_or(ApplicationError::TenantNotFound(customer))
    }

    /// Handles of every customer, taken without keeping the map locked.
    fn all_tenants(&self) -> ApplicationResult<Vec<(CustomerId, SharedTenant)>> {
        Ok(self
            .read_tenants()?
            .iter()
            .map(|(&customer, tenant)| (customer, Arc::clone(tenant)))
            .collect())
    }

    fn directory_mut(&self) -> ApplicationResult<RwLockWriteGuard<'_, PointDirectory>> {
        self.directory
            .write()
            .map_err(|_| ApplicationError::store("directory lock poisoned"))
    }

    /// Build every customer's tree from the store.
    ///
    /// A failed customer is kept as unhealthy; the others stay usable. Previously computed
    /// aggregates survive a reload so reports can fall back to them.
    #[instrument(level = "debug", skip(self))]
    pub fn load_all(&self) -> ApplicationResult<LoadReport> {
        let records = self.store.all_points()?;
        let build = self.builder.build_all(records);

        let mut report = LoadReport::default();
        for (customer, result) in build.tenants {
            let tenant = Arc::clone(self.write_tenants()?.entry(customer).or_default());
            let _writer = tenant.writer()?;
            let mut state = tenant.write()?;
            state.version += 1;
            state.metrics_version += 1;
            match result {
                Ok(tree) => {
                    state.tree = Some(Arc::new(tree));
                    state.build_error = None;
                    report.loaded.push(customer);
                }
                Err(e) => {
                    warn!("customer {} is unhealthy: {}", customer, e);
                    state.tree = None;
                    state.build_error = Some(e.clone());
                    report.failed.insert(customer, e);
                }
            }
        }
        *self.directory_mut()? = build.directory;

        info!(
            "loaded {} customer(s), {} failed",
            report.loaded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    pub fn customers(&self) -> ApplicationResult<Vec<CustomerId>> {
        Ok(self.read_tenants()?.keys().copied().collect())
    }

    /// Current snapshot of a customer's tree.
    pub fn tree(&self, customer: CustomerId) -> ApplicationResult<Arc<TreeIndex>> {
        let tenant = self.tenant(customer)?;
        let state = tenant.read()?;
        state.tree(customer)
    }

    pub fn directory(&self) -> ApplicationResult<PointDirectory> {
        self.directory
            .read()
            .map(|d| d.clone())
            .map_err(|_| ApplicationError::store("directory lock poisoned"))
    }

    /// Owner of a point id across all customers.
    pub fn customer_of(&self, id: PointId) -> ApplicationResult<CustomerId> {
        self.directory()?
            .owner_of(id)
            .ok_or(ApplicationError::Domain(DomainError::PointNotFound(id)))
    }

    /// Breadcrumbs root ... point.
    pub fn full_path(&self, customer: CustomerId, id: PointId) -> ApplicationResult<Vec<Breadcrumb>> {
        let tree = self.tree(customer)?;
        Ok(AncestorResolver::new(&tree).breadcrumbs(id)?)
    }

    // ------------------------------------------------------------------
    // mutations
    // ------------------------------------------------------------------

    /// Apply `op` to a copy of the tree, persist it, then publish it.
    ///
    /// Nothing is published if `op` or the store write fails. Readers keep seeing the
    /// previous snapshot while the store is written.
    fn mutate<T>(
        &self,
        customer: CustomerId,
        affects_rollup: bool,
        op: impl FnOnce(&mut TreeIndex) -> DomainResult<T>,
    ) -> ApplicationResult<T> {
        let tenant = self.tenant(customer)?;
        self.apply(customer, &tenant, affects_rollup, op)
    }

    fn apply<T>(
        &self,
        customer: CustomerId,
        tenant: &Tenant,
        affects_rollup: bool,
        op: impl FnOnce(&mut TreeIndex) -> DomainResult<T>,
    ) -> ApplicationResult<T> {
        let _writer = tenant.writer()?;
        let current = tenant.read()?.tree(customer)?;

        let mut next = (*current).clone();
        let value = op(&mut next)?;
        self.store.replace_points(customer, &next.to_records())?;

        let mut state = tenant.write()?;
        state.tree = Some(Arc::new(next));
        state.version += 1;
        if affects_rollup {
            state.metrics_version += 1;
        }
        debug!(
            "customer {}: published version {} (rollup dirty: {})",
            customer,
            state.version,
            state.rollup_dirty()
        );
        Ok(value)
    }

    /// Add a new point; its path is computed from the parent.
    ///
    /// The first point of an unknown customer creates it. The customer only becomes
    /// visible once that insert has been persisted.
    #[instrument(level = "debug", skip(self, point), fields(id = point.id, customer = point.customer_id))]
    pub fn insert_point(&self, point: RegistrationPoint) -> ApplicationResult<()> {
        let (id, customer) = (point.id, point.customer_id);
        if let Some(owner) = self.directory()?.owner_of(id) {
            if owner != customer {
                return Err(DomainError::DuplicatePoint(id).into());
            }
        }

        match self.find_tenant(customer)? {
            Some(_) => self.mutate(customer, true, |tree| tree.insert(point))?,
            None => self.create_tenant(customer, point)?,
        }
        self.directory_mut()?.insert(id, customer);
        Ok(())
    }

    fn create_tenant(&self, customer: CustomerId, point: RegistrationPoint) -> ApplicationResult<()> {
        let _creating = self
            .creating
            .lock()
            .map_err(|_| ApplicationError::store("tenant creation lock poisoned"))?;
        // created by a concurrent insert while we waited
        if self.find_tenant(customer)?.is_some() {
            return self.mutate(customer, true, |tree| tree.insert(point));
        }

        let tenant = Tenant {
            state: RwLock::new(TenantState {
                tree: Some(Arc::new(TreeIndex::new(customer))),
                ..TenantState::default()
            }),
            writer: Mutex::new(()),
        };
        self.apply(customer, &tenant, true, |tree| tree.insert(point))?;
        self.write_tenants()?.insert(customer, Arc::new(tenant));
        info!("customer {} created", customer);
        Ok(())
    }

    /// Move a point and its subtree; all paths are rewritten in one published step.
    #[instrument(level = "debug", skip(self))]
    pub fn reparent(
        &self,
        customer: CustomerId,
        id: PointId,
        new_parent: Option<PointId>,
    ) -> ApplicationResult<Vec<PointId>> {
        self.mutate(customer, true, |tree| tree.reparent(id, new_parent))
    }

    /// Cascading soft-delete.
    #[instrument(level = "debug", skip(self))]
    pub fn soft_delete(
        &self,
        customer: CustomerId,
        id: PointId,
        at: Timestamp,
    ) -> ApplicationResult<CascadeOutcome> {
        self.mutate(customer, false, |tree| CascadeSoftDeleter::new().delete(tree, id, at))
    }

    /// Restore one point; descendants stay deleted.
    #[instrument(level = "debug", skip(self))]
    pub fn restore(&self, customer: CustomerId, id: PointId) -> ApplicationResult<CascadeOutcome> {
        self.mutate(customer, false, |tree| CascadeSoftDeleter::new().restore(tree, id))
    }

    #[instrument(level = "debug", skip(self))]
    pub fn update_metrics(
        &self,
        customer: CustomerId,
        id: PointId,
        metrics: Metrics,
    ) -> ApplicationResult<()> {
        self.mutate(customer, true, |tree| tree.set_metrics(id, metrics))
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_active(&self, customer: CustomerId, id: PointId, active: bool) -> ApplicationResult<()> {
        self.mutate(customer, false, |tree| tree.set_active(id, active))
    }

    // ------------------------------------------------------------------
    // rollups
    // ------------------------------------------------------------------

    fn record_rollup(
        &self,
        customer: CustomerId,
        computed_for: u64,
        result: DomainResult<RollupResult>,
    ) -> ApplicationResult<DomainResult<Arc<RollupResult>>> {
        let tenant = self.tenant(customer)?;
        let mut state = tenant.write()?;
        Ok(match result {
            Ok(result) => {
                let result = Arc::new(result);
                state.rollup = Some(Arc::clone(&result));
                state.rollup_version = Some(computed_for);
                state.rollup_error = None;
                Ok(result)
            }
            Err(e) => {
                warn!("customer {}: rollup discarded: {}", customer, e);
                state.rollup_error = Some(e.clone());
                Err(e)
            }
        })
    }

    /// Rollup of one customer, recomputed only when dirty.
    ///
    /// A failed rollup is discarded as a whole; the previous aggregates are kept.
    #[instrument(level = "debug", skip(self))]
    pub fn rollup(&self, customer: CustomerId) -> ApplicationResult<Arc<RollupResult>> {
        let (tree, metrics_version) = {
            let tenant = self.tenant(customer)?;
            let state = tenant.read()?;
            if !state.rollup_dirty() {
                if let Some(result) = &state.rollup {
                    debug!("customer {}: rollup is fresh", customer);
                    return Ok(Arc::clone(result));
                }
            }
            (state.tree(customer)?, state.metrics_version)
        };

        let result = AggregationEngine::new().rollup(&tree);
        Ok(self.record_rollup(customer, metrics_version, result)??)
    }

    /// Roll up every dirty, healthy customer. Customers are independent and run in parallel
    /// unless disabled in the settings.
    #[instrument(level = "debug", skip(self))]
    pub fn rollup_all(&self) -> ApplicationResult<BTreeMap<CustomerId, DomainResult<Arc<RollupResult>>>> {
        let mut work: Vec<(CustomerId, Arc<TreeIndex>, u64)> = Vec::new();
        for (customer, tenant) in self.all_tenants()? {
            let state = tenant.read()?;
            if !state.rollup_dirty() {
                continue;
            }
            if let Ok(tree) = state.tree(customer) {
                work.push((customer, tree, state.metrics_version));
            }
        }
        debug!("{} customer(s) need a rollup", work.len());

        let engine = AggregationEngine::new();
        let computed: Vec<(CustomerId, u64, DomainResult<RollupResult>)> = if self.settings.rollup.parallel {
            work.into_par_iter()
                .map(|(customer, tree, version)| (customer, version, engine.rollup(&tree)))
                .collect()
        } else {
            work.into_iter()
                .map(|(customer, tree, version)| (customer, version, engine.rollup(&tree)))
                .collect()
        };

        let mut results = BTreeMap::new();
        for (customer, version, result) in computed {
            results.insert(customer, self.record_rollup(customer, version, result)?);
        }
        Ok(results)
    }

    /// Write the current aggregates onto internal points and persist them.
    ///
    /// Leaves are untouched, so this does not make the rollup dirty again.
    pub fn persist_rollup(&self, customer: CustomerId) -> ApplicationResult<usize> {
        let result = self.rollup(customer)?;
        self.mutate(customer, false, |tree| result.apply(tree))
    }

    /// Last good aggregates with a staleness indicator. Never fails because a rollup failed.
    pub fn aggregates(&self, customer: CustomerId) -> ApplicationResult<AggregateView> {
        let tenant = self.tenant(customer)?;
        let state = tenant.read()?;
        let error = state.rollup_error.clone().or_else(|| state.build_error.clone());
        Ok(AggregateView {
            customer_id: customer,
            result: state.rollup.clone(),
            stale: error.is_some() || state.rollup_dirty(),
            error,
        })
    }

    /// Health signal for every known customer.
    pub fn health(&self) -> ApplicationResult<Vec<TenantHealth>> {
        let mut health = Vec::new();
        for (customer, tenant) in self.all_tenants()? {
            let state = tenant.read()?;
            let rollup = match (&state.rollup_error, &state.rollup) {
                (Some(e), _) => RollupStatus::Failed(e.clone()),
                (None, None) => RollupStatus::Never,
                (None, Some(_)) if state.rollup_dirty() => RollupStatus::Dirty,
                (None, Some(_)) => RollupStatus::Fresh,
            };
            health.push(TenantHealth {
                customer_id: customer,
                error: state.build_error.clone(),
                points: state.tree.as_ref().map(|t| t.len()).unwrap_or(0),
                drift: state.tree.as_ref().map(|t| t.drift().len()).unwrap_or(0),
                rollup,
            });
        }
        Ok(health)
    }
}
