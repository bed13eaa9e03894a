//! Report service
//!
//! Filters a customer's registrations by a project scope and totals them.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::application::services::registry::{AggregateView, RegistryService};
use crate::application::ApplicationResult;
use crate::domain::{
    CustomerId, DomainError, PointId, ProjectId, Registration, ScopeResolution, ScopeResolver,
};
use crate::infrastructure::traits::PointStore;

/// Registrations of one project scope with totals.
#[derive(Debug, Clone)]
pub struct Report {
    pub customer_id: CustomerId,
    pub project_id: ProjectId,
    pub members: BTreeSet<PointId>,
    pub registrations: Vec<Registration>,
    pub total_amount: f64,
    pub total_cost: f64,
    /// Scope entries that were skipped.
    pub scope_warnings: Vec<DomainError>,
    /// Last good aggregates; `stale` marks a data inconsistency.
    pub aggregates: AggregateView,
}

impl Report {
    /// True when some scope entry was skipped or the aggregates are not current.
    pub fn is_inconsistent(&self) -> bool {
        !self.scope_warnings.is_empty() || self.aggregates.stale
    }
}

pub struct ReportService {
    registry: Arc<RegistryService>,
    store: Arc<dyn PointStore>,
    resolver: ScopeResolver,
}

impl ReportService {
    pub fn new(
        registry: Arc<RegistryService>,
        store: Arc<dyn PointStore>,
        resolver: ScopeResolver,
    ) -> Self {
        Self {
            registry,
            store,
            resolver,
        }
    }

    /// Effective leaf set of a project's scope within one customer.
    #[instrument(level = "debug", skip(self))]
    pub fn effective_members(
        &self,
        customer: CustomerId,
        project: ProjectId,
    ) -> ApplicationResult<ScopeResolution> {
        let tree = self.registry.tree(customer)?;
        let entries = self.store.scope_entries(project)?;
        let directory = self.registry.directory()?;
        Ok(self
            .resolver
            .effective_members(&entries, &tree, Some(&directory)))
    }

    /// Build the report. A failing rollup does not fail the report; the last good
    /// aggregates are attached and flagged as stale instead.
    #[instrument(level = "debug", skip(self))]
    pub fn report(&self, customer: CustomerId, project: ProjectId) -> ApplicationResult<Report> {
        let scope = self.effective_members(customer, project)?;

        let registrations: Vec<Registration> = self
            .store
            .registrations(customer)?
            .into_iter()
            .filter(|r| scope.admits(r))
            .collect();
        let total_amount = registrations.iter().map(|r| r.amount).sum();
        let total_cost = registrations.iter().map(|r| r.cost).sum();
        debug!(
            "customer {} project {}: {} registration(s) in scope",
            customer,
            project,
            registrations.len()
        );

        if let Err(e) = self.registry.rollup(customer) {
            warn!("customer {}: using last good aggregates: {}", customer, e);
        }
        let aggregates = self.registry.aggregates(customer)?;

        Ok(Report {
            customer_id: customer,
            project_id: project,
            members: scope.members,
            registrations,
            total_amount,
            total_cost,
            scope_warnings: scope.rejected,
            aggregates,
        })
    }
}
