//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::application::services::{RegistryService, ReportService};
use crate::config::Settings;
use crate::domain::ScopeResolver;
use crate::infrastructure::traits::{JsonFileStore, PointStore};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Storage collaborator
    pub store: Arc<dyn PointStore>,

    /// Per-customer tree snapshots and rollups
    pub registry: Arc<RegistryService>,

    /// Scope-filtered reports
    pub reports: ReportService,
}

impl ServiceContainer {
    /// Create a service container backed by the JSON dataset from the settings.
    pub fn new(settings: Settings) -> Self {
        let store = Arc::new(JsonFileStore::new(settings.data_file.clone()));
        Self::with_deps(settings, store)
    }

    /// Create a service container with a custom store (for testing).
    pub fn with_deps(settings: Settings, store: Arc<dyn PointStore>) -> Self {
        let settings = Arc::new(settings);
        let registry = Arc::new(RegistryService::new(
            Arc::clone(&store),
            Arc::clone(&settings),
        ));
        let resolver = ScopeResolver::new(settings.scope.deleted_policy());
        let reports = ReportService::new(Arc::clone(&registry), Arc::clone(&store), resolver);

        Self {
            settings,
            store,
            registry,
            reports,
        }
    }
}
