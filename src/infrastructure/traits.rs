//! Storage boundary traits for testability
//!
//! The core consumes flat point records from storage and hands whole-tenant
//! replacements back. Services depend on `PointStore`, so they can be tested
//! against the in-memory implementation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::{CustomerId, ProjectId, ProjectScopeEntry, Registration, RegistrationPoint};

/// Storage collaborator for registration points, registrations and project scopes.
pub trait PointStore: Send + Sync {
    /// Every point of every tenant, unordered.
    fn all_points(&self) -> ApplicationResult<Vec<RegistrationPoint>>;

    /// One tenant's points, unordered.
    fn points(&self, customer: CustomerId) -> ApplicationResult<Vec<RegistrationPoint>> {
        Ok(self
            .all_points()?
            .into_iter()
            .filter(|p| p.customer_id == customer)
            .collect())
    }

    /// Registrations of one tenant.
    fn registrations(&self, customer: CustomerId) -> ApplicationResult<Vec<Registration>>;

    /// Scope entries of one project. Empty means "all points".
    fn scope_entries(&self, project: ProjectId) -> ApplicationResult<Vec<ProjectScopeEntry>>;

    /// Replace all points of one tenant in a single atomic write.
    fn replace_points(
        &self,
        customer: CustomerId,
        records: &[RegistrationPoint],
    ) -> ApplicationResult<()>;
}

/// Serialized form of a complete dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub points: Vec<RegistrationPoint>,
    pub registrations: Vec<Registration>,
    pub scopes: Vec<ProjectScopeEntry>,
}

impl Dataset {
    fn replace_points(&mut self, customer: CustomerId, records: &[RegistrationPoint]) {
        self.points.retain(|p| p.customer_id != customer);
        self.points.extend_from_slice(records);
        self.points.sort_by_key(|p| (p.customer_id, p.id));
    }

    fn registrations(&self, customer: CustomerId) -> Vec<Registration> {
        self.registrations
            .iter()
            .filter(|r| r.customer_id == customer)
            .cloned()
            .collect()
    }

    fn scope_entries(&self, project: ProjectId) -> Vec<ProjectScopeEntry> {
        self.scopes
            .iter()
            .filter(|e| e.project_id == project)
            .copied()
            .collect()
    }
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// Dataset kept in one JSON file. Writes go to a temp file that is renamed over the
/// original, so readers see either the old or the new content.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the dataset; a missing file is an empty dataset.
    pub fn read(&self) -> ApplicationResult<Dataset> {
        if !self.path.exists() {
            debug!("dataset {} does not exist, starting empty", self.path.display());
            return Ok(Dataset::default());
        }
        let content =
            std::fs::read_to_string(&self.path).with_path_context("read dataset", &self.path)?;
        serde_json::from_str(&content).map_err(|e| ApplicationError::OperationFailed {
            context: format!("parse dataset: {}", self.path.display()),
            source: Box::new(e),
        })
    }

    /// Write the whole dataset atomically.
    pub fn write(&self, dataset: &Dataset) -> ApplicationResult<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).with_path_context("create dataset dir", &dir)?;

        let json = serde_json::to_string_pretty(dataset).map_err(|e| {
            ApplicationError::OperationFailed {
                context: "serialize dataset".to_string(),
                source: Box::new(e),
            }
        })?;

        let mut tmp = NamedTempFile::new_in(&dir).with_path_context("create temp file", &dir)?;
        tmp.write_all(json.as_bytes())
            .with_path_context("write temp file", tmp.path())?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_path_context("replace dataset", &self.path)?;
        debug!("wrote dataset {}", self.path.display());
        Ok(())
    }
}

impl PointStore for JsonFileStore {
    fn all_points(&self) -> ApplicationResult<Vec<RegistrationPoint>> {
        Ok(self.read()?.points)
    }

    fn registrations(&self, customer: CustomerId) -> ApplicationResult<Vec<Registration>> {
        Ok(self.read()?.registrations(customer))
    }

    fn scope_entries(&self, project: ProjectId) -> ApplicationResult<Vec<ProjectScopeEntry>> {
        Ok(self.read()?.scope_entries(project))
    }

    fn replace_points(
        &self,
        customer: CustomerId,
        records: &[RegistrationPoint],
    ) -> ApplicationResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ApplicationError::store("dataset write lock poisoned"))?;
        let mut dataset = self.read()?;
        dataset.replace_points(customer, records);
        self.write(&dataset)
    }
}

/// In-memory dataset for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<Dataset>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            data: RwLock::new(dataset),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn with_points(points: Vec<RegistrationPoint>) -> Self {
        Self::new(Dataset {
            points,
            ..Dataset::default()
        })
    }

    /// Make every subsequent `replace_points` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ApplicationResult<Dataset> {
        self.data
            .read()
            .map(|d| d.clone())
            .map_err(|_| ApplicationError::store("dataset lock poisoned"))
    }
}

impl PointStore for InMemoryStore {
    fn all_points(&self) -> ApplicationResult<Vec<RegistrationPoint>> {
        Ok(self.snapshot()?.points)
    }

    fn registrations(&self, customer: CustomerId) -> ApplicationResult<Vec<Registration>> {
        let data = self
            .data
            .read()
            .map_err(|_| ApplicationError::store("dataset lock poisoned"))?;
        Ok(data.registrations(customer))
    }

    fn scope_entries(&self, project: ProjectId) -> ApplicationResult<Vec<ProjectScopeEntry>> {
        let data = self
            .data
            .read()
            .map_err(|_| ApplicationError::store("dataset lock poisoned"))?;
        Ok(data.scope_entries(project))
    }

    fn replace_points(
        &self,
        customer: CustomerId,
        records: &[RegistrationPoint],
    ) -> ApplicationResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ApplicationError::store(format!(
                "write rejected for customer {}",
                customer
            )));
        }
        let mut data = self
            .data
            .write()
            .map_err(|_| ApplicationError::store("dataset lock poisoned"))?;
        data.replace_points(customer, records);
        Ok(())
    }
}
