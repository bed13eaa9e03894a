//! Domain entities: registration points, registrations and scope entries

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::path;

pub type PointId = u64;
pub type CustomerId = u64;
pub type ProjectId = u64;
pub type Timestamp = DateTime<Utc>;

/// Kind of a registration point. Depth does not determine the kind; a moved point keeps its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Area,
    Category,
    Product,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Label::Area => "area",
            Label::Category => "category",
            Label::Product => "product",
        };
        write!(f, "{}", s)
    }
}

/// Optional cost and weight figures of a point. `amount` is a weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Metrics {
    pub cost: Option<f64>,
    pub cost_per_kg: Option<f64>,
    pub amount: Option<f64>,
}

/// Selects one of the three metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cost,
    CostPerKg,
    Amount,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Cost, Metric::CostPerKg, Metric::Amount];
}

impl Metrics {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Cost => self.cost,
            Metric::CostPerKg => self.cost_per_kg,
            Metric::Amount => self.amount,
        }
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        match metric {
            Metric::Cost => self.cost = value,
            Metric::CostPerKg => self.cost_per_kg = value,
            Metric::Amount => self.amount = value,
        }
    }
}

/// A node in a tenant's registration point forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredPoint", into = "StoredPoint")]
pub struct RegistrationPoint {
    pub id: PointId,
    pub parent_id: Option<PointId>,
    /// Ancestor ids, root first, excluding self. Stored in encoded form.
    pub path: Vec<PointId>,
    pub customer_id: CustomerId,
    pub name: String,
    pub label: Label,
    pub metrics: Metrics,
    pub active: bool,
    pub deleted_at: Option<Timestamp>,
    /// Stored path that did not decode; reported when the tenant's tree is built
    /// and written back unchanged.
    pub malformed_path: Option<String>,
}

/// Storage form of a point. A bad path must not fail the whole dataset, so it is
/// kept raw here and rejected per tenant by the tree builder.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPoint {
    id: PointId,
    #[serde(default)]
    parent_id: Option<PointId>,
    #[serde(default)]
    path: Option<String>,
    customer_id: CustomerId,
    name: String,
    label: Label,
    #[serde(flatten)]
    metrics: Metrics,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    deleted_at: Option<Timestamp>,
}

fn default_active() -> bool {
    true
}

impl From<StoredPoint> for RegistrationPoint {
    fn from(stored: StoredPoint) -> Self {
        let raw = stored.path.unwrap_or_default();
        let (path, malformed_path) = match path::decode(&raw) {
            Ok(path) => (path, None),
            Err(_) => (Vec::new(), Some(raw)),
        };
        Self {
            id: stored.id,
            parent_id: stored.parent_id,
            path,
            customer_id: stored.customer_id,
            name: stored.name,
            label: stored.label,
            metrics: stored.metrics,
            active: stored.active,
            deleted_at: stored.deleted_at,
            malformed_path,
        }
    }
}

impl From<RegistrationPoint> for StoredPoint {
    fn from(point: RegistrationPoint) -> Self {
        let path = point
            .malformed_path
            .unwrap_or_else(|| path::encode(&point.path));
        Self {
            id: point.id,
            parent_id: point.parent_id,
            path: Some(path),
            customer_id: point.customer_id,
            name: point.name,
            label: point.label,
            metrics: point.metrics,
            active: point.active,
            deleted_at: point.deleted_at,
        }
    }
}

impl RegistrationPoint {
    /// Create an alive, active point without metrics.
    pub fn new(
        id: PointId,
        parent_id: Option<PointId>,
        customer_id: CustomerId,
        name: impl Into<String>,
        label: Label,
    ) -> Self {
        Self {
            id,
            parent_id,
            path: Vec::new(),
            customer_id,
            name: name.into(),
            label,
            metrics: Metrics::default(),
            active: true,
            deleted_at: None,
            malformed_path: None,
        }
    }

    pub fn with_path(mut self, path: Vec<PointId>) -> Self {
        self.path = path;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.metrics.cost = Some(cost);
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.metrics.amount = Some(amount);
        self
    }

    pub fn with_cost_per_kg(mut self, cost_per_kg: f64) -> Self {
        self.metrics.cost_per_kg = Some(cost_per_kg);
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn state(&self) -> PointState {
        if self.is_deleted() {
            PointState::SoftDeleted
        } else {
            PointState::Active
        }
    }
}

impl fmt::Display for RegistrationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} #{}]", self.name, self.label, self.id)?;
        if self.is_deleted() {
            write!(f, " (deleted)")?;
        }
        Ok(())
    }
}

/// Lifecycle state of a point. There is no engine-internal way back from `SoftDeleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointState {
    Active,
    SoftDeleted,
}

/// A food-waste event attributed to one registration point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: u64,
    pub registration_point_id: PointId,
    pub customer_id: CustomerId,
    pub date: chrono::NaiveDate,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub cost: f64,
}

/// One entry of a project's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectScopeEntry {
    pub project_id: ProjectId,
    pub registration_point_id: PointId,
    #[serde(default)]
    pub include_children: bool,
}

impl ProjectScopeEntry {
    pub fn new(project_id: ProjectId, registration_point_id: PointId, include_children: bool) -> Self {
        Self {
            project_id,
            registration_point_id,
            include_children,
        }
    }
}

/// Breadcrumb element for UI display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub id: PointId,
    pub name: String,
    pub label: Label,
}

impl From<&RegistrationPoint> for Breadcrumb {
    fn from(point: &RegistrationPoint) -> Self {
        Self {
            id: point.id,
            name: point.name.clone(),
            label: point.label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_storage_json_when_deserializing_then_decodes_path_and_defaults() {
        let json = r#"{
            "id": 3,
            "parentId": 2,
            "path": "1.2",
            "customerId": 7,
            "name": "Bread",
            "label": "product",
            "cost": 100.0
        }"#;

        let point: RegistrationPoint = serde_json::from_str(json).unwrap();

        assert_eq!(point.path, vec![1, 2]);
        assert_eq!(point.metrics.cost, Some(100.0));
        assert_eq!(point.metrics.amount, None);
        assert!(point.active);
        assert_eq!(point.state(), PointState::Active);
    }

    #[test]
    fn given_point_when_serializing_then_path_is_encoded_string() {
        let point = RegistrationPoint::new(12, Some(1), 7, "Kitchen", Label::Category)
            .with_path(vec![1]);

        let value = serde_json::to_value(&point).unwrap();

        assert_eq!(value["path"], "1");
        assert_eq!(value["label"], "category");
        assert!(value.get("malformedPath").is_none());
    }

    #[test]
    fn given_malformed_path_when_serializing_then_raw_path_is_written_back() {
        let json = r#"{"id": 3, "path": "1..2", "customerId": 7, "name": "x", "label": "product"}"#;
        let point: RegistrationPoint = serde_json::from_str(json).unwrap();

        let value = serde_json::to_value(&point).unwrap();

        assert_eq!(value["path"], "1..2");
    }

    #[test]
    fn given_malformed_path_when_deserializing_then_raw_path_is_kept() {
        let json = r#"{"id": 3, "path": "1..2", "customerId": 7, "name": "x", "label": "product"}"#;

        let point: RegistrationPoint = serde_json::from_str(json).unwrap();

        assert!(point.path.is_empty());
        assert_eq!(point.malformed_path.as_deref(), Some("1..2"));
    }
}
