//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::entities::{CustomerId, PointId, ProjectId};

/// Why a scope entry could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRejection {
    /// No registration point with this id exists anywhere.
    UnknownPoint,
    /// The point exists but belongs to another tenant.
    ForeignTenant { owner: CustomerId },
}

impl std::fmt::Display for ScopeRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeRejection::UnknownPoint => write!(f, "unknown registration point"),
            ScopeRejection::ForeignTenant { owner } => {
                write!(f, "point belongs to customer {}", owner)
            }
        }
    }
}

/// Domain errors represent structural violations of the registration point forest.
/// These are independent of storage and presentation concerns.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("missing parent: point {point} of customer {customer} references parent {parent}")]
    MissingParent {
        point: PointId,
        parent: PointId,
        customer: CustomerId,
    },

    #[error("cycle detected in hierarchy at point {0}")]
    Cycle(PointId),

    #[error("broken path: point {point} references absent ancestor {missing}")]
    BrokenPath { point: PointId, missing: PointId },

    #[error("invalid scope entry: project {project}, point {point}: {reason}")]
    InvalidScopeEntry {
        project: ProjectId,
        point: PointId,
        reason: ScopeRejection,
    },

    #[error("malformed path {raw:?}: {message}")]
    MalformedPath { raw: String, message: String },

    #[error("duplicate registration point id: {0}")]
    DuplicatePoint(PointId),

    #[error("path mismatch at point {point}: stored {stored:?}, derived {derived:?}")]
    PathMismatch {
        point: PointId,
        stored: Vec<PointId>,
        derived: Vec<PointId>,
    },

    #[error("registration point not found: {0}")]
    PointNotFound(PointId),

    #[error("point {point} of customer {customer} cannot be attached to customer {target}")]
    CrossTenant {
        point: PointId,
        customer: CustomerId,
        target: CustomerId,
    },

    #[error("rollup of customer {rollup} cannot be applied to the tree of customer {tree}")]
    RollupTenantMismatch { rollup: CustomerId, tree: CustomerId },
}

impl DomainError {
    /// Structural errors are fatal for the tenant's build or rollup.
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            DomainError::InvalidScopeEntry { .. } | DomainError::PointNotFound(_)
        )
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
