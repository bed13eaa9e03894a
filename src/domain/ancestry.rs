//! Root-to-node ancestor chains.

use tracing::instrument;

use crate::domain::arena::TreeIndex;
use crate::domain::entities::{Breadcrumb, PointId, RegistrationPoint};
use crate::domain::error::{DomainError, DomainResult};

/// Resolves ancestor chains from a point's materialized path.
#[derive(Debug, Clone, Copy)]
pub struct AncestorResolver<'a> {
    index: &'a TreeIndex,
}

impl<'a> AncestorResolver<'a> {
    pub fn new(index: &'a TreeIndex) -> Self {
        Self { index }
    }

    /// Root ... point, inclusive.
    ///
    /// Every ancestor id of the stored path must be present in the index, and the
    /// stored path must equal the one derived from parent links. A stale path fails
    /// with `BrokenPath` or `PathMismatch` instead of yielding a wrong chain.
    #[instrument(level = "trace", skip(self))]
    pub fn full_path(&self, id: PointId) -> DomainResult<Vec<&'a RegistrationPoint>> {
        let point = self.index.point(id)?;
        let mut chain = Vec::with_capacity(point.path.len() + 1);
        for &ancestor in &point.path {
            let ancestor = self.index.get(ancestor).ok_or(DomainError::BrokenPath {
                point: id,
                missing: ancestor,
            })?;
            chain.push(ancestor);
        }
        let derived = self.index.derived_path(id)?;
        if derived != point.path {
            return Err(DomainError::PathMismatch {
                point: id,
                stored: point.path.clone(),
                derived,
            });
        }
        chain.push(point);
        Ok(chain)
    }

    /// Breadcrumb form of `full_path` for display.
    pub fn breadcrumbs(&self, id: PointId) -> DomainResult<Vec<Breadcrumb>> {
        Ok(self
            .full_path(id)?
            .into_iter()
            .map(Breadcrumb::from)
            .collect())
    }

    /// Check that every point's chain resolves; fails on the first broken one.
    pub fn verify_all(&self) -> DomainResult<()> {
        for point in self.index.points() {
            self.full_path(point.id)?;
        }
        Ok(())
    }
}
