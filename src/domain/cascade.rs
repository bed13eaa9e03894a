//! Cascading soft-delete.
//!
//! Deleting a point marks it and every descendant. Restoring only clears the point itself;
//! descendants stay deleted until restored one by one.

use tracing::{debug, info, instrument};

use crate::domain::arena::TreeIndex;
use crate::domain::entities::{PointId, Timestamp};
use crate::domain::error::{DomainError, DomainResult};

/// Points whose `deleted_at` changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub affected: Vec<PointId>,
}

impl CascadeOutcome {
    pub fn is_empty(&self) -> bool {
        self.affected.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CascadeSoftDeleter;

impl CascadeSoftDeleter {
    pub fn new() -> Self {
        Self
    }

    /// Set `deleted_at = at` on `id` and on every alive point below it by parent links.
    ///
    /// Ancestors and unrelated subtrees are never touched. Deleting an already deleted
    /// point changes nothing.
    #[instrument(level = "debug", skip(self, index))]
    pub fn delete(&self, index: &mut TreeIndex, id: PointId, at: Timestamp) -> DomainResult<CascadeOutcome> {
        let target = index.point(id)?;
        if target.is_deleted() {
            debug!("point {} already deleted, nothing to do", id);
            return Ok(CascadeOutcome::default());
        }

        let mut affected = vec![id];
        affected.extend(
            index
                .subtree(id)
                .into_iter()
                .skip(1)
                .filter(|p| !p.is_deleted())
                .map(|p| p.id),
        );

        for &point_id in &affected {
            let point = index
                .point_mut(point_id)
                .ok_or(DomainError::PointNotFound(point_id))?;
            point.deleted_at = Some(at);
        }
        info!("soft-deleted point {} and {} descendant(s)", id, affected.len() - 1);
        Ok(CascadeOutcome { affected })
    }

    /// Clear the point's own `deleted_at`. Descendants keep theirs.
    #[instrument(level = "debug", skip(self, index))]
    pub fn restore(&self, index: &mut TreeIndex, id: PointId) -> DomainResult<CascadeOutcome> {
        let point = index.point_mut(id).ok_or(DomainError::PointNotFound(id))?;
        if point.deleted_at.take().is_none() {
            return Ok(CascadeOutcome::default());
        }
        let still_deleted = index
            .subtree(id)
            .into_iter()
            .skip(1)
            .filter(|p| p.is_deleted())
            .count();
        if still_deleted > 0 {
            info!(
                "restored point {}; {} descendant(s) remain deleted",
                id, still_deleted
            );
        }
        Ok(CascadeOutcome { affected: vec![id] })
    }
}
