//! Resolution of project scopes into concrete leaf sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::arena::TreeIndex;
use crate::domain::builder::PointDirectory;
use crate::domain::entities::{CustomerId, PointId, ProjectScopeEntry, Registration, RegistrationPoint};
use crate::domain::error::{DomainError, ScopeRejection};
use crate::domain::membership::descendants;

/// Whether soft-deleted points take part in scope resolution.
///
/// Historical reports may want deleted points kept for totals, current ones usually not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletedPolicy {
    #[default]
    Exclude,
    Include,
}

impl DeletedPolicy {
    pub fn from_include_deleted(include_deleted: bool) -> Self {
        if include_deleted {
            DeletedPolicy::Include
        } else {
            DeletedPolicy::Exclude
        }
    }

    fn admits(&self, point: &RegistrationPoint) -> bool {
        match self {
            DeletedPolicy::Include => true,
            DeletedPolicy::Exclude => !point.is_deleted(),
        }
    }
}

/// Effective leaf set of a scope, plus the entries that could not be resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeResolution {
    pub customer_id: CustomerId,
    pub members: BTreeSet<PointId>,
    pub rejected: Vec<DomainError>,
}

impl ScopeResolution {
    pub fn contains(&self, id: PointId) -> bool {
        self.members.contains(&id)
    }

    /// Report predicate: the registration belongs to this tenant and points into the set.
    pub fn admits(&self, registration: &Registration) -> bool {
        registration.customer_id == self.customer_id
            && self.members.contains(&registration.registration_point_id)
    }

    pub fn is_degraded(&self) -> bool {
        !self.rejected.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeResolver {
    deleted_policy: DeletedPolicy,
}

impl ScopeResolver {
    pub fn new(deleted_policy: DeletedPolicy) -> Self {
        Self { deleted_policy }
    }

    pub fn deleted_policy(&self) -> DeletedPolicy {
        self.deleted_policy
    }

    /// Turn scope entries into the set of leaf ids a report is filtered by.
    ///
    /// - no entries: every active leaf of the tenant
    /// - `include_children`: the point itself when it is a leaf, plus every active leaf below it
    /// - otherwise: the point alone
    ///
    /// Subtrees follow parent links. The deleted policy applies to every member.
    ///
    /// Entries are unioned. An entry naming an unknown point or a point of another tenant is
    /// rejected on its own and the remaining entries are still resolved.
    #[instrument(level = "debug", skip(self, entries, index, directory), fields(customer = index.customer_id(), entries = entries.len()))]
    pub fn effective_members(
        &self,
        entries: &[ProjectScopeEntry],
        index: &TreeIndex,
        directory: Option<&PointDirectory>,
    ) -> ScopeResolution {
        let mut members = BTreeSet::new();
        let mut rejected = Vec::new();

        if entries.is_empty() {
            members.extend(self.active_leaves(index).map(|p| p.id));
            debug!("empty scope: {} active leaves", members.len());
            return ScopeResolution {
                customer_id: index.customer_id(),
                members,
                rejected,
            };
        }

        for entry in entries {
            let point_id = entry.registration_point_id;
            let Some(point) = index.get(point_id) else {
                let reason = match directory.and_then(|d| d.owner_of(point_id)) {
                    Some(owner) if owner != index.customer_id() => {
                        ScopeRejection::ForeignTenant { owner }
                    }
                    _ => ScopeRejection::UnknownPoint,
                };
                let error = DomainError::InvalidScopeEntry {
                    project: entry.project_id,
                    point: point_id,
                    reason,
                };
                warn!("skipping scope entry: {}", error);
                rejected.push(error);
                continue;
            };

            // the named point counts in both modes; activeness only filters expanded descendants
            let names_leaf = index.is_leaf(point_id) || !entry.include_children;
            if names_leaf && self.deleted_policy.admits(point) {
                members.insert(point_id);
            }
            if entry.include_children {
                members.extend(
                    descendants(index, point_id)
                        .into_iter()
                        .filter(|p| index.is_leaf(p.id) && self.is_selectable(p))
                        .map(|leaf| leaf.id),
                );
            }
        }

        debug!(
            "resolved {} member(s), {} rejected entr(ies)",
            members.len(),
            rejected.len()
        );
        ScopeResolution {
            customer_id: index.customer_id(),
            members,
            rejected,
        }
    }

    fn is_selectable(&self, point: &RegistrationPoint) -> bool {
        point.active && self.deleted_policy.admits(point)
    }

    fn active_leaves<'a>(&'a self, index: &'a TreeIndex) -> impl Iterator<Item = &'a RegistrationPoint> + 'a {
        index
            .leaves()
            .into_iter()
            .filter(move |p| self.is_selectable(p))
    }
}
