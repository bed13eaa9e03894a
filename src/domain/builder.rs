//! Tree builder: turns flat storage records into validated per-tenant forests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::arena::{PathDrift, TreeIndex};
use crate::domain::entities::{CustomerId, PointId, RegistrationPoint};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::path;

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, DomainError>;

/// How stored paths are treated when an index is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathPolicy {
    /// Keep stored paths and record every disagreement as drift. Resolving a drifted
    /// point then fails, which aborts the rollup of its customer.
    #[default]
    Verify,
    /// Replace stored paths with the ones derived from parent links.
    Recompute,
    /// Fail the build on the first disagreement.
    Strict,
}

impl fmt::Display for PathPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PathPolicy::Verify => "verify",
            PathPolicy::Recompute => "recompute",
            PathPolicy::Strict => "strict",
        };
        write!(f, "{}", s)
    }
}

/// Owner lookup across all tenants, used to classify foreign scope entries.
#[derive(Debug, Clone, Default)]
pub struct PointDirectory {
    owners: HashMap<PointId, CustomerId>,
}

impl PointDirectory {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a RegistrationPoint>) -> Self {
        let mut owners = HashMap::new();
        for record in records {
            owners.entry(record.id).or_insert(record.customer_id);
        }
        Self { owners }
    }

    pub fn insert(&mut self, id: PointId, owner: CustomerId) {
        self.owners.insert(id, owner);
    }

    pub fn owner_of(&self, id: PointId) -> Option<CustomerId> {
        self.owners.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Per-tenant build results of a mixed record set.
#[derive(Debug)]
pub struct ForestBuild {
    pub tenants: BTreeMap<CustomerId, DomainResult<TreeIndex>>,
    pub directory: PointDirectory,
}

/// Constructs validated `TreeIndex` forests from unordered records.
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    path_policy: PathPolicy,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path_policy(path_policy: PathPolicy) -> Self {
        Self { path_policy }
    }

    pub fn path_policy(&self) -> PathPolicy {
        self.path_policy
    }

    /// Build one tenant's forest. Records may arrive in any order.
    ///
    /// Fails with `MalformedPath` when a stored path did not decode, with `MissingParent`
    /// when a parent id does not resolve within the tenant and with `Cycle` when parent
    /// links never reach a root.
    #[instrument(level = "debug", skip(self, records), fields(records = records.len()))]
    pub fn build(
        &self,
        customer_id: CustomerId,
        records: Vec<RegistrationPoint>,
    ) -> TreeResult<TreeIndex> {
        let mut index = TreeIndex::new(customer_id);
        let mut links = Vec::with_capacity(records.len());

        // Pass 1: index by id
        for mut record in records {
            if let Some(raw) = record.malformed_path.take() {
                record.path = path::decode(&raw)?;
            }
            if record.customer_id != customer_id {
                return Err(DomainError::CrossTenant {
                    point: record.id,
                    customer: record.customer_id,
                    target: customer_id,
                });
            }
            links.push((record.id, record.parent_id));
            index.insert_unlinked(record)?;
        }
        links.sort_unstable();

        // Pass 2: link parent -> children, parents may have been seen after their children
        for &(id, parent) in &links {
            let Some(child_idx) = index.index_of(id) else {
                continue;
            };
            let parent_idx = match parent {
                Some(parent) => Some(index.index_of(parent).ok_or(DomainError::MissingParent {
                    point: id,
                    parent,
                    customer: customer_id,
                })?),
                None => None,
            };
            index.link(child_idx, parent_idx);
        }

        Self::check_acyclic(&links)?;

        let drift = self.validate_paths(&mut index)?;
        if !drift.is_empty() {
            warn!(
                "customer {}: {} stored path(s) disagree with parent links (policy: {})",
                customer_id,
                drift.len(),
                self.path_policy
            );
        }
        index.set_drift(drift);

        debug!(
            "customer {}: built {} points, {} roots, depth {}",
            customer_id,
            index.len(),
            index.roots().len(),
            index.depth()
        );
        Ok(index)
    }

    /// Partition a mixed record set by customer and build every tenant independently.
    #[instrument(level = "debug", skip(self, records), fields(records = records.len()))]
    pub fn build_all(&self, records: Vec<RegistrationPoint>) -> ForestBuild {
        let directory = PointDirectory::from_records(&records);

        let mut partitions: BTreeMap<CustomerId, Vec<RegistrationPoint>> = BTreeMap::new();
        for record in records {
            partitions.entry(record.customer_id).or_default().push(record);
        }

        let tenants: BTreeMap<CustomerId, DomainResult<TreeIndex>> = partitions
            .into_par_iter()
            .map(|(customer, records)| {
                let result = self.build(customer, records);
                if let Err(e) = &result {
                    warn!("customer {}: build failed: {}", customer, e);
                }
                (customer, result)
            })
            .collect();

        ForestBuild { tenants, directory }
    }

    /// Following parent links from every node must reach a root within |records| steps.
    fn check_acyclic(links: &[(PointId, Option<PointId>)]) -> TreeResult<()> {
        let parents: HashMap<PointId, Option<PointId>> = links.iter().copied().collect();
        let limit = links.len();
        let mut reaches_root: HashSet<PointId> = HashSet::new();

        for &(start, _) in links {
            let mut trail = Vec::new();
            let mut current = start;
            loop {
                if reaches_root.contains(&current) {
                    break;
                }
                if trail.len() > limit {
                    return Err(DomainError::Cycle(start));
                }
                trail.push(current);
                match parents.get(&current).copied().flatten() {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
            reaches_root.extend(trail);
        }
        Ok(())
    }

    /// Compare stored paths with the ones derived from parent links, top-down.
    fn validate_paths(&self, index: &mut TreeIndex) -> TreeResult<Vec<PathDrift>> {
        let mut drift = Vec::new();
        let mut derived_paths: Vec<(PointId, Vec<PointId>)> = Vec::with_capacity(index.len());

        let mut queue: VecDeque<_> = index.roots().iter().map(|&r| (r, Vec::new())).collect();
        while let Some((idx, derived)) = queue.pop_front() {
            let Some(node) = index.node(idx) else {
                continue;
            };
            let mut child_path = derived.clone();
            child_path.push(node.point.id);
            for &child in &node.children {
                queue.push_back((child, child_path.clone()));
            }
            if node.point.path != derived {
                if self.path_policy == PathPolicy::Strict {
                    return Err(DomainError::PathMismatch {
                        point: node.point.id,
                        stored: node.point.path.clone(),
                        derived,
                    });
                }
                drift.push(PathDrift {
                    point: node.point.id,
                    stored: node.point.path.clone(),
                    derived: derived.clone(),
                });
            }
            derived_paths.push((node.point.id, derived));
        }

        if self.path_policy == PathPolicy::Recompute {
            for (id, derived) in derived_paths {
                if let Some(point) = index.point_mut(id) {
                    point.path = derived;
                }
            }
        }
        drift.sort_by_key(|d| d.point);
        Ok(drift)
    }
}
