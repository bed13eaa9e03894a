//! Subtree membership. Point predicates read the materialized path, `descendants` walks parent links.

use crate::domain::arena::TreeIndex;
use crate::domain::entities::{PointId, RegistrationPoint};

/// True iff `candidate` is on `node`'s path or is `node` itself.
pub fn is_ancestor(node: &RegistrationPoint, candidate: &RegistrationPoint) -> bool {
    is_ancestor_id(node, candidate.id)
}

/// Id form of `is_ancestor`.
pub fn is_ancestor_id(node: &RegistrationPoint, candidate: PointId) -> bool {
    node.id == candidate || node.path.contains(&candidate)
}

/// True iff both points hang below the same root.
pub fn same_tree(a: &RegistrationPoint, b: &RegistrationPoint) -> bool {
    tree_root(a) == tree_root(b)
}

/// First path element, or the point's own id for a root.
pub fn tree_root(point: &RegistrationPoint) -> PointId {
    point.path.first().copied().unwrap_or(point.id)
}

/// Strict descendants of `id` by parent links, in pre-order.
pub fn descendants(index: &TreeIndex, id: PointId) -> Vec<&RegistrationPoint> {
    index.subtree(id).into_iter().skip(1).collect()
}
