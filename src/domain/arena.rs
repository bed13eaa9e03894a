//! Arena-based registration point forest for one tenant.

use std::collections::HashMap;

use generational_arena::{Arena, Index};
use tracing::{debug, instrument};

use crate::domain::entities::{CustomerId, Metrics, PointId, RegistrationPoint};
use crate::domain::error::{DomainError, DomainResult};

/// Tree node in the arena-based hierarchy structure.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Registration point stored at this node
    pub point: RegistrationPoint,
    /// Index of parent node in the arena, None for root nodes
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, ordered by point id
    pub children: Vec<Index>,
}

/// A stored path that disagrees with the path derived from parent links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDrift {
    pub point: PointId,
    pub stored: Vec<PointId>,
    pub derived: Vec<PointId>,
}

/// Id-indexed forest of one tenant's registration points.
///
/// Uses a generational arena for node storage and a hash map for O(1) id lookups.
/// Roots and children are kept sorted by id so traversals are deterministic.
#[derive(Debug, Clone)]
pub struct TreeIndex {
    customer_id: CustomerId,
    arena: Arena<TreeNode>,
    by_id: HashMap<PointId, Index>,
    roots: Vec<Index>,
    drift: Vec<PathDrift>,
}

impl TreeIndex {
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            arena: Arena::new(),
            by_id: HashMap::new(),
            roots: Vec::new(),
            drift: Vec::new(),
        }
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn contains(&self, id: PointId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn get(&self, id: PointId) -> Option<&RegistrationPoint> {
        self.by_id
            .get(&id)
            .and_then(|&idx| self.arena.get(idx))
            .map(|node| &node.point)
    }

    /// Like `get`, but fails with `PointNotFound`.
    pub fn point(&self, id: PointId) -> DomainResult<&RegistrationPoint> {
        self.get(id).ok_or(DomainError::PointNotFound(id))
    }

    pub fn node(&self, idx: Index) -> Option<&TreeNode> {
        self.arena.get(idx)
    }

    pub fn index_of(&self, id: PointId) -> Option<Index> {
        self.by_id.get(&id).copied()
    }

    pub fn roots(&self) -> &[Index] {
        &self.roots
    }

    /// Path drift found when the index was built.
    pub fn drift(&self) -> &[PathDrift] {
        &self.drift
    }

    pub fn is_leaf(&self, id: PointId) -> bool {
        self.index_of(id)
            .and_then(|idx| self.arena.get(idx))
            .map(|node| node.children.is_empty())
            .unwrap_or(false)
    }

    pub fn children_of(&self, id: PointId) -> Vec<&RegistrationPoint> {
        self.index_of(id)
            .and_then(|idx| self.arena.get(idx))
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|&c| self.arena.get(c))
                    .map(|c| &c.point)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All points in pre-order (roots first).
    pub fn points(&self) -> impl Iterator<Item = &RegistrationPoint> {
        self.iter().map(|(_, node)| &node.point)
    }

    /// All leaves (points without children) in pre-order.
    pub fn leaves(&self) -> Vec<&RegistrationPoint> {
        self.iter()
            .filter(|(_, node)| node.children.is_empty())
            .map(|(_, node)| &node.point)
            .collect()
    }

    /// The point and everything below it by parent links, in pre-order.
    pub fn subtree(&self, id: PointId) -> Vec<&RegistrationPoint> {
        let mut stack: Vec<Index> = self.index_of(id).into_iter().collect();
        let mut points = Vec::new();
        while let Some(current) = stack.pop() {
            let Some(node) = self.arena.get(current) else {
                continue;
            };
            points.push(&node.point);
            stack.extend(node.children.iter().rev().copied());
        }
        points
    }

    /// Records sorted by id, as handed back to storage.
    pub fn to_records(&self) -> Vec<RegistrationPoint> {
        let mut records: Vec<RegistrationPoint> = self.points().cloned().collect();
        records.sort_by_key(|p| p.id);
        records
    }

    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Number of levels of the deepest tree, 0 for an empty forest.
    pub fn depth(&self) -> usize {
        self.roots
            .iter()
            .map(|&root| self.calculate_depth(root))
            .max()
            .unwrap_or(0)
    }

    fn calculate_depth(&self, node_idx: Index) -> usize {
        if let Some(node) = self.arena.get(node_idx) {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// Ancestor ids derived by following parent links, root first.
    pub fn derived_path(&self, id: PointId) -> DomainResult<Vec<PointId>> {
        let mut idx = self.index_of(id).ok_or(DomainError::PointNotFound(id))?;
        let mut path = Vec::new();
        while let Some(parent) = self.arena.get(idx).and_then(|n| n.parent) {
            if path.len() > self.len() {
                return Err(DomainError::Cycle(id));
            }
            let parent_node = self
                .arena
                .get(parent)
                .ok_or(DomainError::PointNotFound(id))?;
            path.push(parent_node.point.id);
            idx = parent;
        }
        path.reverse();
        Ok(path)
    }

    // ------------------------------------------------------------------
    // construction, used by TreeBuilder
    // ------------------------------------------------------------------

    pub(crate) fn insert_unlinked(&mut self, point: RegistrationPoint) -> DomainResult<Index> {
        if self.by_id.contains_key(&point.id) {
            return Err(DomainError::DuplicatePoint(point.id));
        }
        let id = point.id;
        let idx = self.arena.insert(TreeNode {
            point,
            parent: None,
            children: Vec::new(),
        });
        self.by_id.insert(id, idx);
        Ok(idx)
    }

    pub(crate) fn link(&mut self, child: Index, parent: Option<Index>) {
        if let Some(node) = self.arena.get_mut(child) {
            node.parent = parent;
        }
        match parent {
            Some(p) => self.attach_child(p, child),
            None => self.attach_root(child),
        }
    }

    pub(crate) fn set_drift(&mut self, drift: Vec<PathDrift>) {
        self.drift = drift;
    }

    pub(crate) fn point_mut(&mut self, id: PointId) -> Option<&mut RegistrationPoint> {
        let idx = self.index_of(id)?;
        self.arena.get_mut(idx).map(|node| &mut node.point)
    }

    fn id_at(&self, idx: Index) -> PointId {
        self.arena.get(idx).map(|n| n.point.id).unwrap_or(PointId::MAX)
    }

    fn attach_child(&mut self, parent: Index, child: Index) {
        let child_id = self.id_at(child);
        let position = match self.arena.get(parent) {
            Some(node) => node
                .children
                .partition_point(|&c| self.id_at(c) < child_id),
            None => return,
        };
        if let Some(node) = self.arena.get_mut(parent) {
            node.children.insert(position, child);
        }
    }

    fn attach_root(&mut self, root: Index) {
        let root_id = self.id_at(root);
        let position = self.roots.partition_point(|&r| self.id_at(r) < root_id);
        self.roots.insert(position, root);
    }

    fn detach(&mut self, idx: Index) {
        let parent = self.arena.get(idx).and_then(|n| n.parent);
        match parent {
            Some(p) => {
                if let Some(node) = self.arena.get_mut(p) {
                    node.children.retain(|&c| c != idx);
                }
            }
            None => self.roots.retain(|&r| r != idx),
        }
    }

    // ------------------------------------------------------------------
    // incremental mutation
    // ------------------------------------------------------------------

    /// Insert a new point. Its path is computed from the parent, the stored one is ignored.
    #[instrument(level = "debug", skip(self, point), fields(id = point.id))]
    pub fn insert(&mut self, mut point: RegistrationPoint) -> DomainResult<()> {
        if self.contains(point.id) {
            return Err(DomainError::DuplicatePoint(point.id));
        }
        if point.customer_id != self.customer_id {
            return Err(DomainError::CrossTenant {
                point: point.id,
                customer: point.customer_id,
                target: self.customer_id,
            });
        }
        let parent_idx = match point.parent_id {
            Some(parent) => {
                let idx = self.index_of(parent).ok_or(DomainError::MissingParent {
                    point: point.id,
                    parent,
                    customer: self.customer_id,
                })?;
                let mut path = self.derived_path(parent)?;
                path.push(parent);
                point.path = path;
                Some(idx)
            }
            None => {
                point.path = Vec::new();
                None
            }
        };
        let idx = self.insert_unlinked(point)?;
        self.link(idx, parent_idx);
        Ok(())
    }

    /// Move a point (with its subtree) under `new_parent`, or make it a root.
    ///
    /// Everything is validated before the first change, so on error the index is unchanged.
    /// Returns the ids whose path was rewritten: the point and all of its descendants.
    #[instrument(level = "debug", skip(self))]
    pub fn reparent(&mut self, id: PointId, new_parent: Option<PointId>) -> DomainResult<Vec<PointId>> {
        let idx = self.index_of(id).ok_or(DomainError::PointNotFound(id))?;

        let (parent_idx, base_path) = match new_parent {
            Some(parent) => {
                if parent == id {
                    return Err(DomainError::Cycle(id));
                }
                let parent_idx = self.index_of(parent).ok_or(DomainError::MissingParent {
                    point: id,
                    parent,
                    customer: self.customer_id,
                })?;
                // walking up from the new parent must not pass through the moved node
                let mut cursor = Some(parent_idx);
                while let Some(c) = cursor {
                    if c == idx {
                        return Err(DomainError::Cycle(id));
                    }
                    cursor = self.arena.get(c).and_then(|n| n.parent);
                }
                let mut path = self.derived_path(parent)?;
                path.push(parent);
                (Some(parent_idx), path)
            }
            None => (None, Vec::new()),
        };

        self.detach(idx);
        if let Some(node) = self.arena.get_mut(idx) {
            node.point.parent_id = new_parent;
        }
        self.link(idx, parent_idx);

        // rewrite paths top-down for the whole subtree
        let mut rewritten = Vec::new();
        let mut stack = vec![(idx, base_path)];
        while let Some((current, path)) = stack.pop() {
            let Some(node) = self.arena.get_mut(current) else {
                continue;
            };
            node.point.path = path.clone();
            rewritten.push(node.point.id);
            let mut child_path = path;
            child_path.push(node.point.id);
            for &child in node.children.iter().rev() {
                stack.push((child, child_path.clone()));
            }
        }
        self.drift.retain(|d| !rewritten.contains(&d.point));
        debug!("reparented {} -> {:?}, {} paths rewritten", id, new_parent, rewritten.len());
        Ok(rewritten)
    }

    pub fn set_metrics(&mut self, id: PointId, metrics: Metrics) -> DomainResult<()> {
        let point = self.point_mut(id).ok_or(DomainError::PointNotFound(id))?;
        point.metrics = metrics;
        Ok(())
    }

    pub fn set_active(&mut self, id: PointId, active: bool) -> DomainResult<()> {
        let point = self.point_mut(id).ok_or(DomainError::PointNotFound(id))?;
        point.active = active;
        Ok(())
    }
}

/// Pre-order iterator over the whole forest.
pub struct TreeIterator<'a> {
    index: &'a TreeIndex,
    stack: Vec<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(index: &'a TreeIndex) -> Self {
        let stack = index.roots.iter().rev().copied().collect();
        Self { index, stack }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.index.node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

/// Post-order iterator: every child is yielded before its parent.
pub struct PostOrderIterator<'a> {
    index: &'a TreeIndex,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(index: &'a TreeIndex) -> Self {
        let stack = index.roots.iter().rev().map(|&r| (r, false)).collect();
        Self { index, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.index.node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}
