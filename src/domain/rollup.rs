//! Bottom-up aggregation of cost and weight metrics onto internal points.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, instrument, trace};

use crate::domain::ancestry::AncestorResolver;
use crate::domain::arena::TreeIndex;
use crate::domain::entities::{CustomerId, Metric, Metrics, PointId};
use crate::domain::error::{DomainError, DomainResult};

/// Aggregates computed for one tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct RollupResult {
    pub customer_id: CustomerId,
    /// Rolled-up metrics of every internal point.
    pub aggregates: BTreeMap<PointId, Metrics>,
    /// Tenant-wide leaf averages, the fallback for internal points whose children carry no value.
    pub leaf_averages: Metrics,
}

impl RollupResult {
    pub fn get(&self, id: PointId) -> Option<&Metrics> {
        self.aggregates.get(&id)
    }

    /// Write the aggregates onto the internal points of `index`. Leaves are left untouched.
    pub fn apply(&self, index: &mut TreeIndex) -> DomainResult<usize> {
        if index.customer_id() != self.customer_id {
            return Err(DomainError::RollupTenantMismatch {
                rollup: self.customer_id,
                tree: index.customer_id(),
            });
        }
        let mut written = 0;
        for (&id, metrics) in &self.aggregates {
            if index.is_leaf(id) {
                continue;
            }
            index.set_metrics(id, *metrics)?;
            written += 1;
        }
        Ok(written)
    }
}

/// Computes rollups. Pure: the result depends on leaf values only.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationEngine;

impl AggregationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Average children into parents, leaves first.
    ///
    /// Null child values are ignored. When every child of an internal point is null for a
    /// metric, the point gets the tenant-wide average of that metric over all leaves.
    /// Aborts with `BrokenPath` if any point's ancestor chain does not resolve.
    #[instrument(level = "debug", skip(self, index), fields(customer = index.customer_id()))]
    pub fn rollup(&self, index: &TreeIndex) -> DomainResult<RollupResult> {
        AncestorResolver::new(index).verify_all()?;

        let leaf_averages = Self::leaf_averages(index);
        let mut values: HashMap<PointId, Metrics> = HashMap::with_capacity(index.len());
        let mut aggregates = BTreeMap::new();

        for (_, node) in index.iter_postorder() {
            let id = node.point.id;
            if node.children.is_empty() {
                values.insert(id, node.point.metrics);
                continue;
            }

            let child_values: Vec<Metrics> = node
                .children
                .iter()
                .filter_map(|&c| index.node(c))
                .filter_map(|c| values.get(&c.point.id).copied())
                .collect();

            let mut rolled = Metrics::default();
            for metric in Metric::ALL {
                let value = average(child_values.iter().filter_map(|m| m.get(metric)))
                    .or_else(|| {
                        trace!("point {}: no child value for {:?}, using leaf average", id, metric);
                        leaf_averages.get(metric)
                    });
                rolled.set(metric, value);
            }
            values.insert(id, rolled);
            aggregates.insert(id, rolled);
        }

        debug!("rolled up {} internal points", aggregates.len());
        Ok(RollupResult {
            customer_id: index.customer_id(),
            aggregates,
            leaf_averages,
        })
    }

    fn leaf_averages(index: &TreeIndex) -> Metrics {
        let leaves = index.leaves();
        let mut averages = Metrics::default();
        for metric in Metric::ALL {
            averages.set(
                metric,
                average(leaves.iter().filter_map(|p| p.metrics.get(metric))),
            );
        }
        averages
    }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_no_values_when_averaging_then_none() {
        assert_eq!(average(std::iter::empty()), None);
    }

    #[test]
    fn given_values_when_averaging_then_mean() {
        assert_eq!(average([100.0, 200.0].into_iter()), Some(150.0));
    }
}
