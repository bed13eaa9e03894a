//! Domain layer: the registration point forest and the algorithms on it
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod ancestry;
pub mod arena;
pub mod builder;
pub mod cascade;
pub mod entities;
pub mod error;
pub mod membership;
pub mod path;
pub mod rollup;
pub mod scope;
pub mod tree_display;

pub use ancestry::AncestorResolver;
pub use arena::{PathDrift, TreeIndex, TreeNode};
pub use builder::{ForestBuild, PathPolicy, PointDirectory, TreeBuilder};
pub use cascade::{CascadeOutcome, CascadeSoftDeleter};
pub use entities::*;
pub use error::{DomainError, DomainResult, ScopeRejection};
pub use rollup::{AggregationEngine, RollupResult};
pub use scope::{DeletedPolicy, ScopeResolution, ScopeResolver};
pub use tree_display::TreeNodeConvert;
