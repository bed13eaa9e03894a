//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on the `PointStore` boundary trait but are themselves
//! concrete structs, not traits.

mod registry;
mod report;

pub use registry::{
    AggregateView, LoadReport, RegistryService, RollupStatus, TenantHealth,
};
pub use report::{Report, ReportService};
