//! Infrastructure layer: storage implementations and DI container
//!
//! This layer implements storage boundary traits and wires up services.

pub mod di;
pub mod error;
pub mod traits;

pub use error::{InfraError, InfraResult};
