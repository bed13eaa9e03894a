//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::{CustomerId, DomainError};

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("unknown customer: {0}")]
    TenantNotFound(CustomerId),

    #[error("customer {customer} is unhealthy: {reason}")]
    TenantUnhealthy { customer: CustomerId, reason: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("store error: {message}")]
    Store { message: String },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApplicationError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
