//! Cloud provider error types

use skyform_core::FlowError;
use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    /// The provider rejected or failed an operation on one resource
    #[error("{address}: {message}")]
    ProviderError {
        address: String,
        message: String,
        retryable: bool,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The document failed to load, validate or order
    #[error(transparent)]
    InvalidDocument(#[from] FlowError),

    /// A reference could not be resolved from recorded state
    #[error("{address}: {reference} has no recorded value")]
    UnresolvedValue { address: String, reference: String },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn provider(address: impl ToString, message: impl Into<String>) -> Self {
        CloudError::ProviderError {
            address: address.to_string(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Throttling, eventual consistency and similar transient failures
    pub fn transient(address: impl ToString, message: impl Into<String>) -> Self {
        CloudError::ProviderError {
            address: address.to_string(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CloudError::ProviderError {
                retryable: true,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
