//! Sandbox provider error types

use skyform_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("InvalidParameterValue: {0}")]
    InvalidParameter(String),

    #[error("MissingParameter: {0}")]
    MissingParameter(String),

    #[error("InvalidCidr: {0}")]
    InvalidCidr(String),

    #[error("InvalidSubnet.Range: {cidr} is not within {vpc_cidr}")]
    CidrOutsideVpc { cidr: String, vpc_cidr: String },

    #[error("InvalidSubnet.Conflict: {cidr} overlaps {existing}")]
    CidrConflict { cidr: String, existing: String },

    #[error("{kind}.NotFound: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("InvalidKeyPair.Duplicate: {0}")]
    DuplicateKeyPair(String),

    #[error("DependencyViolation: {id} is still used by {}", .dependents.join(", "))]
    DependencyViolation { id: String, dependents: Vec<String> },

    #[error("No image matched owners {owners:?} and the given filters")]
    NoMatchingImage { owners: Vec<String> },

    #[error("{0} images matched; set most_recent to pick one")]
    AmbiguousImage(usize),

    #[error("Unsupported resource type: {0}")]
    UnsupportedType(String),

    #[error("RequestLimitExceeded: {0}")]
    Throttled(String),

    #[error("Injected failure: {0}")]
    Injected(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SandboxError {
    /// Errors a caller may retry
    pub fn is_transient(&self) -> bool {
        matches!(self, SandboxError::Throttled(_))
    }

    /// Attach the resource address for the engine
    pub fn into_cloud(self, address: impl ToString) -> CloudError {
        if self.is_transient() {
            CloudError::transient(address, self.to_string())
        } else {
            CloudError::provider(address, self.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
