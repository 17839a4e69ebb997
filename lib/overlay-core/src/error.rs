use thiserror::Error;

use crate::subnet::AddressFamily;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid subnet {range}: {reason}")]
    InvalidSubnet { range: String, reason: String },

    #[error("{0} range exhausted. Re-furbish the subnet, or mask.")]
    RangeExhausted(AddressFamily),

    #[error("NetBinding not found: {0}")]
    BindingNotFound(String),

    #[error("Invalid object: {0}")]
    InvalidObject(String),

    #[error("NetBindings may not be {0}")]
    Unsupported(&'static str),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Kubernetes error: {0}")]
    KubernetesError(#[from] kube::error::Error),
}

impl CoreError {
    /// HTTP status code matching this error when surfaced through the REST adapter
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::BindingNotFound(_) => 404,
            CoreError::InvalidObject(_) | CoreError::InvalidSubnet { .. } => 400,
            CoreError::Unsupported(_) => 405,
            _ => 500,
        }
    }
}
