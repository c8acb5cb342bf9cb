use thiserror::Error;

use crate::domain::user::InvalidUserId;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Rejected before any side effect; never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Also returned for resources owned by someone else, so the two cases
    /// cannot be told apart.
    #[error("{0} not found")]
    NotFound(String),

    #[error("storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }
}

impl From<InvalidUserId> for ServiceError {
    fn from(err: InvalidUserId) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
