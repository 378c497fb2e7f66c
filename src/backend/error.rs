use std::error::Error;

use thiserror::Error;

/// Result alias for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Error raised by the backend boundary regardless of the underlying SDK.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The requested entity does not exist. Terminal; retrying cannot help.
    #[error("not found: {entity}")]
    NotFound {
        /// Human-readable description of the missing entity.
        entity: String,
    },
    /// Network or backend hiccup. Safe to retry.
    #[error("transient backend failure: {message}")]
    Transient {
        /// Human-readable failure description.
        message: String,
        /// Underlying SDK error, when one exists.
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
}

impl BackendError {
    /// Construct a not-found error for the described entity.
    pub fn not_found(entity: impl Into<String>) -> Self {
        BackendError::NotFound {
            entity: entity.into(),
        }
    }

    /// Construct a transient error with no underlying source.
    pub fn transient(message: impl Into<String>) -> Self {
        BackendError::Transient {
            message: message.into(),
            source: None,
        }
    }

    /// Construct a transient error from any backend failure.
    pub fn transient_with(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        BackendError::Transient {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Whether a retry of the failed call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient { .. })
    }
}
