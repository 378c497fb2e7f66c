use thiserror::Error;
use validator::ValidationErrors;

use crate::backend::BackendError;
use crate::state::{roster, thread};

/// Errors surfaced to callers of the sync core's operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The backend reported the entity does not exist. Terminal; shown to
    /// the user without a retry offer.
    #[error("not found: {0}")]
    NotFound(String),
    /// The backend or network failed. Any optimistic change tied to the
    /// failed call has been rolled back; safe to retry.
    #[error("transient failure: {0}")]
    Transient(String),
    /// A local precondition failed; the backend was never contacted.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The roster has reached the match capacity.
    #[error("match is already full")]
    AlreadyFull,
    /// The local user is already in the roster.
    #[error("already joined this match")]
    AlreadyJoined,
    /// The local user is not in the roster.
    #[error("not a member of this match")]
    NotJoined,
    /// An identical operation is already awaiting confirmation.
    #[error("an identical operation is already pending")]
    AlreadyPending,
    /// No signed-in user in the session context.
    #[error("no signed-in user")]
    SignedOut,
    /// No snapshot has been installed for this match yet.
    #[error("match snapshot has not been loaded")]
    NotLoaded,
    /// The backend call did not settle within the configured timeout.
    /// The optimistic change has been rolled back.
    #[error("operation timed out")]
    Timeout,
    /// Internal bookkeeping mismatch between a plan and its resolution.
    #[error("sync state error: {0}")]
    Internal(String),
}

impl From<BackendError> for SyncError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound { entity } => SyncError::NotFound(entity),
            BackendError::Transient { message, .. } => SyncError::Transient(message),
        }
    }
}

impl From<ValidationErrors> for SyncError {
    fn from(err: ValidationErrors) -> Self {
        SyncError::InvalidInput(format!("validation failed: {err}"))
    }
}

impl From<roster::PlanError> for SyncError {
    fn from(err: roster::PlanError) -> Self {
        match err {
            roster::PlanError::AlreadyPending => SyncError::AlreadyPending,
            roster::PlanError::AlreadyFull => SyncError::AlreadyFull,
            roster::PlanError::AlreadyJoined => SyncError::AlreadyJoined,
            roster::PlanError::NotJoined => SyncError::NotJoined,
        }
    }
}

impl From<roster::ConfirmError> for SyncError {
    fn from(err: roster::ConfirmError) -> Self {
        SyncError::Internal(err.to_string())
    }
}

impl From<roster::RollbackError> for SyncError {
    fn from(err: roster::RollbackError) -> Self {
        SyncError::Internal(err.to_string())
    }
}

impl From<thread::SendPlanError> for SyncError {
    fn from(err: thread::SendPlanError) -> Self {
        match err {
            thread::SendPlanError::AlreadyPending => SyncError::AlreadyPending,
        }
    }
}

impl From<thread::SendResolveError> for SyncError {
    fn from(err: thread::SendResolveError) -> Self {
        SyncError::Internal(err.to_string())
    }
}

impl SyncError {
    /// Whether offering the user a retry makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_) | SyncError::Timeout)
    }
}
