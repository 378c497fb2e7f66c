use std::sync::Arc;

use tracing::info;
use validator::Validate;

use crate::{
    backend::MatchBackend,
    error::SyncError,
    model::{CreateMatchRequest, MatchSnapshot, NewMatch},
    session::SessionContext,
    state::{MatchView, RosterOp, SharedSession},
};

/// Validate a hosting request and create the match on the backend.
///
/// The hosting user is placed in the roster by the backend; the returned
/// snapshot already reflects that.
pub async fn host_match(
    backend: &Arc<dyn MatchBackend>,
    session: &SessionContext,
    request: CreateMatchRequest,
) -> Result<MatchSnapshot, SyncError> {
    let host_id = session.current_user_id().ok_or(SyncError::SignedOut)?;
    request.validate()?;

    let new_match = NewMatch {
        stadium_name: request.stadium_name,
        capacity: request.max_players,
        location: request.location,
        host_id,
        start_time: request.start_time,
    };
    let snapshot = backend.create_match(new_match).await?;
    info!(match_id = %snapshot.details.id, %host_id, "hosted a new match");
    Ok(snapshot)
}

/// Optimistically add the signed-in user to the roster, then confirm the
/// join with the backend.
///
/// Local preconditions (already joined, match full, identical operation
/// pending) fail before the backend is contacted.
pub async fn join_match(session: &SharedSession) -> Result<MatchView, SyncError> {
    session.require_loaded().await?;
    let user_id = session.current_user()?;

    let backend = session.backend();
    let match_id = session.match_id();
    session
        .run_roster_mutation(RosterOp::Join(user_id), move || async move {
            backend
                .join_match(match_id, user_id)
                .await
                .map_err(SyncError::from)
        })
        .await?;

    session.current_view().await.ok_or(SyncError::NotLoaded)
}

/// Optimistically remove the signed-in user from the roster, then confirm
/// the departure with the backend.
pub async fn leave_match(session: &SharedSession) -> Result<MatchView, SyncError> {
    session.require_loaded().await?;
    let user_id = session.current_user()?;

    let backend = session.backend();
    let match_id = session.match_id();
    session
        .run_roster_mutation(RosterOp::Leave(user_id), move || async move {
            backend
                .leave_match(match_id, user_id)
                .await
                .map_err(SyncError::from)
        })
        .await?;

    session.current_view().await.ok_or(SyncError::NotLoaded)
}
