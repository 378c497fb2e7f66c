use crate::{
    error::SyncError,
    state::{MatchView, SharedSession},
};

/// Fetch the authoritative match and thread snapshots, install them as the
/// confirmed state, and return the republished view.
///
/// Empty rosters and empty threads are valid results, not errors.
pub async fn refresh(session: &SharedSession) -> Result<MatchView, SyncError> {
    let backend = session.backend();
    let snapshot = backend.fetch_match(session.match_id()).await?;
    let history = backend.fetch_thread(session.match_id()).await?;

    session.install_snapshot(snapshot, Some(history)).await;
    session.current_view().await.ok_or(SyncError::NotLoaded)
}

/// Fetch only the match snapshot (details plus roster), leaving the thread
/// untouched. Used when the chat view is not active.
pub async fn refresh_match(session: &SharedSession) -> Result<MatchView, SyncError> {
    let backend = session.backend();
    let snapshot = backend.fetch_match(session.match_id()).await?;

    session.install_snapshot(snapshot, None).await;
    session.current_view().await.ok_or(SyncError::NotLoaded)
}
