use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    error::SyncError,
    model::ChatMessage,
    state::{MatchView, SharedSession},
};

/// Optimistically append a chat message under a temporary local id, then
/// send it and promote the record to the backend-assigned id.
///
/// Blank or whitespace-only text is rejected before anything is sent or
/// rendered.
pub async fn send_message(session: &SharedSession, text: &str) -> Result<MatchView, SyncError> {
    session.require_loaded().await?;
    let sender_id = session.current_user()?;

    let text = text.trim();
    if text.is_empty() {
        return Err(SyncError::InvalidInput(
            "message text must not be empty".to_string(),
        ));
    }

    let message = ChatMessage {
        id: Uuid::new_v4(),
        match_id: session.match_id(),
        sender_id,
        text: text.to_string(),
        created_at: SystemTime::now(),
        sender_name: None,
    };

    let backend = session.backend();
    let match_id = session.match_id();
    let body = message.text.clone();
    session
        .run_send_mutation(message, move || async move {
            backend
                .send_message(match_id, sender_id, body)
                .await
                .map_err(SyncError::from)
        })
        .await?;

    session.current_view().await.ok_or(SyncError::NotLoaded)
}
