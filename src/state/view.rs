//! Pure projection of the synchronized state into the structure the
//! presentation layer renders, plus the hub that fans updated views out.

use std::time::SystemTime;

use futures::Stream;
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::model::{ChatMessage, GeoPoint, MatchDetails, MatchId, MatchStatus, MessageId, UserId};
use crate::state::roster::RosterState;
use crate::state::thread::ThreadState;

/// Display name used when a sender's profile cannot be resolved.
pub const UNKNOWN_SENDER: &str = "Unknown Player";

/// Rendered chat entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageView {
    /// Message id (local until the send is confirmed).
    pub id: MessageId,
    /// Sender id.
    pub sender_id: UserId,
    /// Resolved display name, or [`UNKNOWN_SENDER`].
    pub sender_name: String,
    /// Message body.
    pub text: String,
    /// Rfc3339 creation timestamp.
    pub sent_at: String,
    /// Whether the local user sent this message.
    pub mine: bool,
    /// Whether the message is still awaiting backend acknowledgment.
    pub pending: bool,
}

/// Snapshot handed to the presentation layer: one consistent merge of the
/// last backend snapshot, pending optimistic deltas, and streamed events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchView {
    /// Match identifier.
    pub match_id: MatchId,
    /// Venue name.
    pub stadium_name: String,
    /// Venue coordinate.
    pub location: GeoPoint,
    /// Derived occupancy status.
    pub status: MatchStatus,
    /// Number of players currently shown, pending deltas included.
    pub players: usize,
    /// Maximum number of players.
    pub capacity: u32,
    /// Whether the local user is in the displayed roster.
    pub joined: bool,
    /// Whether a roster mutation is awaiting confirmation.
    pub roster_pending: bool,
    /// Rfc3339 kickoff time.
    pub start_time: String,
    /// Displayed roster membership.
    pub roster: Vec<UserId>,
    /// Thread messages in rendering order, oldest first.
    pub messages: Vec<MessageView>,
}

/// Derive the renderable view from the current synchronized state.
///
/// Pure merge with no backend calls; re-deriving from unchanged inputs
/// yields a structurally equal view.
pub fn project(
    details: &MatchDetails,
    roster: &RosterState,
    thread: &ThreadState,
    local_user: Option<UserId>,
) -> MatchView {
    let members = roster.effective();
    let joined = local_user.is_some_and(|user_id| members.contains(&user_id));

    let mut messages: Vec<MessageView> = thread
        .messages()
        .iter()
        .map(|message| message_view(message, local_user, false))
        .collect();

    if let Some(pending) = thread.pending() {
        let key = pending.message.sort_key();
        let at = thread
            .messages()
            .partition_point(|existing| existing.sort_key() <= key);
        messages.insert(at, message_view(&pending.message, local_user, true));
    }

    MatchView {
        match_id: details.id,
        stadium_name: details.stadium_name.clone(),
        location: details.location,
        status: MatchStatus::derive(members.len(), roster.capacity()),
        players: members.len(),
        capacity: roster.capacity(),
        joined,
        roster_pending: roster.pending().is_some(),
        start_time: format_system_time(details.start_time),
        roster: members.into_iter().collect(),
        messages,
    }
}

fn message_view(message: &ChatMessage, local_user: Option<UserId>, pending: bool) -> MessageView {
    MessageView {
        id: message.id,
        sender_id: message.sender_id,
        sender_name: message
            .sender_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
        text: message.text.clone(),
        sent_at: format_system_time(message.created_at),
        mine: local_user == Some(message.sender_id),
        pending,
    }
}

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// Broadcast hub distributing recomputed views to presentation subscribers.
pub struct ViewHub {
    sender: broadcast::Sender<MatchView>,
}

impl ViewHub {
    /// Construct a hub backed by a broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a subscriber that will receive subsequent views.
    pub fn subscribe(&self) -> broadcast::Receiver<MatchView> {
        self.sender.subscribe()
    }

    /// Publish a view to all current subscribers, ignoring delivery errors.
    pub fn publish(&self, view: MatchView) {
        let _ = self.sender.send(view);
    }
}

/// Adapt a hub subscription into a stream of views, skipping entries lost
/// to subscriber lag; only the freshest view matters to a renderer.
pub fn view_stream(mut receiver: broadcast::Receiver<MatchView>) -> impl Stream<Item = MatchView> {
    async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(view) => yield view,
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "view subscriber lagged; dropping stale views");
                    continue;
                }
            }
        }
    }
}
