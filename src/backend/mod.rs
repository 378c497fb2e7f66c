//! Boundary to the opaque managed backend: request/response calls plus a
//! subscribable push channel for chat threads.

pub mod error;
pub mod memory;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::model::{ChatMessage, MatchId, MatchSnapshot, MessageId, NewMatch, UserId};

pub use self::error::{BackendError, BackendResult};

/// A single event pushed on a thread subscription.
#[derive(Debug, Clone)]
pub enum ThreadEvent {
    /// A message was inserted into the subscribed thread.
    Message(ChatMessage),
    /// The push channel dropped; streamed delivery is no longer complete
    /// and the subscriber must re-fetch the snapshot before resuming.
    Disconnected,
}

/// Live subscription scoped to one match's chat thread.
///
/// Dropping the subscription unsubscribes: the backend stops delivering
/// events once the receiving half is closed.
pub struct ThreadSubscription {
    events: mpsc::Receiver<ThreadEvent>,
}

impl ThreadSubscription {
    /// Wrap the receiving half produced by a backend implementation.
    pub fn new(events: mpsc::Receiver<ThreadEvent>) -> Self {
        Self { events }
    }

    /// Receive the next pushed event, or `None` once the subscription has
    /// been closed by the backend.
    pub async fn next_event(&mut self) -> Option<ThreadEvent> {
        self.events.recv().await
    }
}

/// Abstraction over the managed backend consumed by the sync core.
///
/// Implementations adapt a concrete SDK; the core only assumes atomic
/// request/response calls and an at-least-once push channel.
pub trait MatchBackend: Send + Sync {
    /// Fetch the authoritative snapshot of a match (details plus roster).
    fn fetch_match(&self, match_id: MatchId) -> BoxFuture<'static, BackendResult<MatchSnapshot>>;

    /// Fetch the full ordered history of a match's chat thread.
    fn fetch_thread(&self, match_id: MatchId)
    -> BoxFuture<'static, BackendResult<Vec<ChatMessage>>>;

    /// Create a match hosted by the given user, returning its snapshot.
    fn create_match(&self, new_match: NewMatch)
    -> BoxFuture<'static, BackendResult<MatchSnapshot>>;

    /// Add a user to the match roster.
    fn join_match(&self, match_id: MatchId, user_id: UserId)
    -> BoxFuture<'static, BackendResult<()>>;

    /// Remove a user from the match roster.
    fn leave_match(
        &self,
        match_id: MatchId,
        user_id: UserId,
    ) -> BoxFuture<'static, BackendResult<()>>;

    /// Insert a chat message, returning the backend-assigned message id.
    fn send_message(
        &self,
        match_id: MatchId,
        sender_id: UserId,
        text: String,
    ) -> BoxFuture<'static, BackendResult<MessageId>>;

    /// Resolve a user's display name; `None` when the profile is unknown.
    fn resolve_sender_name(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'static, BackendResult<Option<String>>>;

    /// Open a push subscription for new messages in a match's thread.
    fn subscribe_thread(
        &self,
        match_id: MatchId,
    ) -> BoxFuture<'static, BackendResult<ThreadSubscription>>;
}
