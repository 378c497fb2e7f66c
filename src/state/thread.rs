use std::collections::HashSet;
use std::time::Instant;

use thiserror::Error;

use crate::model::{ChatMessage, MessageId};

/// Errors that can occur when planning an optimistic send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendPlanError {
    /// A message send is already in flight and must resolve first.
    #[error("a message send is already pending")]
    AlreadyPending,
}

/// Errors that can occur when resolving a pending send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendResolveError {
    /// No send is currently pending.
    #[error("no message send is pending")]
    NoPending,
    /// Local id does not match the pending send.
    #[error("pending send does not match (expected {expected}, got {got})")]
    IdMismatch {
        /// Local id of the actual pending send.
        expected: MessageId,
        /// Provided local id.
        got: MessageId,
    },
}

/// A locally-appended message awaiting backend acknowledgment.
#[derive(Debug, Clone)]
pub struct PendingSend {
    /// Local-only id assigned before confirmation.
    pub local_id: MessageId,
    /// The optimistically appended message, carrying the local id.
    pub message: ChatMessage,
    /// Timestamp when the send was planned.
    pub pending_since: Instant,
}

/// Ordered chat thread: merged confirmed/streamed messages plus at most
/// one pending optimistic send.
///
/// Messages are kept sorted by (creation time, id) and deduplicated by id,
/// so a merge is idempotent regardless of whether the same record arrives
/// from a snapshot refetch or the push channel.
#[derive(Debug, Default)]
pub struct ThreadState {
    messages: Vec<ChatMessage>,
    known_ids: HashSet<MessageId>,
    pending: Option<PendingSend>,
}

impl ThreadState {
    /// Create an empty thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the merged history with a freshly fetched snapshot.
    ///
    /// A pending send survives the replacement; it resolves independently
    /// of snapshot reads.
    pub fn replace(&mut self, mut history: Vec<ChatMessage>) {
        history.sort_by_key(ChatMessage::sort_key);
        history.dedup_by_key(|message| message.id);
        self.known_ids = history.iter().map(|message| message.id).collect();
        self.messages = history;
    }

    /// Merged messages in rendering order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The in-flight send, if any.
    pub fn pending(&self) -> Option<&PendingSend> {
        self.pending.as_ref()
    }

    /// Whether a message with this id is already merged.
    pub fn contains(&self, id: MessageId) -> bool {
        self.known_ids.contains(&id)
    }

    /// Merge one message in creation-timestamp order, discarding
    /// duplicates by id. Returns whether the message was inserted.
    pub fn merge(&mut self, message: ChatMessage) -> bool {
        if !self.known_ids.insert(message.id) {
            return false;
        }

        let key = message.sort_key();
        let at = self
            .messages
            .partition_point(|existing| existing.sort_key() <= key);
        self.messages.insert(at, message);
        true
    }

    /// Record an optimistic send; the message keeps its local id until the
    /// backend acknowledges and assigns the permanent one.
    pub fn plan_send(&mut self, message: ChatMessage) -> Result<PendingSend, SendPlanError> {
        if self.pending.is_some() {
            return Err(SendPlanError::AlreadyPending);
        }

        let pending = PendingSend {
            local_id: message.id,
            message,
            pending_since: Instant::now(),
        };
        self.pending = Some(pending.clone());

        Ok(pending)
    }

    /// Promote the pending send into the merged history under its
    /// backend-assigned id.
    pub fn confirm_send(
        &mut self,
        local_id: MessageId,
        assigned_id: MessageId,
    ) -> Result<ChatMessage, SendResolveError> {
        let pending = self.pending.take().ok_or(SendResolveError::NoPending)?;

        if pending.local_id != local_id {
            let expected = pending.local_id;
            self.pending = Some(pending);
            return Err(SendResolveError::IdMismatch {
                expected,
                got: local_id,
            });
        }

        let mut message = pending.message;
        message.id = assigned_id;
        // A snapshot refetch may already have delivered the confirmed
        // record; merge handles the duplicate.
        self.merge(message.clone());

        Ok(message)
    }

    /// Drop the pending send; the merged history was never touched.
    pub fn abort_send(&mut self, local_id: MessageId) -> Result<(), SendResolveError> {
        let pending = self.pending.as_ref().ok_or(SendResolveError::NoPending)?;

        if pending.local_id != local_id {
            return Err(SendResolveError::IdMismatch {
                expected: pending.local_id,
                got: local_id,
            });
        }

        self.pending = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use uuid::Uuid;

    use super::*;

    fn message_at(seconds: u64, text: &str) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            match_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            text: text.to_string(),
            created_at: SystemTime::UNIX_EPOCH + Duration::from_secs(seconds),
            sender_name: None,
        }
    }

    #[test]
    fn merge_orders_by_creation_time_not_arrival() {
        let mut thread = ThreadState::new();
        let late = message_at(10, "late");
        let early = message_at(5, "early");

        assert!(thread.merge(late.clone()));
        assert!(thread.merge(early.clone()));

        let texts: Vec<_> = thread
            .messages()
            .iter()
            .map(|message| message.text.as_str())
            .collect();
        assert_eq!(texts, vec!["early", "late"]);
    }

    #[test]
    fn merge_discards_duplicate_ids() {
        let mut thread = ThreadState::new();
        let message = message_at(1, "hello");

        assert!(thread.merge(message.clone()));
        assert!(!thread.merge(message));
        assert_eq!(thread.messages().len(), 1);
    }

    #[test]
    fn equal_timestamps_break_ties_by_id() {
        let mut thread = ThreadState::new();
        let mut first = message_at(7, "a");
        let mut second = message_at(7, "b");
        first.id = Uuid::from_u128(1);
        second.id = Uuid::from_u128(2);

        thread.merge(second.clone());
        thread.merge(first.clone());

        assert_eq!(thread.messages()[0].id, first.id);
        assert_eq!(thread.messages()[1].id, second.id);
    }

    #[test]
    fn confirm_send_promotes_with_assigned_id() {
        let mut thread = ThreadState::new();
        let local = message_at(3, "mine");
        let assigned_id = Uuid::new_v4();

        let pending = thread.plan_send(local).unwrap();
        assert!(thread.messages().is_empty());

        let confirmed = thread.confirm_send(pending.local_id, assigned_id).unwrap();
        assert_eq!(confirmed.id, assigned_id);
        assert_eq!(thread.messages().len(), 1);
        assert!(thread.contains(assigned_id));
        assert!(thread.pending().is_none());
    }

    #[test]
    fn abort_send_removes_exactly_the_pending_message() {
        let mut thread = ThreadState::new();
        thread.merge(message_at(1, "existing"));

        let pending = thread.plan_send(message_at(2, "failed")).unwrap();
        thread.abort_send(pending.local_id).unwrap();

        assert_eq!(thread.messages().len(), 1);
        assert_eq!(thread.messages()[0].text, "existing");
        assert!(thread.pending().is_none());
    }

    #[test]
    fn second_send_while_pending_is_rejected() {
        let mut thread = ThreadState::new();
        let _pending = thread.plan_send(message_at(1, "first")).unwrap();

        assert_eq!(
            thread.plan_send(message_at(2, "second")).unwrap_err(),
            SendPlanError::AlreadyPending
        );
    }

    #[test]
    fn replace_keeps_pending_send() {
        let mut thread = ThreadState::new();
        let pending = thread.plan_send(message_at(9, "mine")).unwrap();

        thread.replace(vec![message_at(1, "history")]);
        assert_eq!(thread.messages().len(), 1);
        assert!(thread.pending().is_some());

        thread.confirm_send(pending.local_id, Uuid::new_v4()).unwrap();
        assert_eq!(thread.messages().len(), 2);
    }

    #[test]
    fn confirm_is_idempotent_against_refetched_record() {
        let mut thread = ThreadState::new();
        let local = message_at(4, "mine");
        let assigned_id = Uuid::new_v4();

        let pending = thread.plan_send(local.clone()).unwrap();

        // The refetched snapshot already contains the confirmed record.
        let mut confirmed = local.clone();
        confirmed.id = assigned_id;
        thread.replace(vec![confirmed]);

        thread.confirm_send(pending.local_id, assigned_id).unwrap();
        assert_eq!(thread.messages().len(), 1);
    }
}
