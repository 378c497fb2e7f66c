//! In-memory `MatchBackend` used by the demo binary and the test suite.
//!
//! Matches, profiles, and threads live in process-local tables; thread
//! subscriptions are fanned out through a per-match broadcast channel.
//! Faults, latency, and disconnects can be injected to exercise rollback,
//! timeout, and reconnect paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;
use indexmap::IndexSet;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::time::sleep;
use uuid::Uuid;

use crate::model::{ChatMessage, MatchDetails, MatchId, MatchSnapshot, MessageId, NewMatch, UserId};

use super::{BackendError, BackendResult, MatchBackend, ThreadEvent, ThreadSubscription};

const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Backend call sites that can be primed to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// `fetch_match` calls.
    FetchMatch,
    /// `fetch_thread` calls.
    FetchThread,
    /// `join_match` calls.
    Join,
    /// `leave_match` calls.
    Leave,
    /// `send_message` calls.
    Send,
    /// `subscribe_thread` calls.
    Subscribe,
}

struct StoredMatch {
    details: MatchDetails,
    roster: IndexSet<UserId>,
    messages: Vec<ChatMessage>,
}

struct Inner {
    matches: DashMap<MatchId, StoredMatch>,
    profiles: DashMap<UserId, String>,
    channels: DashMap<MatchId, broadcast::Sender<ThreadEvent>>,
    faults: DashMap<FaultPoint, usize>,
    delays: DashMap<FaultPoint, Duration>,
    join_calls: AtomicUsize,
    name_lookups: AtomicUsize,
    event_capacity: usize,
}

impl Inner {
    /// Consume one primed fault for the call site, if any remain.
    fn take_fault(&self, point: FaultPoint) -> BackendResult<()> {
        if let Some(mut remaining) = self.faults.get_mut(&point) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::transient(format!(
                    "injected fault at {point:?}"
                )));
            }
        }
        Ok(())
    }

    /// Sleep through one primed delay for the call site, if any.
    async fn stall(&self, point: FaultPoint) {
        let delay = self.delays.remove(&point).map(|(_, delay)| delay);
        if let Some(delay) = delay {
            sleep(delay).await;
        }
    }

    fn channel(&self, match_id: MatchId) -> broadcast::Sender<ThreadEvent> {
        self.channels
            .entry(match_id)
            .or_insert_with(|| broadcast::channel(self.event_capacity).0)
            .clone()
    }

    fn display_name(&self, user_id: UserId) -> Option<String> {
        self.profiles.get(&user_id).map(|name| name.clone())
    }
}

/// In-process backend with injectable faults and forced disconnects.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    /// Create an empty backend with default channel capacity.
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create an empty backend with the given push channel capacity.
    pub fn with_event_capacity(event_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                matches: DashMap::new(),
                profiles: DashMap::new(),
                channels: DashMap::new(),
                faults: DashMap::new(),
                delays: DashMap::new(),
                join_calls: AtomicUsize::new(0),
                name_lookups: AtomicUsize::new(0),
                event_capacity,
            }),
        }
    }

    /// Register a user profile so display names resolve.
    pub fn register_profile(&self, user_id: UserId, display_name: impl Into<String>) {
        self.inner.profiles.insert(user_id, display_name.into());
    }

    /// Prime the next `count` calls at the given site to fail transiently.
    pub fn inject_fault(&self, point: FaultPoint, count: usize) {
        self.inner.faults.insert(point, count);
    }

    /// Prime the next call at the given site to stall for `delay` before
    /// proceeding.
    pub fn inject_delay(&self, point: FaultPoint, delay: Duration) {
        self.inner.delays.insert(point, delay);
    }

    /// Number of `join_match` calls that reached the backend.
    pub fn join_call_count(&self) -> usize {
        self.inner.join_calls.load(Ordering::SeqCst)
    }

    /// Number of `resolve_sender_name` calls that reached the backend.
    pub fn name_lookup_count(&self) -> usize {
        self.inner.name_lookups.load(Ordering::SeqCst)
    }

    /// Insert a message record as-is and push it to live subscribers.
    ///
    /// Unlike `send_message`, the caller controls id and timestamp; used to
    /// simulate inserts performed by other clients.
    pub fn push_message(&self, message: ChatMessage) {
        if let Some(mut stored) = self.inner.matches.get_mut(&message.match_id) {
            stored.messages.push(message.clone());
        }
        let _ = self
            .inner
            .channel(message.match_id)
            .send(ThreadEvent::Message(message));
    }

    /// Force a disconnect notification onto every live subscriber of the
    /// match's thread channel.
    pub fn disconnect_thread(&self, match_id: MatchId) {
        let _ = self.inner.channel(match_id).send(ThreadEvent::Disconnected);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchBackend for MemoryBackend {
    fn fetch_match(&self, match_id: MatchId) -> BoxFuture<'static, BackendResult<MatchSnapshot>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.stall(FaultPoint::FetchMatch).await;
            inner.take_fault(FaultPoint::FetchMatch)?;
            let stored = inner
                .matches
                .get(&match_id)
                .ok_or_else(|| BackendError::not_found(format!("match `{match_id}`")))?;
            Ok(MatchSnapshot {
                details: stored.details.clone(),
                roster: stored.roster.clone(),
            })
        })
    }

    fn fetch_thread(
        &self,
        match_id: MatchId,
    ) -> BoxFuture<'static, BackendResult<Vec<ChatMessage>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.stall(FaultPoint::FetchThread).await;
            inner.take_fault(FaultPoint::FetchThread)?;
            let stored = inner
                .matches
                .get(&match_id)
                .ok_or_else(|| BackendError::not_found(format!("match `{match_id}`")))?;
            // History reads join the profile table, like the production
            // backend's select with an embedded profile lookup.
            let messages = stored
                .messages
                .iter()
                .map(|message| ChatMessage {
                    sender_name: inner.display_name(message.sender_id),
                    ..message.clone()
                })
                .collect();
            Ok(messages)
        })
    }

    fn create_match(
        &self,
        new_match: NewMatch,
    ) -> BoxFuture<'static, BackendResult<MatchSnapshot>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let details = MatchDetails {
                id: Uuid::new_v4(),
                stadium_name: new_match.stadium_name,
                location: new_match.location,
                capacity: new_match.capacity,
                host_id: new_match.host_id,
                start_time: new_match.start_time,
            };
            // Hosting counts as joining: the host occupies the first slot.
            let mut roster = IndexSet::new();
            roster.insert(new_match.host_id);
            let snapshot = MatchSnapshot {
                details: details.clone(),
                roster: roster.clone(),
            };
            inner.matches.insert(
                details.id,
                StoredMatch {
                    details,
                    roster,
                    messages: Vec::new(),
                },
            );
            Ok(snapshot)
        })
    }

    fn join_match(
        &self,
        match_id: MatchId,
        user_id: UserId,
    ) -> BoxFuture<'static, BackendResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.join_calls.fetch_add(1, Ordering::SeqCst);
            inner.stall(FaultPoint::Join).await;
            inner.take_fault(FaultPoint::Join)?;
            let mut stored = inner
                .matches
                .get_mut(&match_id)
                .ok_or_else(|| BackendError::not_found(format!("match `{match_id}`")))?;
            if stored.roster.len() >= stored.details.capacity as usize
                && !stored.roster.contains(&user_id)
            {
                return Err(BackendError::transient("join rejected: match is full"));
            }
            stored.roster.insert(user_id);
            Ok(())
        })
    }

    fn leave_match(
        &self,
        match_id: MatchId,
        user_id: UserId,
    ) -> BoxFuture<'static, BackendResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.stall(FaultPoint::Leave).await;
            inner.take_fault(FaultPoint::Leave)?;
            let mut stored = inner
                .matches
                .get_mut(&match_id)
                .ok_or_else(|| BackendError::not_found(format!("match `{match_id}`")))?;
            stored.roster.shift_remove(&user_id);
            Ok(())
        })
    }

    fn send_message(
        &self,
        match_id: MatchId,
        sender_id: UserId,
        text: String,
    ) -> BoxFuture<'static, BackendResult<MessageId>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.stall(FaultPoint::Send).await;
            inner.take_fault(FaultPoint::Send)?;
            let message = {
                let mut stored = inner
                    .matches
                    .get_mut(&match_id)
                    .ok_or_else(|| BackendError::not_found(format!("match `{match_id}`")))?;
                let message = ChatMessage {
                    id: Uuid::new_v4(),
                    match_id,
                    sender_id,
                    text,
                    created_at: SystemTime::now(),
                    sender_name: None,
                };
                stored.messages.push(message.clone());
                message
            };
            let id = message.id;
            let _ = inner.channel(match_id).send(ThreadEvent::Message(message));
            Ok(id)
        })
    }

    fn resolve_sender_name(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'static, BackendResult<Option<String>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.name_lookups.fetch_add(1, Ordering::SeqCst);
            Ok(inner.display_name(user_id))
        })
    }

    fn subscribe_thread(
        &self,
        match_id: MatchId,
    ) -> BoxFuture<'static, BackendResult<ThreadSubscription>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.stall(FaultPoint::Subscribe).await;
            inner.take_fault(FaultPoint::Subscribe)?;
            if !inner.matches.contains_key(&match_id) {
                return Err(BackendError::not_found(format!("match `{match_id}`")));
            }

            let mut source = inner.channel(match_id).subscribe();
            let (tx, events) = mpsc::channel(inner.event_capacity);

            // Forwarder task: reads from the broadcast hub and pushes into
            // the subscriber's bounded channel until either side closes.
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tx.closed() => break,
                        received = source.recv() => match received {
                            Ok(event) => {
                                let disconnect = matches!(event, ThreadEvent::Disconnected);
                                if tx.send(event).await.is_err() || disconnect {
                                    break;
                                }
                            }
                            Err(RecvError::Closed) => {
                                let _ = tx.send(ThreadEvent::Disconnected).await;
                                break;
                            }
                            Err(RecvError::Lagged(_)) => {
                                // A gap in delivery is indistinguishable from a
                                // dropped channel to the subscriber.
                                let _ = tx.send(ThreadEvent::Disconnected).await;
                                break;
                            }
                        }
                    }
                }
            });

            Ok(ThreadSubscription::new(events))
        })
    }
}
