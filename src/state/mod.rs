//! Shared synchronized state for one match room.

pub mod roster;
pub mod thread;
pub mod view;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    backend::MatchBackend,
    config::ClientConfig,
    error::SyncError,
    model::{ChatMessage, MatchDetails, MatchId, MatchSnapshot, MessageId, UserId},
    session::SessionContext,
};

pub use self::roster::{PendingOp, PlanId, RosterOp, RosterState};
pub use self::thread::{PendingSend, ThreadState};
pub use self::view::{MatchView, ViewHub, view_stream};

/// Shared handle to a match room's synchronized state.
pub type SharedSession = Arc<MatchSession>;

/// Default bound on how long an optimistic mutation may stay unresolved.
pub const DEFAULT_MUTATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Central state for one match room: confirmed snapshot, pending
/// optimistic deltas, merged stream events, and the view fan-out hub.
///
/// All mutations take a write lock on the affected sub-state, so no two
/// of them interleave into a torn roster or thread read. Roster and send
/// mutations are gated separately: a pending join never blocks a chat
/// send.
pub struct MatchSession {
    match_id: MatchId,
    backend: Arc<dyn MatchBackend>,
    session: Arc<SessionContext>,
    details: RwLock<Option<MatchDetails>>,
    roster: RwLock<RosterState>,
    thread: RwLock<ThreadState>,
    names: DashMap<UserId, Option<String>>,
    views: ViewHub,
    roster_gate: Mutex<()>,
    send_gate: Mutex<()>,
    generation: AtomicU64,
    mutation_timeout: Option<Duration>,
}

impl MatchSession {
    /// Construct the shared state for one match room, wrapped in an
    /// [`Arc`] so tasks can hold it cheaply.
    pub fn new(
        match_id: MatchId,
        backend: Arc<dyn MatchBackend>,
        session: Arc<SessionContext>,
        config: &ClientConfig,
    ) -> SharedSession {
        Arc::new(Self {
            match_id,
            backend,
            session,
            details: RwLock::new(None),
            roster: RwLock::new(RosterState::new(0)),
            thread: RwLock::new(ThreadState::new()),
            names: DashMap::new(),
            views: ViewHub::new(config.view_channel_capacity),
            roster_gate: Mutex::new(()),
            send_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
            mutation_timeout: Some(config.mutation_timeout),
        })
    }

    /// Identifier of the match this session tracks.
    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Handle to the backend collaborator.
    pub fn backend(&self) -> Arc<dyn MatchBackend> {
        self.backend.clone()
    }

    /// The session identity context.
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Current signed-in user, or [`SyncError::SignedOut`].
    pub fn current_user(&self) -> Result<UserId, SyncError> {
        self.session.current_user_id().ok_or(SyncError::SignedOut)
    }

    /// Fail unless a snapshot has been installed.
    pub async fn require_loaded(&self) -> Result<(), SyncError> {
        if self.details.read().await.is_some() {
            Ok(())
        } else {
            Err(SyncError::NotLoaded)
        }
    }

    /// Hub distributing recomputed views.
    pub fn views(&self) -> &ViewHub {
        &self.views
    }

    /// Subscribe to recomputed views.
    pub fn subscribe_views(&self) -> tokio::sync::broadcast::Receiver<MatchView> {
        self.views.subscribe()
    }

    /// Current subscription generation. Stream merges carry the generation
    /// they were subscribed under and are discarded once it moves on.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Advance the subscription generation, making any event still in
    /// flight for the previous one inert.
    pub fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Install a freshly fetched snapshot as the confirmed state and
    /// republish the view. Pending optimistic deltas survive.
    pub async fn install_snapshot(
        &self,
        snapshot: MatchSnapshot,
        history: Option<Vec<ChatMessage>>,
    ) {
        let capacity = snapshot.details.capacity;
        {
            let mut details = self.details.write().await;
            *details = Some(snapshot.details);
        }
        {
            let mut roster = self.roster.write().await;
            roster.replace(snapshot.roster, capacity);
        }
        if let Some(history) = history {
            let mut thread = self.thread.write().await;
            thread.replace(history);
        }
        self.publish_view().await;
    }

    /// Re-derive the view from current state without publishing it.
    /// `None` until a snapshot has been installed.
    pub async fn current_view(&self) -> Option<MatchView> {
        let details = self.details.read().await;
        let details = details.as_ref()?;
        let roster = self.roster.read().await;
        let thread = self.thread.read().await;
        Some(view::project(
            details,
            &roster,
            &thread,
            self.session.current_user_id(),
        ))
    }

    /// Recompute the view and fan it out to subscribers.
    pub async fn publish_view(&self) -> Option<MatchView> {
        let view = self.current_view().await?;
        self.views.publish(view.clone());
        Some(view)
    }

    /// Resolve a sender's display name, caching the outcome for the
    /// session's lifetime so repeated events from the same sender do not
    /// trigger repeated lookups. Unknown profiles are cached too; only
    /// failed lookups are retried.
    pub async fn resolve_name(&self, user_id: UserId) -> String {
        if let Some(known) = self.names.get(&user_id) {
            return displayed(known.clone());
        }

        match self.backend.resolve_sender_name(user_id).await {
            Ok(resolved) => {
                self.names.insert(user_id, resolved.clone());
                displayed(resolved)
            }
            Err(err) => {
                debug!(%user_id, error = %err, "sender name lookup failed");
                view::UNKNOWN_SENDER.to_string()
            }
        }
    }

    /// Merge a streamed message into the thread, provided the event still
    /// belongs to the live subscription generation. Returns whether the
    /// message was inserted.
    pub async fn merge_streamed(&self, generation: u64, message: ChatMessage) -> bool {
        if self.generation() != generation {
            debug!(
                message_id = %message.id,
                "discarding stream event from a torn-down subscription"
            );
            return false;
        }

        let merged = {
            let mut thread = self.thread.write().await;
            thread.merge(message)
        };
        if merged {
            self.publish_view().await;
        }
        merged
    }

    /// Run an optimistic roster mutation: apply the delta locally, await
    /// the backend confirmation produced by `work`, then fold the delta in
    /// on success or drop it on failure or timeout.
    ///
    /// At most one roster mutation may be in flight; a concurrent caller
    /// is rejected with [`SyncError::AlreadyPending`] rather than queued.
    pub async fn run_roster_mutation<F, Fut>(&self, op: RosterOp, work: F) -> Result<(), SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), SyncError>>,
    {
        let gate = self
            .roster_gate
            .try_lock()
            .map_err(|_| SyncError::AlreadyPending)?;
        let pending = {
            let mut roster = self.roster.write().await;
            roster.plan(op)?
        };
        // The delta is visible before the round trip completes.
        self.publish_view().await;

        let work_future = work();
        let outcome = if let Some(limit) = self.mutation_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    self.rollback_roster(pending.id).await;
                    drop(gate);
                    return Err(SyncError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(()) => {
                {
                    let mut roster = self.roster.write().await;
                    roster.confirm(pending.id)?;
                }
                drop(gate);
                self.publish_view().await;
                Ok(())
            }
            Err(err) => {
                self.rollback_roster(pending.id).await;
                drop(gate);
                Err(err)
            }
        }
    }

    /// Run an optimistic message send: append locally under a temporary
    /// id, await the backend-assigned id produced by `work`, then promote
    /// the message on success or remove it on failure or timeout.
    ///
    /// At most one send may be in flight; a concurrent caller is rejected
    /// with [`SyncError::AlreadyPending`] rather than queued.
    pub async fn run_send_mutation<F, Fut>(
        &self,
        message: ChatMessage,
        work: F,
    ) -> Result<(), SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MessageId, SyncError>>,
    {
        let gate = self
            .send_gate
            .try_lock()
            .map_err(|_| SyncError::AlreadyPending)?;
        let pending = {
            let mut thread = self.thread.write().await;
            thread.plan_send(message)?
        };
        self.publish_view().await;

        let work_future = work();
        let outcome = if let Some(limit) = self.mutation_timeout {
            match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    self.abort_send(pending.local_id).await;
                    drop(gate);
                    return Err(SyncError::Timeout);
                }
            }
        } else {
            work_future.await
        };

        match outcome {
            Ok(assigned_id) => {
                {
                    let mut thread = self.thread.write().await;
                    thread.confirm_send(pending.local_id, assigned_id)?;
                }
                drop(gate);
                self.publish_view().await;
                Ok(())
            }
            Err(err) => {
                self.abort_send(pending.local_id).await;
                drop(gate);
                Err(err)
            }
        }
    }

    async fn rollback_roster(&self, plan_id: PlanId) {
        {
            let mut roster = self.roster.write().await;
            if let Err(rollback_err) = roster.rollback(plan_id) {
                warn!(
                    %plan_id,
                    error = %rollback_err,
                    "failed to roll back roster operation"
                );
            }
        }
        self.publish_view().await;
    }

    async fn abort_send(&self, local_id: MessageId) {
        {
            let mut thread = self.thread.write().await;
            if let Err(abort_err) = thread.abort_send(local_id) {
                warn!(
                    %local_id,
                    error = %abort_err,
                    "failed to roll back pending message send"
                );
            }
        }
        self.publish_view().await;
    }
}

fn displayed(name: Option<String>) -> String {
    name.unwrap_or_else(|| view::UNKNOWN_SENDER.to_string())
}
