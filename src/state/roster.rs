use std::time::Instant;

use indexmap::IndexSet;
use thiserror::Error;
use uuid::Uuid;

use crate::model::UserId;

/// Roster mutations that can be applied optimistically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterOp {
    /// Insert the user into the roster.
    Join(UserId),
    /// Remove the user from the roster.
    Leave(UserId),
}

/// Errors that can occur when planning a roster mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A roster mutation is already in flight and must resolve first.
    #[error("a roster operation is already pending")]
    AlreadyPending,
    /// The roster has reached the match capacity.
    #[error("match is already full")]
    AlreadyFull,
    /// The user is already a member of the roster.
    #[error("user is already a member")]
    AlreadyJoined,
    /// The user is not a member of the roster.
    #[error("user is not a member")]
    NotJoined,
}

/// Errors that can occur when confirming a planned roster mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmError {
    /// No roster mutation is currently pending.
    #[error("no roster operation is pending")]
    NoPending,
    /// Plan id does not match the pending operation.
    #[error("pending roster operation does not match (expected {expected}, got {got})")]
    IdMismatch {
        /// Expected plan id.
        expected: PlanId,
        /// Provided plan id.
        got: PlanId,
    },
}

/// Errors that can occur when rolling back a planned roster mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollbackError {
    /// No roster mutation is currently pending.
    #[error("no roster operation is pending")]
    NoPending,
    /// Plan id does not match the pending operation.
    #[error("pending roster operation does not match (expected {expected}, got {got})")]
    IdMismatch {
        /// Expected plan id.
        expected: PlanId,
        /// Provided plan id.
        got: PlanId,
    },
}

/// Unique identifier for a planned roster mutation.
pub type PlanId = Uuid;

/// A validated optimistic roster mutation awaiting backend acknowledgment.
#[derive(Debug, Clone)]
pub struct PendingOp {
    /// Unique identifier for this operation.
    pub id: PlanId,
    /// The mutation being applied.
    pub op: RosterOp,
    /// Version number after this mutation is confirmed.
    pub version_next: usize,
    /// Timestamp when the mutation was planned.
    pub pending_since: Instant,
}

/// Confirmed roster plus at most one pending optimistic delta.
///
/// The confirmed set is only touched on `confirm` or snapshot replacement,
/// so rolling back a pending mutation is exact by construction: the delta
/// is dropped and nothing needs to be undone.
#[derive(Debug, Clone)]
pub struct RosterState {
    confirmed: IndexSet<UserId>,
    capacity: u32,
    version: usize,
    pending: Option<PendingOp>,
}

impl RosterState {
    /// Create an empty roster with the given capacity.
    pub fn new(capacity: u32) -> Self {
        Self {
            confirmed: IndexSet::new(),
            capacity,
            version: 0,
            pending: None,
        }
    }

    /// Replace the confirmed set and capacity from a fresh snapshot.
    ///
    /// A pending mutation survives the replacement; the projector keeps
    /// layering its delta until the backend call settles.
    pub fn replace(&mut self, confirmed: IndexSet<UserId>, capacity: u32) {
        self.confirmed = confirmed;
        self.capacity = capacity;
        self.version += 1;
    }

    /// Confirmed membership as last reported by the backend.
    pub fn confirmed(&self) -> &IndexSet<UserId> {
        &self.confirmed
    }

    /// Membership with the pending delta layered on top.
    pub fn effective(&self) -> IndexSet<UserId> {
        let mut members = self.confirmed.clone();
        match self.pending.as_ref().map(|pending| pending.op) {
            Some(RosterOp::Join(user_id)) => {
                members.insert(user_id);
            }
            Some(RosterOp::Leave(user_id)) => {
                members.shift_remove(&user_id);
            }
            None => {}
        }
        members
    }

    /// Whether the user appears in the effective membership.
    pub fn is_member(&self, user_id: UserId) -> bool {
        self.effective().contains(&user_id)
    }

    /// Match capacity as last reported by the backend.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Version number, incremented on every confirmed change.
    pub fn version(&self) -> usize {
        self.version
    }

    /// The in-flight mutation, if any.
    pub fn pending(&self) -> Option<&PendingOp> {
        self.pending.as_ref()
    }

    /// Plan a mutation: validate preconditions against the effective
    /// membership and record the optimistic delta.
    pub fn plan(&mut self, op: RosterOp) -> Result<PendingOp, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let members = self.effective();
        match op {
            RosterOp::Join(user_id) => {
                if members.contains(&user_id) {
                    return Err(PlanError::AlreadyJoined);
                }
                if members.len() >= self.capacity as usize {
                    return Err(PlanError::AlreadyFull);
                }
            }
            RosterOp::Leave(user_id) => {
                if !members.contains(&user_id) {
                    return Err(PlanError::NotJoined);
                }
            }
        }

        let pending = PendingOp {
            id: Uuid::new_v4(),
            op,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };
        self.pending = Some(pending.clone());

        Ok(pending)
    }

    /// Fold the pending delta into the confirmed set.
    ///
    /// Inserting an already-present id is a no-op; the set never holds
    /// duplicates regardless of how often a join is repeated.
    pub fn confirm(&mut self, plan_id: PlanId) -> Result<usize, ConfirmError> {
        let pending = self.pending.take().ok_or(ConfirmError::NoPending)?;

        if pending.id != plan_id {
            let expected = pending.id;
            self.pending = Some(pending);
            return Err(ConfirmError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        match pending.op {
            RosterOp::Join(user_id) => {
                self.confirmed.insert(user_id);
            }
            RosterOp::Leave(user_id) => {
                self.confirmed.shift_remove(&user_id);
            }
        }
        self.version = pending.version_next;

        Ok(self.confirmed.len())
    }

    /// Drop the pending delta without touching the confirmed set.
    pub fn rollback(&mut self, plan_id: PlanId) -> Result<(), RollbackError> {
        let pending = self.pending.as_ref().ok_or(RollbackError::NoPending)?;

        if pending.id != plan_id {
            return Err(RollbackError::IdMismatch {
                expected: pending.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }
}
