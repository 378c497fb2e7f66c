//! Session identity: which user the client is currently signed in as.

use tokio::sync::watch;

use crate::model::UserId;

/// Explicitly passed session context with a single update entry point.
///
/// The current user id sits behind a watch channel so interested tasks are
/// notified whenever the session flips between signed-in and signed-out.
/// The sync core only reads this to gate access and to tell "mine" from
/// "others'" messages; authentication itself happens elsewhere.
#[derive(Debug)]
pub struct SessionContext {
    user: watch::Sender<Option<UserId>>,
}

impl SessionContext {
    /// Start signed out.
    pub fn new() -> Self {
        let (user, _) = watch::channel(None);
        Self { user }
    }

    /// Start with an established session.
    pub fn signed_in(user_id: UserId) -> Self {
        let (user, _) = watch::channel(Some(user_id));
        Self { user }
    }

    /// Replace the session user and notify watchers.
    pub fn sign_in(&self, user_id: UserId) {
        self.user.send_replace(Some(user_id));
    }

    /// Clear the session and notify watchers.
    pub fn sign_out(&self) {
        self.user.send_replace(None);
    }

    /// Current user id, if signed in.
    pub fn current_user_id(&self) -> Option<UserId> {
        *self.user.borrow()
    }

    /// Subscribe to session changes.
    pub fn watch(&self) -> watch::Receiver<Option<UserId>> {
        self.user.subscribe()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
