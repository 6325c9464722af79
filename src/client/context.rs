use tokio::sync::watch;

use crate::auth::dto::PublicUser;

/// Snapshot of the client's authentication state. The epoch bumps on every
/// transition so in-flight work can tell whether the state it captured is
/// still the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub user: Option<PublicUser>,
    pub artwork_token: Option<String>,
    pub epoch: u64,
}

impl AuthSnapshot {
    fn anonymous() -> Self {
        Self {
            user: None,
            artwork_token: None,
            epoch: 0,
        }
    }
}

/// Process-wide authentication state: the single source of truth for
/// "am I logged in" on the client. One instance per running client,
/// passed explicitly to whatever needs it.
pub struct AuthContext {
    tx: watch::Sender<AuthSnapshot>,
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthContext {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthSnapshot::anonymous());
        Self { tx }
    }

    pub fn current_user(&self) -> Option<PublicUser> {
        self.tx.borrow().user.clone()
    }

    pub fn artwork_token(&self) -> Option<String> {
        self.tx.borrow().artwork_token.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.tx.borrow().epoch
    }

    /// Reactive subscription; receivers see every state transition.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.tx.subscribe()
    }

    pub fn store_login(&self, user: PublicUser, artwork_token: String) {
        self.tx.send_modify(|snapshot| {
            snapshot.user = Some(user);
            snapshot.artwork_token = Some(artwork_token);
            snapshot.epoch += 1;
        });
    }

    /// Forces the logged-out state. Called on explicit logout and whenever
    /// the server reports the session is gone; an auth failure always wins
    /// over any success still in flight.
    pub fn clear(&self) {
        self.tx.send_modify(|snapshot| {
            snapshot.user = None;
            snapshot.artwork_token = None;
            snapshot.epoch += 1;
        });
    }

    /// True when no transition happened since `observed_epoch` was read.
    /// Callers gate UI-affecting effects on this so a stale success
    /// arriving after a logout is simply dropped.
    pub fn is_current(&self, observed_epoch: u64) -> bool {
        self.epoch() == observed_epoch
    }
}

/// Where the client goes when authentication is lost. The UI layer
/// provides the real implementation.
pub trait Navigator: Send + Sync {
    fn navigate_to_login(&self);
}
