use std::collections::HashMap;

use axum::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::model::{Invitation, NewUser, Session, User};
use crate::store::{AuthStore, RegisterError};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    sessions: HashMap<String, Session>,
    invitations: HashMap<String, Invitation>,
}

/// In-memory store used by the test suites and `MEMORY_STORE=true`
/// deployments. A single mutex over all three maps gives the same
/// compare-and-set semantics the Postgres transaction provides.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let inner = self.inner.lock();
        Ok(inner
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.inner.lock().users.get(&id).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> anyhow::Result<User> {
        let mut inner = self.inner.lock();
        if inner.users.values().any(|u| u.username == user.username) {
            anyhow::bail!("username {:?} already exists", user.username);
        }
        let user = User {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            password_hash: user.password_hash,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("no user {id}"))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        inner.users.remove(&id);
        inner.sessions.retain(|_, s| s.user_id != id);
        inner
            .invitations
            .retain(|_, i| i.created_by != id && i.consumed_by != Some(id));
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> anyhow::Result<()> {
        self.inner
            .lock()
            .sessions
            .insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, token: &str) -> anyhow::Result<Option<Session>> {
        Ok(self.inner.lock().sessions.get(token).cloned())
    }

    async fn find_session_by_artwork_token(
        &self,
        token: &str,
    ) -> anyhow::Result<Option<Session>> {
        let inner = self.inner.lock();
        Ok(inner
            .sessions
            .values()
            .find(|s| s.artwork_token == token)
            .cloned())
    }

    async fn delete_session(&self, token: &str) -> anyhow::Result<()> {
        self.inner.lock().sessions.remove(token);
        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> anyhow::Result<u64> {
        let mut inner = self.inner.lock();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - inner.sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let mut inner = self.inner.lock();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - inner.sessions.len()) as u64)
    }

    async fn insert_invitation(&self, invitation: &Invitation) -> anyhow::Result<()> {
        self.inner
            .lock()
            .invitations
            .insert(invitation.token.clone(), invitation.clone());
        Ok(())
    }

    async fn find_invitation(&self, token: &str) -> anyhow::Result<Option<Invitation>> {
        Ok(self.inner.lock().invitations.get(token).cloned())
    }

    async fn revoke_invitation(&self, token: &str) -> anyhow::Result<()> {
        self.inner.lock().invitations.remove(token);
        Ok(())
    }

    async fn consume_invitation_and_create_user(
        &self,
        token: &str,
        now: OffsetDateTime,
        user: NewUser,
    ) -> Result<User, RegisterError> {
        // One lock held across check-consume-create makes the step atomic.
        let mut inner = self.inner.lock();

        let usable = inner
            .invitations
            .get(token)
            .map(|i| i.is_usable(now))
            .unwrap_or(false);
        if !usable {
            return Err(RegisterError::InvalidInvitation);
        }
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(RegisterError::UsernameTaken);
        }

        let user = User {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            password_hash: user.password_hash,
            created_at: now,
        };
        if let Some(invitation) = inner.invitations.get_mut(token) {
            invitation.consumed_by = Some(user.id);
            invitation.consumed_at = Some(now);
        }
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }
}
