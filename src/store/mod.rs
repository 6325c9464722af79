use axum::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::model::{Invitation, NewUser, Session, User};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Failure modes of the atomic consume-invitation-and-create-user step.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("invitation is invalid, expired or already used")]
    InvalidInvitation,
    #[error("username is already taken")]
    UsernameTaken,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Durable storage behind the auth subsystem. Implementations must make
/// `consume_invitation_and_create_user` atomic: of N concurrent calls with
/// the same token exactly one may succeed, and a user is never created
/// without its invitation being consumed in the same step (or vice versa).
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn insert_user(&self, user: NewUser) -> anyhow::Result<User>;
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()>;
    /// Deletes the user, its sessions and its unconsumed invitations.
    async fn delete_user(&self, id: Uuid) -> anyhow::Result<()>;

    async fn insert_session(&self, session: &Session) -> anyhow::Result<()>;
    async fn find_session(&self, token: &str) -> anyhow::Result<Option<Session>>;
    async fn find_session_by_artwork_token(&self, token: &str)
        -> anyhow::Result<Option<Session>>;
    async fn delete_session(&self, token: &str) -> anyhow::Result<()>;
    async fn delete_sessions_for_user(&self, user_id: Uuid) -> anyhow::Result<u64>;
    /// Storage hygiene only; correctness never depends on when this runs.
    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> anyhow::Result<u64>;

    async fn insert_invitation(&self, invitation: &Invitation) -> anyhow::Result<()>;
    async fn find_invitation(&self, token: &str) -> anyhow::Result<Option<Invitation>>;
    async fn revoke_invitation(&self, token: &str) -> anyhow::Result<()>;
    async fn consume_invitation_and_create_user(
        &self,
        token: &str,
        now: OffsetDateTime,
        user: NewUser,
    ) -> Result<User, RegisterError>;
}
