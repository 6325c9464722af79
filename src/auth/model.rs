use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

/// Fields for inserting a user. The id is generated by the caller so the
/// same shape works for seeding and for registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
}

/// One authenticated browser instance. The token is the sole credential
/// after login; the artwork token authorizes otherwise-unauthenticated
/// image fetches and shares the session's lifetime.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub artwork_token: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl Session {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }
}

/// Single-use registration capability. `consumed_by` is set at most once,
/// atomically with the creation of the user it names.
#[derive(Debug, Clone, FromRow)]
pub struct Invitation {
    pub token: String,
    pub created_by: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub consumed_by: Option<Uuid>,
    pub consumed_at: Option<OffsetDateTime>,
}

impl Invitation {
    pub fn is_usable(&self, now: OffsetDateTime) -> bool {
        self.consumed_by.is_none() && now <= self.expires_at
    }
}
