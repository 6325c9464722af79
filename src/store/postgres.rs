use anyhow::Context;
use axum::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::model::{Invitation, NewUser, Session, User};
use crate::store::{AuthStore, RegisterError};

/// Postgres-backed store. All auth tables live in one schema so the
/// invitation-consumption step can run as a single transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
        Ok(Self { pool })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[async_trait]
impl AuthStore for PgStore {
    async fn find_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, display_name, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, display_name, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, display_name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, display_name, password_hash, created_at
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> anyhow::Result<()> {
        // Sessions and unconsumed invitations go with the user (FK cascade).
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, artwork_token, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(&session.artwork_token)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(&self, token: &str) -> anyhow::Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT token, user_id, artwork_token, created_at, expires_at
            FROM sessions
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn find_session_by_artwork_token(
        &self,
        token: &str,
    ) -> anyhow::Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT token, user_id, artwork_token, created_at, expires_at
            FROM sessions
            WHERE artwork_token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn delete_session(&self, token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_invitation(&self, invitation: &Invitation) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invitations (token, created_by, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&invitation.token)
        .bind(invitation.created_by)
        .bind(invitation.created_at)
        .bind(invitation.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_invitation(&self, token: &str) -> anyhow::Result<Option<Invitation>> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT token, created_by, created_at, expires_at, consumed_by, consumed_at
            FROM invitations
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(invitation)
    }

    async fn revoke_invitation(&self, token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM invitations WHERE token = $1 AND consumed_by IS NULL")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn consume_invitation_and_create_user(
        &self,
        token: &str,
        now: OffsetDateTime,
        user: NewUser,
    ) -> Result<User, RegisterError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin registration transaction")?;

        // Precheck keeps error precedence sane (bad token reported before a
        // taken username); the UPDATE below is the authoritative gate.
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT token, created_by, created_at, expires_at, consumed_by, consumed_at
            FROM invitations
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await
        .context("load invitation")?;
        match invitation {
            Some(inv) if inv.is_usable(now) => {}
            _ => return Err(RegisterError::InvalidInvitation),
        }

        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, display_name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, display_name, password_hash, created_at
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegisterError::UsernameTaken
            } else {
                RegisterError::Store(anyhow::Error::new(e).context("insert user"))
            }
        })?;

        // Compare-and-set on the consumed flag: a concurrent registration
        // that won the race leaves zero rows here and we roll back.
        let consumed = sqlx::query(
            r#"
            UPDATE invitations
            SET consumed_by = $1, consumed_at = $2
            WHERE token = $3 AND consumed_by IS NULL AND expires_at >= $2
            "#,
        )
        .bind(created.id)
        .bind(now)
        .bind(token)
        .execute(&mut *tx)
        .await
        .context("consume invitation")?;
        if consumed.rows_affected() == 0 {
            return Err(RegisterError::InvalidInvitation);
        }

        tx.commit().await.context("commit registration")?;
        Ok(created)
    }
}
