use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::model::{Invitation, NewUser, Session, User};
use crate::auth::{password, token};
use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::store::AuthStore;

fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[a-z0-9_]{3,32}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

/// Orchestrates login, logout, registration and session resolution over a
/// pluggable store.
///
/// Sessions carry a fixed absolute expiry set at login; resolution never
/// extends it. Expired records are purged lazily when a lookup trips over
/// them.
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    config: SessionConfig,
}

impl AuthService {
    pub fn new(store: Arc<dyn AuthStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    /// Verifies credentials and opens a new session. Unknown usernames and
    /// wrong passwords are indistinguishable to the caller: same error,
    /// same hashing work.
    pub async fn login(
        &self,
        username: &str,
        plain_password: &str,
        stay_logged_in: bool,
    ) -> Result<(Session, User), AuthError> {
        let username = username.trim().to_lowercase();

        let Some(user) = self.store.find_user_by_username(&username).await? else {
            password::verify_against_dummy(plain_password);
            warn!("login failed");
            return Err(AuthError::InvalidCredentials);
        };
        if !password::verify_password(plain_password, &user.password_hash) {
            warn!("login failed");
            return Err(AuthError::InvalidCredentials);
        }

        let now = OffsetDateTime::now_utc();
        let ttl = Duration::hours(if stay_logged_in {
            self.config.long_ttl_hours
        } else {
            self.config.ttl_hours
        });
        let session = Session {
            token: token::generate_token(),
            user_id: user.id,
            artwork_token: token::generate_token(),
            created_at: now,
            expires_at: now + ttl,
        };
        self.store.insert_session(&session).await?;

        info!(user_id = %user.id, stay_logged_in, "user logged in");
        Ok((session, user))
    }

    /// The single authorization gate. `None` means anonymous: the token is
    /// absent from the store, expired, or its owner is gone. An expired
    /// record is deleted on the spot so the token can never resolve again.
    pub async fn resolve_session(
        &self,
        session_token: &str,
    ) -> Result<Option<(Session, User)>, AuthError> {
        let Some(session) = self.store.find_session(session_token).await? else {
            return Ok(None);
        };
        let now = OffsetDateTime::now_utc();
        if session.is_expired(now) {
            self.store.delete_session(&session.token).await?;
            debug!(user_id = %session.user_id, "purged expired session");
            return Ok(None);
        }
        let Some(user) = self.store.find_user_by_id(session.user_id).await? else {
            self.store.delete_session(&session.token).await?;
            return Ok(None);
        };
        Ok(Some((session, user)))
    }

    /// Resolves an artwork token to its owning user, with the same lazy
    /// expiry rules as `resolve_session`.
    pub async fn resolve_artwork_token(
        &self,
        artwork_token: &str,
    ) -> Result<Option<Uuid>, AuthError> {
        let Some(session) = self
            .store
            .find_session_by_artwork_token(artwork_token)
            .await?
        else {
            return Ok(None);
        };
        if session.is_expired(OffsetDateTime::now_utc()) {
            self.store.delete_session(&session.token).await?;
            return Ok(None);
        }
        Ok(Some(session.user_id))
    }

    /// Destroys the session if present. Logging out an already-gone
    /// session is not an error.
    pub async fn logout(&self, session_token: &str) -> Result<(), AuthError> {
        self.store.delete_session(session_token).await?;
        Ok(())
    }

    /// Destroys every session owned by the user.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<(), AuthError> {
        let count = self.store.delete_sessions_for_user(user_id).await?;
        info!(%user_id, count, "revoked all sessions");
        Ok(())
    }

    /// Creates a single-use invitation with the configured TTL.
    pub async fn create_invitation(&self, created_by: Uuid) -> Result<Invitation, AuthError> {
        let now = OffsetDateTime::now_utc();
        let invitation = Invitation {
            token: token::generate_token(),
            created_by,
            created_at: now,
            expires_at: now + Duration::hours(self.config.invitation_ttl_hours),
            consumed_by: None,
            consumed_at: None,
        };
        self.store.insert_invitation(&invitation).await?;
        info!(%created_by, "invitation created");
        Ok(invitation)
    }

    /// Removes an unconsumed invitation; a revoked token later reads as
    /// `InvalidInvitation`. Idempotent.
    pub async fn revoke_invitation(&self, invitation_token: &str) -> Result<(), AuthError> {
        self.store.revoke_invitation(invitation_token).await?;
        Ok(())
    }

    /// Registers a new account through an invitation. Consuming the
    /// invitation and creating the user happen in one atomic store step.
    pub async fn register(
        &self,
        invitation_token: &str,
        username: &str,
        plain_password: &str,
        display_name: &str,
    ) -> Result<User, AuthError> {
        let username = username.trim().to_lowercase();
        if !is_valid_username(&username) {
            return Err(AuthError::Validation(
                "Username must be 3-32 characters of a-z, 0-9 or _".into(),
            ));
        }
        if plain_password.len() < 8 {
            return Err(AuthError::Validation(
                "Password must be at least 8 characters".into(),
            ));
        }
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AuthError::Validation("Display name is required".into()));
        }

        let password_hash = password::hash_password(plain_password)?;
        let user = NewUser {
            id: Uuid::new_v4(),
            username,
            display_name: display_name.to_string(),
            password_hash,
        };
        let user = self
            .store
            .consume_invitation_and_create_user(
                invitation_token,
                OffsetDateTime::now_utc(),
                user,
            )
            .await?;

        info!(user_id = %user.id, "user registered via invitation");
        Ok(user)
    }

    /// Changes the user's password after verifying the current one, then
    /// revokes every existing session of that user.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.len() < 8 {
            return Err(AuthError::Validation(
                "Password must be at least 8 characters".into(),
            ));
        }
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Err(AuthError::Unauthenticated);
        };
        if !password::verify_password(current_password, &user.password_hash) {
            warn!(%user_id, "password change rejected");
            return Err(AuthError::InvalidCredentials);
        }
        let hash = password::hash_password(new_password)?;
        self.store.update_password_hash(user_id, &hash).await?;
        self.logout_all(user_id).await?;
        info!(%user_id, "password changed");
        Ok(())
    }

    /// Removes an account. Its sessions and invitations go with it.
    pub async fn remove_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.store.delete_user(user_id).await?;
        info!(%user_id, "user removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::store::MemoryStore;

    fn make_service() -> (Arc<MemoryStore>, AuthService) {
        let store = Arc::new(MemoryStore::new());
        let service = AuthService::new(store.clone(), AppConfig::ephemeral().session);
        (store, service)
    }

    async fn seed_user(store: &MemoryStore, username: &str, plain: &str) -> Uuid {
        let id = Uuid::new_v4();
        store
            .insert_user(NewUser {
                id,
                username: username.into(),
                display_name: "Admin".into(),
                password_hash: password::hash_password(plain).expect("hash"),
            })
            .await
            .expect("seed user");
        id
    }

    #[tokio::test]
    async fn login_and_resolve_roundtrip() {
        let (store, service) = make_service();
        let user_id = seed_user(&store, "admin", "validPa$$word").await;

        let (session, user) = service
            .login("admin", "validPa$$word", false)
            .await
            .expect("login should succeed");
        assert_eq!(user.id, user_id);

        let resolved = service
            .resolve_session(&session.token)
            .await
            .expect("resolve should not error")
            .expect("session should be live");
        assert_eq!(resolved.1.id, user_id);
        assert_eq!(resolved.0.artwork_token, session.artwork_token);
    }

    #[tokio::test]
    async fn login_normalizes_username_case() {
        let (store, service) = make_service();
        seed_user(&store, "admin", "validPa$$word").await;

        assert!(service.login("  Admin ", "validPa$$word", false).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_fail_alike() {
        let (store, service) = make_service();
        seed_user(&store, "admin", "validPa$$word").await;

        let wrong = service.login("admin", "nope", false).await.unwrap_err();
        let unknown = service.login("ghost", "nope", false).await.unwrap_err();
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.status_code(), unknown.status_code());
    }

    #[tokio::test]
    async fn stay_logged_in_extends_expiry() {
        let (store, service) = make_service();
        seed_user(&store, "admin", "validPa$$word").await;

        let (short, _) = service.login("admin", "validPa$$word", false).await.expect("login");
        let (long, _) = service.login("admin", "validPa$$word", true).await.expect("login");
        assert!(long.expires_at > short.expires_at);
    }

    #[tokio::test]
    async fn expired_session_never_resolves_again() {
        let (store, service) = make_service();
        let user_id = seed_user(&store, "admin", "validPa$$word").await;

        let now = OffsetDateTime::now_utc();
        let session = Session {
            token: token::generate_token(),
            user_id,
            artwork_token: token::generate_token(),
            created_at: now - Duration::hours(2),
            expires_at: now - Duration::hours(1),
        };
        store.insert_session(&session).await.expect("insert");

        for _ in 0..3 {
            let resolved = service
                .resolve_session(&session.token)
                .await
                .expect("resolve should not error");
            assert!(resolved.is_none());
        }
        // lazily purged on first lookup
        assert!(store
            .find_session(&session.token)
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn logout_destroys_session_and_is_idempotent() {
        let (store, service) = make_service();
        seed_user(&store, "admin", "validPa$$word").await;

        let (session, _) = service.login("admin", "validPa$$word", false).await.expect("login");
        service.logout(&session.token).await.expect("logout");
        assert!(service
            .resolve_session(&session.token)
            .await
            .expect("resolve")
            .is_none());
        // a second logout of the same token is fine
        service.logout(&session.token).await.expect("logout again");
    }

    #[tokio::test]
    async fn logout_all_revokes_every_token() {
        let (store, service) = make_service();
        let user_id = seed_user(&store, "admin", "validPa$$word").await;

        let (a, _) = service.login("admin", "validPa$$word", false).await.expect("login");
        let (b, _) = service.login("admin", "validPa$$word", true).await.expect("login");

        service.logout_all(user_id).await.expect("logout_all");
        assert!(service.resolve_session(&a.token).await.expect("resolve").is_none());
        assert!(service.resolve_session(&b.token).await.expect("resolve").is_none());
    }

    #[tokio::test]
    async fn artwork_token_shares_session_lifetime() {
        let (store, service) = make_service();
        let user_id = seed_user(&store, "admin", "validPa$$word").await;

        let (session, _) = service.login("admin", "validPa$$word", false).await.expect("login");
        let owner = service
            .resolve_artwork_token(&session.artwork_token)
            .await
            .expect("resolve artwork");
        assert_eq!(owner, Some(user_id));

        service.logout(&session.token).await.expect("logout");
        let owner = service
            .resolve_artwork_token(&session.artwork_token)
            .await
            .expect("resolve artwork");
        assert_eq!(owner, None);
    }

    #[tokio::test]
    async fn register_through_invitation() {
        let (store, service) = make_service();
        let admin_id = seed_user(&store, "admin", "validPa$$word").await;

        let invitation = service.create_invitation(admin_id).await.expect("invite");
        let user = service
            .register(&invitation.token, "Newcomer", "s3cret-pass", "New Comer")
            .await
            .expect("register should succeed");
        assert_eq!(user.username, "newcomer");

        // and the new credentials work
        assert!(service.login("newcomer", "s3cret-pass", false).await.is_ok());
    }

    #[tokio::test]
    async fn consumed_invitation_is_rejected() {
        let (store, service) = make_service();
        let admin_id = seed_user(&store, "admin", "validPa$$word").await;

        let invitation = service.create_invitation(admin_id).await.expect("invite");
        service
            .register(&invitation.token, "first", "s3cret-pass", "First")
            .await
            .expect("first registration");

        let err = service
            .register(&invitation.token, "second", "s3cret-pass", "Second")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidInvitation));
    }

    #[tokio::test]
    async fn revoked_invitation_is_rejected() {
        let (store, service) = make_service();
        let admin_id = seed_user(&store, "admin", "validPa$$word").await;

        let invitation = service.create_invitation(admin_id).await.expect("invite");
        service
            .revoke_invitation(&invitation.token)
            .await
            .expect("revoke");

        let err = service
            .register(&invitation.token, "someone", "s3cret-pass", "Someone")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidInvitation));
    }

    #[tokio::test]
    async fn expired_invitation_is_rejected() {
        let (store, service) = make_service();
        let admin_id = seed_user(&store, "admin", "validPa$$word").await;

        let now = OffsetDateTime::now_utc();
        let invitation = Invitation {
            token: token::generate_token(),
            created_by: admin_id,
            created_at: now - Duration::hours(2),
            expires_at: now - Duration::hours(1),
            consumed_by: None,
            consumed_at: None,
        };
        store.insert_invitation(&invitation).await.expect("insert");

        let err = service
            .register(&invitation.token, "late", "s3cret-pass", "Too Late")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidInvitation));
    }

    #[tokio::test]
    async fn register_rejects_taken_username() {
        let (store, service) = make_service();
        let admin_id = seed_user(&store, "admin", "validPa$$word").await;

        let invitation = service.create_invitation(admin_id).await.expect("invite");
        let err = service
            .register(&invitation.token, "admin", "s3cret-pass", "Imposter")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UsernameTaken));

        // the failed attempt must not have consumed the invitation
        let user = service
            .register(&invitation.token, "legit", "s3cret-pass", "Legit")
            .await
            .expect("invitation should still be usable");
        assert_eq!(user.username, "legit");
    }

    #[tokio::test]
    async fn register_validates_input_before_touching_the_invitation() {
        let (store, service) = make_service();
        let admin_id = seed_user(&store, "admin", "validPa$$word").await;
        let invitation = service.create_invitation(admin_id).await.expect("invite");

        let err = service
            .register(&invitation.token, "x", "s3cret-pass", "Short Name")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let err = service
            .register(&invitation.token, "goodname", "short", "Good Name")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let stored = store
            .find_invitation(&invitation.token)
            .await
            .expect("find")
            .expect("still present");
        assert!(stored.consumed_by.is_none());
    }

    #[tokio::test]
    async fn concurrent_registrations_have_one_winner() {
        let (store, service) = make_service();
        let admin_id = seed_user(&store, "admin", "validPa$$word").await;
        let service = Arc::new(service);

        let invitation = service.create_invitation(admin_id).await.expect("invite");

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = service.clone();
            let invitation_token = invitation.token.clone();
            handles.push(tokio::spawn(async move {
                service
                    .register(
                        &invitation_token,
                        &format!("racer{i}"),
                        "s3cret-pass",
                        &format!("Racer {i}"),
                    )
                    .await
            }));
        }

        let mut winners = 0;
        let mut losers = 0;
        for handle in handles {
            match handle.await.expect("task should not panic") {
                Ok(_) => winners += 1,
                Err(AuthError::InvalidInvitation) => losers += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(losers, 7);
    }

    #[tokio::test]
    async fn change_password_revokes_sessions_and_requires_current() {
        let (store, service) = make_service();
        let user_id = seed_user(&store, "admin", "validPa$$word").await;

        let (session, _) = service.login("admin", "validPa$$word", false).await.expect("login");

        let err = service
            .change_password(user_id, "wrong-current", "a-new-password")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        service
            .change_password(user_id, "validPa$$word", "a-new-password")
            .await
            .expect("change password");

        assert!(service
            .resolve_session(&session.token)
            .await
            .expect("resolve")
            .is_none());
        assert!(service.login("admin", "validPa$$word", false).await.is_err());
        assert!(service.login("admin", "a-new-password", false).await.is_ok());
    }

    #[tokio::test]
    async fn removing_a_user_invalidates_its_sessions() {
        let (store, service) = make_service();
        let user_id = seed_user(&store, "admin", "validPa$$word").await;

        let (session, _) = service.login("admin", "validPa$$word", false).await.expect("login");
        service.remove_user(user_id).await.expect("remove");

        assert!(service
            .resolve_session(&session.token)
            .await
            .expect("resolve")
            .is_none());
    }

    #[test]
    fn username_validation_rules() {
        assert!(is_valid_username("abc"));
        assert!(is_valid_username("user_123"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("Has Spaces"));
        assert!(!is_valid_username("UPPER"));
        assert!(!is_valid_username(&"a".repeat(33)));
    }
}
