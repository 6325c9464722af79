use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use crate::auth::model::{Session, User};
use crate::error::AuthError;
use crate::state::AppState;

/// Authenticated identity for a request, resolved from the session cookie.
/// Protected handlers take this as a parameter; requests without a live
/// session are rejected with the 401 envelope before any handler logic.
pub struct CurrentUser {
    pub user: User,
    pub session: Session,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(&state.config.session.cookie_name)
            .map(|cookie| cookie.value().to_string())
            .ok_or(AuthError::Unauthenticated)?;

        match state.auth.resolve_session(&token).await? {
            Some((session, user)) => Ok(CurrentUser { user, session }),
            None => {
                warn!("unknown or expired session");
                Err(AuthError::Unauthenticated)
            }
        }
    }
}
