use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, InvitationResponse, LoginRequest, PublicUser,
            RegisterRequest,
        },
        extractors::CurrentUser,
        model::Session,
    },
    config::SessionConfig,
    error::AuthError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/register", post(register))
        .route("/auth/user", get(current_user))
        .route("/auth/password", post(change_password))
}

pub fn invitation_routes() -> Router<AppState> {
    Router::new()
        .route("/invitations", post(create_invitation))
        .route("/invitations/:token", delete(revoke_invitation))
}

fn session_cookie(config: &SessionConfig, session: &Session) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), session.token.clone()))
        .path("/api")
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .expires(session.expires_at)
        .build()
}

fn removal_cookie(config: &SessionConfig) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), ""))
        .path("/api")
        .build()
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(AuthError::Validation(
            "Username and password are required".into(),
        ));
    }

    let (session, user) = state
        .auth
        .login(&payload.username, &payload.password, payload.stay_logged_in)
        .await?;

    let jar = jar.add(session_cookie(&state.config.session, &session));
    Ok((
        jar,
        Json(AuthResponse {
            user: user.into(),
            artwork_token: session.artwork_token,
        }),
    ))
}

/// Destroys the session named by the cookie, if any. Always succeeds from
/// the caller's perspective, so a client can log out an already-dead
/// session without tripping the global 401 handling.
#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), AuthError> {
    if let Some(cookie) = jar.get(&state.config.session.cookie_name) {
        state.auth.logout(cookie.value()).await?;
    }
    let jar = jar.remove(removal_cookie(&state.config.session));
    Ok((jar, StatusCode::NO_CONTENT))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AuthError> {
    let user = state
        .auth
        .register(
            &payload.invitation_token,
            &payload.username,
            &payload.password,
            &payload.display_name,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Who-am-I probe used by the client to hydrate its auth context.
#[instrument(skip(current))]
pub async fn current_user(current: CurrentUser) -> Json<AuthResponse> {
    Json(AuthResponse {
        user: current.user.into(),
        artwork_token: current.session.artwork_token,
    })
}

/// Changing the password revokes every session of the user, including the
/// one making this call; the client is expected to log in again.
#[instrument(skip(state, current, jar, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    jar: CookieJar,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<(CookieJar, StatusCode), AuthError> {
    state
        .auth
        .change_password(
            current.user.id,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;
    let jar = jar.remove(removal_cookie(&state.config.session));
    Ok((jar, StatusCode::NO_CONTENT))
}

#[instrument(skip(state, current))]
pub async fn create_invitation(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<(StatusCode, Json<InvitationResponse>), AuthError> {
    let invitation = state.auth.create_invitation(current.user.id).await?;
    Ok((StatusCode::CREATED, Json(invitation.into())))
}

#[instrument(skip(state, _current, token))]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(token): Path<String>,
) -> Result<StatusCode, AuthError> {
    state.auth.revoke_invitation(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}
