use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::store::RegisterError;

/// Failure taxonomy of the auth subsystem. Every variant is recoverable by
/// the caller; `Internal` is the only one that maps to a 5xx.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Invitation is invalid, expired or already used")]
    InvalidInvitation,
    #[error("Username is already taken")]
    UsernameTaken,
    #[error("Authentication required")]
    Unauthenticated,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials | AuthError::Unauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::InvalidInvitation => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::UsernameTaken => StatusCode::CONFLICT,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RegisterError> for AuthError {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::InvalidInvitation => AuthError::InvalidInvitation,
            RegisterError::UsernameTaken => AuthError::UsernameTaken,
            RegisterError::Store(e) => AuthError::Internal(e),
        }
    }
}

/// The wire envelope every failure serializes to. The client parses this
/// exact shape to tell "unauthenticated" apart from everything else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: message.into(),
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        self.status_code == StatusCode::UNAUTHORIZED.as_u16()
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Internal details stay in the logs, not on the wire.
            AuthError::Internal(e) => {
                error!(error = %e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody::from_status(status, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_uses_camel_case_field_names() {
        let body = ErrorBody::from_status(StatusCode::UNAUTHORIZED, "Authentication required");
        let json = serde_json::to_value(&body).expect("serialize envelope");
        assert_eq!(json["statusCode"], 401);
        assert_eq!(json["error"], "Unauthorized");
        assert_eq!(json["message"], "Authentication required");
    }

    #[test]
    fn variants_map_to_distinct_statuses() {
        assert_eq!(
            AuthError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidInvitation.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AuthError::UsernameTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AuthError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unauthenticated_check_only_matches_401() {
        let unauth = ErrorBody::from_status(StatusCode::UNAUTHORIZED, "no");
        let conflict = ErrorBody::from_status(StatusCode::CONFLICT, "taken");
        assert!(unauth.is_unauthenticated());
        assert!(!conflict.is_unauthenticated());
    }
}
