//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Failures of the token lifecycle. Everything except `Internal` surfaces as
/// an authentication failure (401) with a machine-readable code; callers must
/// treat it as "not authenticated", never as a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No refresh token was presented
    NoRefreshToken,
    /// Bad signature, malformed structure, or expiry in the past
    InvalidToken,
    /// The embedded version no longer matches the user's counter
    RevokedToken,
    /// Storage or codec failure not attributable to client input
    Internal,
}

impl AuthFailure {
    /// Machine-readable code included in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AuthFailure::NoRefreshToken => "no_refresh_token",
            AuthFailure::InvalidToken => "invalid_token",
            AuthFailure::RevokedToken => "invalid_token_version",
            AuthFailure::Internal => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AuthFailure::NoRefreshToken | AuthFailure::InvalidToken | AuthFailure::RevokedToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthFailure::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailure::NoRefreshToken => write!(f, "No refresh token provided"),
            AuthFailure::InvalidToken => write!(f, "Invalid or expired token"),
            AuthFailure::RevokedToken => write!(f, "Token has been revoked"),
            AuthFailure::Internal => write!(f, "Internal error"),
        }
    }
}

impl std::error::Error for AuthFailure {}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorBody { error: self.code() })).into_response()
    }
}

/// Rejection for the [`Auth`](super::Auth) extractor: 401 without touching
/// the cookies, so a still-valid refresh token keeps working.
#[derive(Debug)]
pub struct AuthRejection;

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct Body {
            message: &'static str,
        }

        (
            StatusCode::UNAUTHORIZED,
            Json(Body {
                message: "Not authenticated",
            }),
        )
            .into_response()
    }
}
