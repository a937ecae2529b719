//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::cookie::{AUTH_COOKIE_NAME, get_cookie};
use super::errors::AuthRejection;
use super::state::HasAuthBackend;
use crate::jwt::AccessClaims;

/// Extractor for endpoints that require a valid access token.
///
/// Strict by design: an expired access token is rejected even when a valid
/// refresh token is present. Obtaining a new pair is the refresh endpoint's
/// job, driven by the client.
pub struct Auth(pub AccessClaims);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = get_cookie(&parts.headers, AUTH_COOKIE_NAME).ok_or(AuthRejection)?;
        let claims = state
            .tokens()
            .verify_access_token(token)
            .map_err(|_| AuthRejection)?;
        Ok(Auth(claims))
    }
}
