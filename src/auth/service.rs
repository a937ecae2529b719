//! Token lifecycle orchestration: issuance, verification, refresh-with-rotation
//! and revocation.

use std::sync::Arc;

use tracing::error;

use super::cookie::CookiePolicy;
use super::errors::AuthFailure;
use crate::db::{Database, User};
use crate::jwt::{AccessClaims, AccessTokenResult, JwtConfig, RefreshClaims, RefreshTokenResult};

/// A freshly issued access/refresh token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: AccessTokenResult,
    pub refresh: RefreshTokenResult,
}

/// Issues, verifies, refreshes and revokes session tokens. Owns the cookie
/// policy so callers never hand-build Set-Cookie attributes.
#[derive(Clone)]
pub struct TokenService {
    jwt: Arc<JwtConfig>,
    db: Database,
    cookies: CookiePolicy,
}

impl TokenService {
    pub fn new(jwt: Arc<JwtConfig>, db: Database, cookies: CookiePolicy) -> Self {
        Self { jwt, db, cookies }
    }

    pub fn cookies(&self) -> &CookiePolicy {
        &self.cookies
    }

    /// Issue both tokens for a user. The refresh token snapshots the user's
    /// current token version.
    pub fn generate_tokens(&self, user: &User) -> Result<TokenPair, AuthFailure> {
        let access = self.jwt.generate_access_token(&user.uuid).map_err(|e| {
            error!("Failed to generate access token: {}", e);
            AuthFailure::Internal
        })?;
        let refresh = self
            .jwt
            .generate_refresh_token(&user.uuid, user.token_version)
            .map_err(|e| {
                error!("Failed to generate refresh token: {}", e);
                AuthFailure::Internal
            })?;
        Ok(TokenPair { access, refresh })
    }

    /// Verify an access token. Failure means "not authenticated".
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthFailure> {
        self.jwt
            .validate_access_token(token)
            .map_err(|_| AuthFailure::InvalidToken)
    }

    /// Verify a refresh token. Failure means "not authenticated".
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthFailure> {
        self.jwt
            .validate_refresh_token(token)
            .map_err(|_| AuthFailure::InvalidToken)
    }

    /// Exchange a refresh token for a brand-new token pair (rotation: the old
    /// refresh token is superseded, not just the access token).
    ///
    /// Fails with `RevokedToken` when the user is gone or the embedded
    /// version no longer matches the user's counter, even if the token is
    /// unexpired and correctly signed.
    pub async fn refresh(&self, refresh_token: &str) -> Result<(TokenPair, User), AuthFailure> {
        let claims = self.verify_refresh_token(refresh_token)?;

        let user = self
            .db
            .users()
            .get_by_uuid(&claims.sub)
            .await
            .map_err(|e| {
                error!("Failed to load user for refresh: {}", e);
                AuthFailure::Internal
            })?
            .ok_or(AuthFailure::RevokedToken)?;

        if user.token_version != claims.version {
            return Err(AuthFailure::RevokedToken);
        }

        let tokens = self.generate_tokens(&user)?;
        Ok((tokens, user))
    }

    /// Revoke every outstanding refresh token for a user by bumping the
    /// version counter. Outstanding access tokens expire naturally within
    /// 15 minutes. Returns whether a user row was updated.
    pub async fn revoke_all(&self, user_uuid: &str) -> Result<bool, AuthFailure> {
        self.db
            .users()
            .increment_token_version(user_uuid)
            .await
            .map_err(|e| {
                error!("Failed to increment token version: {}", e);
                AuthFailure::Internal
            })
    }
}
