//! Request-time route guard for protected page prefixes.
//!
//! The guard is a coarse last-resort gate: it never performs a refresh
//! mid-request (it has no way to rewrite the outgoing cookie pair from the
//! middleware layer), so a request carrying only a refresh token is sent
//! back to sign-in. The client controller's proactive refresh is what keeps
//! sessions uninterrupted in practice.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use super::cookie::{AUTH_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie};
use super::service::TokenService;

/// Path prefix the guard protects.
pub const PROTECTED_PREFIX: &str = "/dashboard";

/// Paths that bypass the guard: "/" exactly, the others by prefix.
pub const PUBLIC_PATHS: &[&str] = &["/", "/login", "/register"];

const SIGN_IN_PATH: &str = "/login";

#[derive(Clone)]
pub struct GuardState {
    pub auth: TokenService,
}

fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|public| {
        if *public == "/" {
            path == "/"
        } else {
            path == *public || path.starts_with(&format!("{}/", public))
        }
    })
}

/// Per-request decision procedure:
/// 1. public path, or outside the protected prefix: pass through;
/// 2. valid access token: allow;
/// 3. anything else (no tokens, expired access token, refresh token only):
///    redirect to sign-in.
pub async fn route_guard(
    State(state): State<GuardState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if is_public(path) || !path.starts_with(PROTECTED_PREFIX) {
        return next.run(request).await;
    }

    let allowed = {
        let headers = request.headers();
        let auth_token = get_cookie(headers, AUTH_COOKIE_NAME);
        let refresh_token = get_cookie(headers, REFRESH_COOKIE_NAME);

        match (auth_token, refresh_token) {
            (None, None) => false,
            (Some(token), _) => state.auth.verify_access_token(token).is_ok(),
            // Refresh token only: the guard cannot reissue the pair here
            (None, Some(_)) => false,
        }
    };

    if allowed {
        next.run(request).await
    } else {
        Redirect::temporary(SIGN_IN_PATH).into_response()
    }
}
