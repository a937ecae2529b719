//! Session authentication endpoints.
//!
//! - POST `/register` - Create an account and start a session
//! - POST `/login` - Password login, sets both token cookies
//! - POST `/logout` - Revoke all refresh tokens and clear cookies
//! - GET `/me` - Materialize the current user from the access cookie
//! - POST `/refresh` - Exchange the refresh cookie for a rotated token pair
//! - GET `/cookie-status` - Cookie-presence probe for the client controller

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ResultExt};
use crate::auth::{
    AUTH_COOKIE_NAME, Auth, AuthFailure, HasAuthBackend, REFRESH_COOKIE_NAME, TokenPair,
    TokenService, get_cookie,
};
use crate::db::{Database, NewUser, User};

#[derive(Clone)]
pub struct AuthApiState {
    pub auth: TokenService,
    pub db: Database,
}

impl HasAuthBackend for AuthApiState {
    fn tokens(&self) -> &TokenService {
        &self.auth
    }
}

pub fn router(state: AuthApiState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/refresh", post(refresh))
        .route("/cookie-status", get(cookie_status))
        .with_state(state)
}

/// User shape returned to clients. Never includes the password hash.
#[derive(Serialize)]
struct PublicUser {
    id: String,
    email: String,
    name: String,
    role: String,
    #[serde(rename = "tokenVersion")]
    token_version: i64,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.uuid.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            token_version: user.token_version,
        }
    }
}

#[derive(Serialize)]
struct UserResponse {
    user: PublicUser,
}

/// Both Set-Cookie headers for a freshly issued pair.
fn session_cookies(
    auth: &TokenService,
    tokens: &TokenPair,
) -> AppendHeaders<[(axum::http::HeaderName, String); 2]> {
    AppendHeaders([
        (SET_COOKIE, auth.cookies().auth_cookie(&tokens.access.token)),
        (
            SET_COOKIE,
            auth.cookies().refresh_cookie(&tokens.refresh.token),
        ),
    ])
}

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Create a new user and start a session.
async fn register(
    State(state): State<AuthApiState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(name), Some(email), Some(password)) = (body.name, body.email, body.password) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };
    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }

    let existing = state
        .db
        .users()
        .get_by_email(&email)
        .await
        .db_err("Failed to check existing user")?;
    if existing.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }

    let password_hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::db_error("Failed to hash password", e))?;

    let uuid = uuid::Uuid::new_v4().to_string();
    state
        .db
        .users()
        .create(&NewUser {
            uuid: &uuid,
            email: &email,
            name: &name,
            password_hash: &password_hash,
        })
        .await
        .db_err("Failed to create user")?;

    let user = state
        .db
        .users()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to load created user")?
        .ok_or_else(|| ApiError::internal("Internal server error"))?;

    let tokens = state
        .auth
        .generate_tokens(&user)
        .map_err(|_| ApiError::internal("Internal server error"))?;

    info!(user = %user.uuid, "User registered");

    Ok((
        session_cookies(&state.auth, &tokens),
        Json(UserResponse {
            user: PublicUser::from(&user),
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Password login. Sets both token cookies on success.
async fn login(
    State(state): State<AuthApiState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(email), Some(password)) = (body.email, body.password) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }

    let user = state
        .db
        .users()
        .get_by_email(&email)
        .await
        .db_err("Failed to look up user")?;

    // Same response for unknown user and wrong password
    let Some(user) = user else {
        return Err(ApiError::unauthorized("Invalid credentials"));
    };
    let password_ok = bcrypt::verify(&password, &user.password_hash)
        .map_err(|e| ApiError::db_error("Failed to verify password", e))?;
    if !password_ok {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let tokens = state
        .auth
        .generate_tokens(&user)
        .map_err(|_| ApiError::internal("Internal server error"))?;

    info!(user = %user.uuid, "User logged in");

    Ok((
        session_cookies(&state.auth, &tokens),
        Json(UserResponse {
            user: PublicUser::from(&user),
        }),
    ))
}

/// Logout: revoke every outstanding refresh token (version bump) when a
/// valid refresh token is presented, then clear both cookies. Missing or
/// invalid tokens still clear cookies and succeed without incrementing.
async fn logout(
    State(state): State<AuthApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(refresh_token) = get_cookie(&headers, REFRESH_COOKIE_NAME) {
        if let Ok(claims) = state.auth.verify_refresh_token(refresh_token) {
            state
                .auth
                .revoke_all(&claims.sub)
                .await
                .map_err(|_| ApiError::internal("Internal server error"))?;
            info!(user = %claims.sub, "Sessions revoked on logout");
        }
    }

    let [clear_auth, clear_refresh] = state.auth.cookies().clear_cookies();

    Ok((
        AppendHeaders([(SET_COOKIE, clear_auth), (SET_COOKIE, clear_refresh)]),
        Json(serde_json::json!({ "message": "Logged out successfully" })),
    ))
}

/// Materialize the current user from the access cookie. Identity is
/// re-derived from the store, so the response reflects role changes made
/// after the token was issued.
async fn me(
    State(state): State<AuthApiState>,
    Auth(claims): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(&claims.sub)
        .await
        .db_err("Failed to load user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserResponse {
        user: PublicUser::from(&user),
    }))
}

/// Exchange the refresh cookie for a rotated token pair. A failed refresh
/// must push the client back to an unauthenticated state; errors carry a
/// machine-readable code.
async fn refresh(
    State(state): State<AuthApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthFailure> {
    let refresh_token =
        get_cookie(&headers, REFRESH_COOKIE_NAME).ok_or(AuthFailure::NoRefreshToken)?;

    let (tokens, user) = state.auth.refresh(refresh_token).await?;

    Ok((
        session_cookies(&state.auth, &tokens),
        Json(serde_json::json!({
            "success": true,
            "user": {
                "id": user.uuid,
                "email": user.email,
                "role": user.role,
            }
        })),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CookieStatus {
    has_auth_token: bool,
    has_refresh_token: bool,
}

/// Cookie-presence probe. Reports presence only; the client reads expiry
/// from the token payload itself.
async fn cookie_status(headers: HeaderMap) -> Json<CookieStatus> {
    Json(CookieStatus {
        has_auth_token: get_cookie(&headers, AUTH_COOKIE_NAME).is_some(),
        has_refresh_token: get_cookie(&headers, REFRESH_COOKIE_NAME).is_some(),
    })
}
