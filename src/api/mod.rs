mod auth;
mod error;

use axum::Router;

use crate::auth::TokenService;
use crate::db::Database;

pub use auth::AuthApiState;

/// Create the API router.
pub fn create_api_router(auth: TokenService, db: Database) -> Router {
    let auth_state = AuthApiState { auth, db };

    Router::new().nest("/auth", auth::router(auth_state))
}
