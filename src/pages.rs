//! Minimal page routes so the route guard has real paths to protect.
//!
//! Rendering is not this crate's concern; these handlers exist to make the
//! guard's allow/redirect behavior observable over HTTP.

use axum::{Router, response::Html, routing::get};

pub fn router() -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/login", get(login_page))
        .route("/register", get(register_page))
        .route("/dashboard", get(dashboard_page))
        .route("/dashboard/{*path}", get(dashboard_page))
}

async fn index_page() -> Html<&'static str> {
    Html("<!DOCTYPE html><title>Home</title><p>Welcome.</p>")
}

async fn login_page() -> Html<&'static str> {
    Html("<!DOCTYPE html><title>Sign in</title><p>Sign in.</p>")
}

async fn register_page() -> Html<&'static str> {
    Html("<!DOCTYPE html><title>Register</title><p>Create an account.</p>")
}

async fn dashboard_page() -> Html<&'static str> {
    Html("<!DOCTYPE html><title>Dashboard</title><p>Dashboard.</p>")
}
