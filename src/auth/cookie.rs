//! Cookie parsing and the cookie-attribute policy for session tokens.

use axum::http::header;

use crate::jwt::{ACCESS_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS};

/// Cookie name for the access token (short-lived, 15 minutes).
pub const AUTH_COOKIE_NAME: &str = "auth_token";

/// Cookie name for the refresh token (long-lived, 7 days).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Cookie-attribute policy for the token pair.
///
/// Both cookies are HttpOnly and scoped to the whole path space. Behind
/// HTTPS the pair is sent cross-site (`SameSite=None`), which browsers only
/// accept together with `Secure`; plain-HTTP deployments fall back to
/// `SameSite=Strict`.
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    secure: bool,
}

impl CookiePolicy {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    fn cookie(&self, name: &str, value: &str, max_age: u64) -> String {
        let (same_site, secure) = if self.secure {
            ("None", "; Secure")
        } else {
            ("Strict", "")
        };
        format!(
            "{}={}; HttpOnly; SameSite={}; Path=/; Max-Age={}{}",
            name, value, same_site, max_age, secure
        )
    }

    /// Set-Cookie value for the access token.
    pub fn auth_cookie(&self, token: &str) -> String {
        self.cookie(AUTH_COOKIE_NAME, token, ACCESS_TOKEN_DURATION_SECS)
    }

    /// Set-Cookie value for the refresh token.
    pub fn refresh_cookie(&self, token: &str) -> String {
        self.cookie(REFRESH_COOKIE_NAME, token, REFRESH_TOKEN_DURATION_SECS)
    }

    /// Set-Cookie values clearing both tokens.
    pub fn clear_cookies(&self) -> [String; 2] {
        [
            self.cookie(AUTH_COOKIE_NAME, "", 0),
            self.cookie(REFRESH_COOKIE_NAME, "", 0),
        ]
    }
}
