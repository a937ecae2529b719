//! Client-side session controller.
//!
//! Mirrors what a browser client does against the auth endpoints: keeps the
//! token cookies in a jar, tracks the signed-in user, proactively refreshes
//! the pair before the access token expires, and falls back to a single
//! refresh-and-retry when an identity call comes back 401.
//!
//! The controller never trusts token contents: it only decodes the access
//! cookie's payload locally to learn the expiry for scheduling. That read is
//! informational, not a security check; the server re-verifies everything.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::cookie::{CookieStore, Jar};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

/// How long before access-token expiry the proactive refresh fires.
/// A heuristic safety margin, not a guarantee against clock skew.
pub const REFRESH_MARGIN_SECS: u64 = 60;

/// The signed-in user as reported by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    /// Absent in refresh responses, which carry a reduced user object
    #[serde(default)]
    pub name: Option<String>,
    pub role: String,
}

/// Result of the cookie-presence probe.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieStatus {
    pub has_auth_token: bool,
    pub has_refresh_token: bool,
}

/// Errors surfaced by the session client.
#[derive(Debug)]
pub enum ClientError {
    /// Transport-level failure
    Http(reqwest::Error),
    /// The server rejected the request (carries the server's message)
    Rejected(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Http(e) => write!(f, "Request failed: {}", e),
            ClientError::Rejected(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(e)
    }
}

struct ClientInner {
    http: reqwest::Client,
    jar: Arc<Jar>,
    base_url: Url,
    user: Mutex<Option<SessionUser>>,
    /// Single in-flight refresh guard: concurrent callers short-circuit
    refreshing: AtomicBool,
    /// Bumped on every identity change; stale timers check it and no-op
    timer_generation: AtomicU64,
}

/// Cookie-jar HTTP client that maintains a session across token expiry.
/// Cheap to clone; clones share the jar and session state.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<ClientInner>,
}

impl SessionClient {
    pub fn new(base_url: Url) -> Result<Self, ClientError> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                jar,
                base_url,
                user: Mutex::new(None),
                refreshing: AtomicBool::new(false),
                timer_generation: AtomicU64::new(0),
            }),
        })
    }

    /// Get the underlying cookie jar (for tests that need to manipulate cookies).
    pub fn cookie_jar(&self) -> &Jar {
        &self.inner.jar
    }

    /// The server origin this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn endpoint(&self, path: &str) -> Url {
        self.inner
            .base_url
            .join(path)
            .expect("endpoint paths are valid")
    }

    /// The currently signed-in user, if any.
    pub async fn current_user(&self) -> Option<SessionUser> {
        self.inner.user.lock().await.clone()
    }

    /// Probe which token cookies are present.
    pub async fn cookie_status(&self) -> Result<CookieStatus, ClientError> {
        let response = self
            .inner
            .http
            .get(self.endpoint("/auth/cookie-status"))
            .send()
            .await?;
        Ok(response.json().await?)
    }

    /// Initial session check: probe the cookies, then materialize the user
    /// from `/auth/me`, or attempt one refresh when only the refresh cookie
    /// remains. Always completes before any proactive-refresh timer is
    /// armed, because the timer is only armed once a user is known.
    pub async fn initialize(&self) -> Result<Option<SessionUser>, ClientError> {
        let status = self.cookie_status().await?;

        if status.has_auth_token {
            if let Some(user) = self.fetch_me().await? {
                self.set_user(Some(user.clone())).await;
                return Ok(Some(user));
            }
        }

        if !status.has_auth_token && status.has_refresh_token && self.refresh().await {
            return Ok(self.current_user().await);
        }

        self.set_user(None).await;
        Ok(None)
    }

    /// Log in with email and password. On success both token cookies are
    /// stored and the proactive refresh is armed.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionUser, ClientError> {
        let response = self
            .inner
            .http
            .post(self.endpoint("/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let user = self.parse_user_response(response, "Login failed").await?;
        self.set_user(Some(user.clone())).await;
        Ok(user)
    }

    /// Register a new account. The server starts a session immediately.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SessionUser, ClientError> {
        let response = self
            .inner
            .http
            .post(self.endpoint("/auth/register"))
            .json(&serde_json::json!({ "name": name, "email": email, "password": password }))
            .send()
            .await?;

        let user = self
            .parse_user_response(response, "Registration failed")
            .await?;
        self.set_user(Some(user.clone())).await;
        Ok(user)
    }

    /// Log out. Triggers server-side revocation of every refresh token, so
    /// tokens issued before logout are permanently unusable, not merely
    /// discarded here. Local state is cleared even when the call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self
            .inner
            .http
            .post(self.endpoint("/auth/logout"))
            .send()
            .await;

        self.set_user(None).await;

        result?;
        Ok(())
    }

    /// Exchange the refresh cookie for a rotated token pair. Returns whether
    /// the session was renewed. A refresh already in progress short-circuits
    /// concurrent callers to `false` rather than issuing duplicate calls.
    pub async fn refresh(&self) -> bool {
        if self.inner.refreshing.swap(true, Ordering::SeqCst) {
            return false;
        }

        let renewed = self.do_refresh().await;

        self.inner.refreshing.store(false, Ordering::SeqCst);
        renewed
    }

    async fn do_refresh(&self) -> bool {
        #[derive(Deserialize)]
        struct RefreshResponse {
            #[serde(default)]
            user: Option<SessionUser>,
        }

        let response = match self
            .inner
            .http
            .post(self.endpoint("/auth/refresh"))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                self.set_user(None).await;
                return false;
            }
        };

        if !response.status().is_success() {
            debug!(status = %response.status(), "Refresh rejected");
            self.set_user(None).await;
            return false;
        }

        match response.json::<RefreshResponse>().await {
            Ok(RefreshResponse { user: Some(user) }) => {
                self.set_user(Some(user)).await;
                true
            }
            Ok(RefreshResponse { user: None }) => {
                self.set_user(None).await;
                false
            }
            Err(e) => {
                warn!("Malformed refresh response: {}", e);
                self.set_user(None).await;
                false
            }
        }
    }

    /// Fetch the current user, retrying once through a refresh when the
    /// access token has lapsed. Any persistent 401 means "not
    /// authenticated", never an error.
    pub async fn me(&self) -> Result<Option<SessionUser>, ClientError> {
        if let Some(user) = self.fetch_me().await? {
            self.set_user(Some(user.clone())).await;
            return Ok(Some(user));
        }

        // One refresh-and-retry; a failed refresh forces the
        // unauthenticated state
        if self.refresh().await {
            if let Some(user) = self.fetch_me().await? {
                self.set_user(Some(user.clone())).await;
                return Ok(Some(user));
            }
        }

        self.set_user(None).await;
        Ok(None)
    }

    /// GET `/auth/me` without retry. 401 and 404 fold into `None`.
    async fn fetch_me(&self) -> Result<Option<SessionUser>, ClientError> {
        #[derive(Deserialize)]
        struct MeResponse {
            user: SessionUser,
        }

        let response = self
            .inner
            .http
            .get(self.endpoint("/auth/me"))
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let body: MeResponse = response.json().await?;
        Ok(Some(body.user))
    }

    async fn parse_user_response(
        &self,
        response: reqwest::Response,
        fallback: &str,
    ) -> Result<SessionUser, ClientError> {
        #[derive(Deserialize)]
        struct UserResponse {
            user: SessionUser,
        }

        #[derive(Deserialize)]
        struct ErrorBody {
            #[serde(default)]
            message: Option<String>,
        }

        if !response.status().is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| fallback.to_string());
            return Err(ClientError::Rejected(message));
        }

        let body: UserResponse = response.json().await?;
        Ok(body.user)
    }

    /// Update the tracked user. Every identity change invalidates any armed
    /// refresh timer; a new one is armed while a user is signed in.
    async fn set_user(&self, user: Option<SessionUser>) {
        let signed_in = user.is_some();
        *self.inner.user.lock().await = user;

        // Bumping the generation retires outstanding timers without
        // aborting them: a stale timer wakes, sees a newer generation, and
        // does nothing. A stale timer can therefore never fire a refresh
        // for a logged-out session.
        let generation = self.inner.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;
        if signed_in {
            self.arm_refresh_timer(generation);
        }
    }

    fn arm_refresh_timer(&self, generation: u64) {
        let Some(expires_at) = self.access_token_expiry() else {
            return;
        };
        let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(now) => now.as_secs(),
            Err(_) => return,
        };
        let delay = expires_at
            .saturating_sub(REFRESH_MARGIN_SECS)
            .saturating_sub(now);

        let client = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            if client.inner.timer_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            debug!("Proactive token refresh");
            client.refresh().await;
        });
    }

    /// Expiry of the access cookie currently in the jar, if any. Reads the
    /// JWT payload without verifying the signature; scheduling input only.
    fn access_token_expiry(&self) -> Option<u64> {
        let header = self.inner.jar.cookies(&self.inner.base_url)?;
        let token = cookie_value(header.to_str().ok()?, "auth_token")?;
        decode_expiry(&token)
    }
}

/// Extract a cookie value from a Cookie header string.
fn cookie_value(header: &str, name: &str) -> Option<String> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Read the `exp` claim out of a JWT payload without verification.
fn decode_expiry(token: &str) -> Option<u64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value() {
        assert_eq!(
            cookie_value("auth_token=abc; refresh_token=xyz", "auth_token"),
            Some("abc".to_string())
        );
        assert_eq!(
            cookie_value("auth_token=abc; refresh_token=xyz", "refresh_token"),
            Some("xyz".to_string())
        );
        assert_eq!(cookie_value("foo=bar", "auth_token"), None);
    }

    #[test]
    fn test_decode_expiry() {
        let jwt = crate::jwt::JwtConfig::new(b"peek-access-secret", b"peek-refresh-secret");
        let result = jwt.generate_access_token("uuid-123").unwrap();

        let exp = decode_expiry(&result.token).unwrap();
        let claims = jwt.validate_access_token(&result.token).unwrap();
        assert_eq!(exp, claims.exp);
    }

    #[test]
    fn test_decode_expiry_garbage() {
        assert_eq!(decode_expiry("not-a-token"), None);
        assert_eq!(decode_expiry("a.b.c"), None);
    }

    #[test]
    fn test_access_token_expiry_reads_jar() {
        let url = Url::parse("http://localhost:7319").unwrap();
        let client = SessionClient::new(url.clone()).unwrap();

        assert_eq!(client.access_token_expiry(), None);

        let jwt = crate::jwt::JwtConfig::new(b"peek-access-secret", b"peek-refresh-secret");
        let result = jwt.generate_access_token("uuid-123").unwrap();
        client
            .inner
            .jar
            .add_cookie_str(&format!("auth_token={}", result.token), &url);

        let exp = client.access_token_expiry().unwrap();
        assert_eq!(exp, jwt.validate_access_token(&result.token).unwrap().exp);
    }
}
