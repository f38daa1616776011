//! Authenticated HTTP client for the formation marketplace.
//!
//! Wraps `reqwest` with the session plumbing the sync pipeline needs:
//! every outbound request attaches the current session cookie, every
//! response's `set-cookie` header overwrites and re-persists session state,
//! and a 401 on any authenticated request clears the session and performs a
//! single transparent re-login before the request is retried once.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{COOKIE, SET_COOKIE, HeaderMap};
use tracing::{debug, info, warn};

use crate::errors::{ScrapeError, ScrapeResult};
use crate::session::{DEFAULT_SESSION_TTL, SessionManager, SessionState, UserProfile};

/// Default client-wide request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Shorter timeout for the lightweight login-verification probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("lumen/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`SourceClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Marketplace base URL, no trailing slash.
    pub base_url: String,
    /// Login email; `None` disables authentication.
    pub email: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// Directory holding the persisted session file.
    pub data_dir: PathBuf,
    /// Session TTL measured from original login.
    pub session_ttl: Duration,
    /// Client-wide request timeout.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Config with default timeouts and TTL.
    #[must_use]
    pub fn new(base_url: &str, data_dir: PathBuf) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            email: None,
            password: None,
            data_dir,
            session_ttl: DEFAULT_SESSION_TTL,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Attach login credentials.
    #[must_use]
    pub fn with_credentials(mut self, email: &str, password: &str) -> Self {
        self.email = Some(email.to_string());
        self.password = Some(password.to_string());
        self
    }
}

/// Authenticated marketplace client.
pub struct SourceClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: SessionManager,
}

impl SourceClient {
    /// Build a client; fails only if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: ClientConfig) -> ScrapeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let session = SessionManager::new(&config.data_dir, config.session_ttl);
        Ok(Self {
            http,
            config,
            session,
        })
    }

    /// Marketplace base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Resolve a path against the base URL.
    #[must_use]
    pub fn absolute(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
        }
    }

    /// Current user profile, if authenticated.
    #[must_use]
    pub fn profile(&self) -> Option<UserProfile> {
        self.session.profile()
    }

    /// Restore a persisted session or perform a fresh login.
    ///
    /// Returns `Ok(true)` when an authenticated session is in place.
    /// `Ok(false)` means credentials are missing or verification failed —
    /// a normal (if terminal) outcome for the caller to classify.
    pub async fn ensure_authenticated(&self) -> ScrapeResult<bool> {
        if self.session.is_authenticated() {
            return Ok(true);
        }
        if self.session.load() {
            debug!("restored persisted marketplace session");
            return Ok(true);
        }
        self.login().await
    }

    /// Authenticate against the marketplace login form.
    ///
    /// Captures `set-cookie` headers from the form response, verifies the
    /// session via a protected-page probe, and persists on success.
    pub async fn login(&self) -> ScrapeResult<bool> {
        let (Some(email), Some(password)) =
            (self.config.email.as_deref(), self.config.password.as_deref())
        else {
            warn!("login skipped: credentials not configured");
            return Ok(false);
        };

        let login_url = self.absolute("login");
        let response = self
            .http
            .post(&login_url)
            .form(&[("email", email), ("password", password)])
            .send()
            .await?;

        let cookie = collect_cookies(response.headers());
        if cookie.is_empty() {
            warn!("login response carried no session cookie");
            return Ok(false);
        }

        // Verify via a protected page before trusting the cookie.
        let probe = self
            .http
            .get(self.absolute("account"))
            .header(COOKIE, &cookie)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;

        if !probe.status().is_success() {
            warn!(status = probe.status().as_u16(), "login probe rejected");
            return Ok(false);
        }

        let profile = parse_profile(probe, email).await;
        info!(user = %profile.email, "marketplace login verified");
        self.session.install(SessionState::new(cookie, profile))?;
        Ok(true)
    }

    /// Clear in-memory and persisted session state. Idempotent.
    pub fn logout(&self) -> ScrapeResult<()> {
        self.session.logout()
    }

    /// Fetch a page body as text.
    ///
    /// Attaches the session cookie, absorbs `set-cookie` refreshes, and on
    /// a 401 performs a single re-login before retrying once. Non-success
    /// statuses surface as [`ScrapeError::Status`].
    pub async fn get_text(&self, url: &str) -> ScrapeResult<String> {
        match self.get_once(url).await? {
            FetchOutcome::Body(body) => Ok(body),
            FetchOutcome::Unauthorized => {
                debug!(%url, "401 received, attempting re-login");
                self.session.logout()?;
                if !self.login().await? {
                    return Err(ScrapeError::Unauthorized);
                }
                match self.get_once(url).await? {
                    FetchOutcome::Body(body) => Ok(body),
                    FetchOutcome::Unauthorized => Err(ScrapeError::Unauthorized),
                }
            }
        }
    }

    async fn get_once(&self, url: &str) -> ScrapeResult<FetchOutcome> {
        let mut request = self.http.get(url);
        if let Some(cookie) = self.session.cookie() {
            request = request.header(COOKIE, cookie);
        }
        let response = request.send().await?;

        let refreshed = collect_cookies(response.headers());
        if !refreshed.is_empty() {
            self.session.refresh_cookie(refreshed);
        }

        let status = response.status();
        if status.as_u16() == 401 {
            return Ok(FetchOutcome::Unauthorized);
        }
        if !status.is_success() {
            return Err(ScrapeError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(FetchOutcome::Body(response.text().await?))
    }
}

enum FetchOutcome {
    Body(String),
    Unauthorized,
}

/// Join all `set-cookie` values into a single `Cookie` header value,
/// dropping attributes (`Path`, `HttpOnly`, …).
fn collect_cookies(headers: &HeaderMap) -> String {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Best-effort profile extraction from the probe response.
async fn parse_profile(probe: reqwest::Response, email: &str) -> UserProfile {
    let fallback = UserProfile {
        email: email.to_string(),
        ..UserProfile::default()
    };
    let Ok(value) = probe.json::<serde_json::Value>().await else {
        return fallback;
    };
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| value.get(k).and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string()
    };
    UserProfile {
        id: field(&["id", "userId"]),
        email: {
            let e = field(&["email"]);
            if e.is_empty() { email.to_string() } else { e }
        },
        display_name: field(&["displayName", "name"]),
        account_type: field(&["accountType", "plan"]),
        credits: value
            .get("credits")
            .and_then(serde_json::Value::as_u64)
            .map(|c| c as u32),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, dir: &tempfile::TempDir) -> SourceClient {
        let config = ClientConfig::new(&server.uri(), dir.path().to_path_buf())
            .with_credentials("pilot@example.com", "hunter2");
        SourceClient::new(config).unwrap()
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("set-cookie", "sid=abc123; Path=/; HttpOnly"),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/account"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "u1",
                "email": "pilot@example.com",
                "displayName": "Pilot",
                "accountType": "pro",
                "credits": 40
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn login_captures_cookie_and_profile() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&server, &dir);

        assert!(client.login().await.unwrap());
        let profile = client.profile().unwrap();
        assert_eq!(profile.id, "u1");
        assert_eq!(profile.account_type, "pro");
        assert_eq!(profile.credits, Some(40));
        // Session persisted
        assert!(dir.path().join("session.json").exists());
    }

    #[tokio::test]
    async fn login_without_credentials_returns_false() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new(&server.uri(), dir.path().to_path_buf());
        let client = SourceClient::new(config).unwrap();
        assert!(!client.login().await.unwrap());
    }

    #[tokio::test]
    async fn login_fails_when_probe_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(302).insert_header("set-cookie", "sid=bad"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/account"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&server, &dir);
        assert!(!client.login().await.unwrap());
    }

    #[tokio::test]
    async fn get_attaches_session_cookie() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/formations"))
            .and(header("cookie", "sid=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&server, &dir);
        assert!(client.ensure_authenticated().await.unwrap());

        let body = client.get_text(&client.absolute("formations")).await.unwrap();
        assert_eq!(body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn unauthorized_triggers_single_relogin_and_retry() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        // First call 401, then 200 — the relogin path should retry once.
        Mock::given(method("GET"))
            .and(path("/formations"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/formations"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&server, &dir);
        let body = client.get_text(&client.absolute("formations")).await.unwrap();
        assert_eq!(body, "recovered");
    }

    #[tokio::test]
    async fn persistent_unauthorized_surfaces_error() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/formations"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&server, &dir);
        let err = client
            .get_text(&client.absolute("formations"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Unauthorized));
    }

    #[tokio::test]
    async fn non_success_status_surfaces_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new(&server.uri(), dir.path().to_path_buf());
        let client = SourceClient::new(config).unwrap();
        let err = client.get_text(&client.absolute("broken")).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn set_cookie_on_response_refreshes_session() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/formations"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "sid=rotated; Path=/")
                    .set_body_string("ok"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&server, &dir);
        assert!(client.ensure_authenticated().await.unwrap());
        let _ = client.get_text(&client.absolute("formations")).await.unwrap();

        let persisted = crate::session::load_session(
            &crate::session::session_file_path(dir.path()),
            DEFAULT_SESSION_TTL,
        )
        .unwrap();
        assert_eq!(persisted.cookie, "sid=rotated");
    }

    #[test]
    fn collect_cookies_strips_attributes() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, "sid=abc; Path=/; HttpOnly".parse().unwrap());
        headers.append(SET_COOKIE, "theme=dark; Max-Age=3600".parse().unwrap());
        assert_eq!(collect_cookies(&headers), "sid=abc; theme=dark");
    }

    #[test]
    fn absolute_resolves_paths_and_passes_urls() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new("https://market.example.com/", dir.path().to_path_buf());
        let client = SourceClient::new(config).unwrap();
        assert_eq!(
            client.absolute("/formations?page=1"),
            "https://market.example.com/formations?page=1"
        );
        assert_eq!(
            client.absolute("https://cdn.example.com/x.json"),
            "https://cdn.example.com/x.json"
        );
    }
}
