//! Marketplace session persistence.
//!
//! Reads and writes `<data_dir>/session.json` with secure file permissions
//! (0o600). A persisted session is valid only while younger than the
//! configured TTL (default 24h), measured from the original login — the
//! cookie value is refreshed on every `set-cookie` response header, but the
//! timestamp is not (no sliding expiry).

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ScrapeResult;

/// Default session file name.
const SESSION_FILE_NAME: &str = "session.json";

/// Default session TTL: 24 hours.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Authenticated marketplace user profile, captured at login.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Marketplace user id.
    pub id: String,
    /// Account email.
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub display_name: String,
    /// Account classification (e.g. `"free"`, `"pro"`).
    #[serde(default)]
    pub account_type: String,
    /// Remaining download credits, when the plan has them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<u32>,
}

/// Serialized session state: cookie header value plus profile.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Storage format version.
    pub version: u32,
    /// Cookie header value sent on every authenticated request.
    pub cookie: String,
    /// Profile of the logged-in user.
    pub profile: UserProfile,
    /// Original login time; TTL is measured from here.
    pub timestamp: DateTime<Utc>,
}

impl SessionState {
    /// New session created at `now`.
    #[must_use]
    pub fn new(cookie: String, profile: UserProfile) -> Self {
        Self {
            version: 1,
            cookie,
            profile,
            timestamp: Utc::now(),
        }
    }

    /// Whether the session is still within its TTL.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.timestamp);
        age.to_std().map_or(false, |age| age < ttl)
    }
}

/// Get the session file path under the given data directory.
#[must_use]
pub fn session_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SESSION_FILE_NAME)
}

/// Load a persisted session from file.
///
/// Returns `None` if the file doesn't exist, is invalid, carries an
/// unsupported version, or has outlived `ttl`. Absence of a valid session
/// is a normal outcome, not an error.
#[must_use]
pub fn load_session(path: &Path, ttl: Duration) -> Option<SessionState> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("failed to read session file: {e}");
            return None;
        }
    };

    let state = match serde_json::from_str::<SessionState>(&data) {
        Ok(state) if state.version == 1 => state,
        Ok(state) => {
            tracing::warn!("unsupported session version: {}", state.version);
            return None;
        }
        Err(e) => {
            tracing::warn!("failed to parse session file: {e}");
            return None;
        }
    };

    if !state.is_fresh(ttl) {
        tracing::debug!("persisted session expired");
        return None;
    }
    Some(state)
}

/// Save session state to file.
///
/// Creates parent directories if needed. Sets file permissions to 0o600.
pub fn save_session(path: &Path, state: &SessionState) -> ScrapeResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, &json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }

    Ok(())
}

/// Delete the session file; a missing file is not an error.
pub fn clear_session(path: &Path) -> ScrapeResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// In-memory session holder with file-backed persistence.
///
/// Owned by [`crate::SourceClient`]; reads come from concurrent in-flight
/// downloads, writes only from login and the response cookie interceptor,
/// serialized behind the lock.
pub struct SessionManager {
    path: PathBuf,
    ttl: Duration,
    state: parking_lot::RwLock<Option<SessionState>>,
}

impl SessionManager {
    /// Manager persisting under `data_dir` with the given TTL.
    #[must_use]
    pub fn new(data_dir: &Path, ttl: Duration) -> Self {
        Self {
            path: session_file_path(data_dir),
            ttl,
            state: parking_lot::RwLock::new(None),
        }
    }

    /// Load the persisted session into memory. Returns `true` when a fresh
    /// session was restored.
    pub fn load(&self) -> bool {
        match load_session(&self.path, self.ttl) {
            Some(state) => {
                *self.state.write() = Some(state);
                true
            }
            None => false,
        }
    }

    /// Install a newly-authenticated session and persist it.
    pub fn install(&self, state: SessionState) -> ScrapeResult<()> {
        save_session(&self.path, &state)?;
        *self.state.write() = Some(state);
        Ok(())
    }

    /// Current cookie header value, if authenticated.
    #[must_use]
    pub fn cookie(&self) -> Option<String> {
        self.state.read().as_ref().map(|s| s.cookie.clone())
    }

    /// Current user profile, if authenticated.
    #[must_use]
    pub fn profile(&self) -> Option<UserProfile> {
        self.state.read().as_ref().map(|s| s.profile.clone())
    }

    /// Overwrite the cookie value (response interceptor path) and
    /// re-persist. The login timestamp is deliberately left unchanged.
    pub fn refresh_cookie(&self, cookie: String) {
        let mut guard = self.state.write();
        if let Some(state) = guard.as_mut() {
            state.cookie = cookie;
            if let Err(e) = save_session(&self.path, state) {
                tracing::warn!("failed to persist refreshed cookie: {e}");
            }
        }
    }

    /// Whether an in-memory session is present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.read().is_some()
    }

    /// Clear in-memory state and delete the persisted file. Idempotent.
    pub fn logout(&self) -> ScrapeResult<()> {
        *self.state.write() = None;
        clear_session(&self.path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
