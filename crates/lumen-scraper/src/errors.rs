//! Error types for the scraper subsystem.

use thiserror::Error;

/// Errors that can occur while talking to the formation marketplace.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Login was requested without configured credentials.
    #[error("credentials not configured")]
    MissingCredentials,

    /// The post-login protected-page probe did not confirm authentication.
    #[error("login verification failed")]
    LoginVerificationFailed,

    /// The source returned 401 even after a fresh re-login.
    #[error("unauthorized after re-login")]
    Unauthorized,

    /// Non-success HTTP status on a fetched page.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Transport-level HTTP failure (connect, timeout, TLS).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Session file I/O failure.
    #[error("session io error: {0}")]
    Io(#[from] std::io::Error),

    /// Session file serialization failure.
    #[error("session serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience alias for scraper results.
pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;

impl ScrapeError {
    /// Fold into the pipeline-wide taxonomy.
    #[must_use]
    pub fn into_sync_error(self) -> lumen_core::SyncError {
        use lumen_core::SyncError;
        match self {
            Self::MissingCredentials | Self::LoginVerificationFailed | Self::Unauthorized => {
                SyncError::Authentication(self.to_string())
            }
            Self::Status { .. } | Self::Http(_) => SyncError::TransientFetch(self.to_string()),
            Self::Io(_) | Self::Serde(_) => SyncError::TransientFetch(self.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::SyncError;

    #[test]
    fn status_display() {
        let err = ScrapeError::Status {
            status: 503,
            url: "https://example.com/f/a".into(),
        };
        assert_eq!(err.to_string(), "HTTP 503 from https://example.com/f/a");
    }

    #[test]
    fn auth_errors_map_to_authentication() {
        assert!(matches!(
            ScrapeError::MissingCredentials.into_sync_error(),
            SyncError::Authentication(_)
        ));
        assert!(matches!(
            ScrapeError::Unauthorized.into_sync_error(),
            SyncError::Authentication(_)
        ));
    }

    #[test]
    fn status_maps_to_transient_fetch() {
        let err = ScrapeError::Status {
            status: 500,
            url: "u".into(),
        };
        assert!(matches!(err.into_sync_error(), SyncError::TransientFetch(_)));
    }
}
