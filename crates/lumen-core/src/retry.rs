//! Retry configuration and backoff calculation.
//!
//! Portable, sync-only building blocks: the orchestrator in `lumen-sync`
//! owns the actual `tokio::time::sleep` calls. Detail downloads use linear
//! backoff (`attempt * base`), matching the rate the upstream marketplace
//! tolerates; exponential growth is unnecessary at 3 attempts.

use serde::{Deserialize, Serialize};

/// Default maximum attempts per candidate URL.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Retry parameters for per-item detail downloads.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum attempts per URL template (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for linear backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

/// Linear backoff delay before retrying.
///
/// `attempt` is 1-based: the delay after the first failed attempt is
/// `1 * base_delay_ms`, after the second `2 * base_delay_ms`, and so on.
#[must_use]
pub fn linear_backoff_delay(attempt: u32, base_delay_ms: u64) -> u64 {
    base_delay_ms.saturating_mul(u64::from(attempt))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
