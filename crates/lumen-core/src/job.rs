//! Sync job record and state machine types.
//!
//! A [`SyncJob`] is the durable record of one ingestion run. Status moves
//! strictly forward (`pending → starting → syncing → terminal`); the store
//! layer rejects backward transitions so a crash can never "un-complete" a
//! job. Progress counters are checkpointed after every processed batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which candidates a sync run processes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Only candidates with no existing stored record.
    #[default]
    New,
    /// Everything; existing records are merged, not replaced wholesale.
    All,
    /// Everything; existing records are fully overwritten.
    Force,
}

impl SyncMode {
    /// Parse from the wire/CLI string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "all" => Some(Self::All),
            "force" => Some(Self::Force),
            _ => None,
        }
    }

    /// String form used in job metadata and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::All => "all",
            Self::Force => "force",
        }
    }
}

/// Lifecycle state of a sync job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    /// Created, not yet started.
    Pending,
    /// Authenticating and preparing.
    Starting,
    /// Discovering and downloading candidates.
    Syncing,
    /// Finished with zero failed items.
    Completed,
    /// Finished, but some items failed.
    CompletedWithErrors,
    /// Authentication or discovery failed; nothing was processed.
    Failed,
}

impl SyncJobStatus {
    /// SQL string form.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Syncing => "syncing",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
        }
    }

    /// Parse from the SQL string form.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "starting" => Some(Self::Starting),
            "syncing" => Some(Self::Syncing),
            "completed" => Some(Self::Completed),
            "completed_with_errors" => Some(Self::CompletedWithErrors),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether this is a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithErrors | Self::Failed
        )
    }

    /// Position in the forward-only ordering. Terminal states share a rank
    /// since no transition between them is legal.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Starting => 1,
            Self::Syncing => 2,
            Self::Completed | Self::CompletedWithErrors | Self::Failed => 3,
        }
    }

    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// One attributed per-item failure in a job's error log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncErrorEntry {
    /// Candidate identifier (source id, or endpoint name for discovery errors).
    pub identifier: String,
    /// Human-readable failure message.
    pub message: String,
}

/// Durable record of one ingestion run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    /// Job ID (`job_<uuidv7>`).
    pub id: String,
    /// Job kind, e.g. `"formation_import"`.
    pub job_type: String,
    /// Current lifecycle state.
    pub status: SyncJobStatus,
    /// Candidates selected for processing (0 until discovery completes).
    pub total_items: u64,
    /// Candidates processed so far (success + failure).
    pub processed_items: u64,
    /// Candidates stored successfully.
    pub successful_items: u64,
    /// Candidates that exhausted retries.
    pub failed_items: u64,
    /// Ordered per-item failure log.
    #[serde(default)]
    pub error_log: Vec<SyncErrorEntry>,
    /// Free-form metadata (mode, initiator, per-source stats, duration).
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// When processing began (entering `syncing`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Initiator (user id or `"system"`).
    pub created_by: String,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
