// crates/core/src/types.rs
use serde::{Deserialize, Serialize};

use crate::payload::JobPayload;
use crate::status::JobStatus;

/// One immutable snapshot row of a pipeline execution's state.
///
/// Events are append-only: a newer snapshot for the same `message_id`
/// supersedes this one by `id` order, it never overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    /// Storage-assigned, monotonically increasing. Recency tie-break.
    pub id: i64,
    /// Logical job key shared by all snapshots of one job.
    pub message_id: String,
    /// Owning account.
    pub account_id: i64,
    /// Semi-structured execution payload written by the producer.
    pub payload: JobPayload,
    /// Explicit status override; takes precedence over payload-derived status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    /// Append timestamp (epoch seconds). Ordering fallback only — `id` is
    /// the authoritative tie-break.
    pub created_at: i64,
}

/// Fields a producer supplies when appending a new snapshot.
#[derive(Debug, Clone)]
pub struct NewJobEvent {
    pub message_id: String,
    pub account_id: i64,
    pub payload: serde_json::Value,
    pub status: Option<JobStatus>,
}

impl NewJobEvent {
    pub fn new(
        message_id: impl Into<String>,
        account_id: i64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            account_id,
            payload,
            status: None,
        }
    }

    /// Set the explicit status override column.
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Derived, human-facing view of a job's execution state.
///
/// Recomputed on every read from the latest snapshot, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub status: JobStatus,
    /// `0..=100`, or `-1` when no route and no completions are recorded.
    pub percent_complete: i32,
    pub pending_services: Vec<String>,
    pub completed_services: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

/// A registered pipeline service, resolvable by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: i64,
}
