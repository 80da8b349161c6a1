// crates/db/src/queries/row_types.rs
// Raw row shapes for the jobs table and their conversion into domain types.

use jobtrail_core::{JobEvent, JobPayload, JobStatus};
use sqlx::Row;

/// Base columns of the `jobs` table, in the order queries select them.
pub(crate) const JOB_COLUMNS: &str = "id, message_id, account_id, payload, status, created_at";

/// A `jobs` row as stored; `payload` is the JSON text column.
#[derive(Debug, Clone)]
pub(crate) struct JobEventRow {
    pub id: i64,
    pub message_id: String,
    pub account_id: i64,
    pub payload: String,
    pub status: Option<String>,
    pub created_at: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for JobEventRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            message_id: row.try_get("message_id")?,
            account_id: row.try_get("account_id")?,
            payload: row.try_get("payload")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl JobEventRow {
    /// Decode into the domain event.
    ///
    /// Fails only on malformed payload JSON; an unrecognized status column
    /// reads as no override so that reads stay total.
    pub(crate) fn into_event(self) -> Result<JobEvent, serde_json::Error> {
        let payload: serde_json::Value = serde_json::from_str(&self.payload)?;
        Ok(JobEvent {
            id: self.id,
            message_id: self.message_id,
            account_id: self.account_id,
            payload: JobPayload::new(payload),
            status: self
                .status
                .as_deref()
                .and_then(|s| s.parse::<JobStatus>().ok()),
            created_at: self.created_at,
        })
    }
}
