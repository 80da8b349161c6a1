// crates/db/src/queries/jobs.rs
// Event-log operations: append snapshots, read history, and collapse the
// log to the latest snapshot per logical job.

use chrono::Utc;
use tracing::debug;

use jobtrail_core::{JobEvent, JobPayload, NewJobEvent};

use super::row_types::{JobEventRow, JOB_COLUMNS};
use crate::{Database, DbError, DbResult};

/// Composable id set of the latest event per `message_id`: an event is
/// current when no other event shares its `message_id` with a larger `id`.
///
/// Kept as a single SQL fragment so other queries can nest it (the
/// projection builder embeds it as its default record restriction).
pub(crate) const CURRENT_IDS_SQL: &str = "SELECT jobs.id FROM jobs \
     LEFT JOIN jobs AS j2 ON jobs.message_id = j2.message_id AND jobs.id < j2.id \
     WHERE j2.id IS NULL";

impl Database {
    /// Append one immutable snapshot to the event log.
    ///
    /// Storage assigns the id; `created_at` is stamped at append time.
    /// Concurrent producers may append snapshots for the same
    /// `message_id` without coordination — recency is decided by id order,
    /// not by wall clock.
    pub async fn append_event(&self, event: NewJobEvent) -> DbResult<JobEvent> {
        if event.message_id.trim().is_empty() {
            return Err(DbError::MissingMessageId);
        }
        if event.account_id <= 0 {
            return Err(DbError::InvalidAccount(event.account_id));
        }

        let payload_text = event.payload.to_string();
        let created_at = Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (message_id, account_id, payload, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&event.message_id)
        .bind(event.account_id)
        .bind(&payload_text)
        .bind(event.status.map(|s| s.as_str()))
        .bind(created_at)
        .execute(self.pool())
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, message_id = %event.message_id, "appended job event");

        Ok(JobEvent {
            id,
            message_id: event.message_id,
            account_id: event.account_id,
            payload: JobPayload::new(event.payload),
            status: event.status,
            created_at,
        })
    }

    /// Fetch one snapshot by storage id.
    pub async fn job(&self, id: i64) -> DbResult<Option<JobEvent>> {
        let row: Option<JobEventRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        row.map(JobEventRow::into_event)
            .transpose()
            .map_err(Into::into)
    }

    /// All snapshots recorded for a logical job, oldest first.
    pub async fn job_history(&self, message_id: &str) -> DbResult<Vec<JobEvent>> {
        let rows: Vec<JobEventRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE message_id = ?1 ORDER BY id"
        ))
        .bind(message_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| row.into_event().map_err(Into::into))
            .collect()
    }

    /// Ids of the current snapshot of every logical job.
    pub async fn current_job_ids(&self) -> DbResult<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(CURRENT_IDS_SQL)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Latest snapshot per logical job, ordered by id.
    pub async fn current_jobs(&self) -> DbResult<Vec<JobEvent>> {
        let rows: Vec<JobEventRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id IN ({CURRENT_IDS_SQL}) ORDER BY id"
        ))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| row.into_event().map_err(Into::into))
            .collect()
    }
}
