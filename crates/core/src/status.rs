// crates/core/src/status.rs
//! Status and completion-percentage derivation for job events.
//!
//! Both derivations are pure functions of the event row: the explicit
//! `status` column wins outright, then the payload's error marker, then
//! the terminal-step completion test. Nothing here is cached — callers
//! recompute from the latest snapshot on every read.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{JobEvent, JobProgress};

/// Normalized execution status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Error,
    Complete,
    InProgress,
}

impl JobStatus {
    /// Storage-column form (`error` / `complete` / `in_progress`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Complete => "complete",
            Self::InProgress => "in_progress",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status column held text this build does not recognize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status: {0:?}")]
pub struct UnknownJobStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownJobStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "complete" => Ok(Self::Complete),
            "in_progress" => Ok(Self::InProgress),
            other => Err(UnknownJobStatus(other.to_string())),
        }
    }
}

impl JobEvent {
    /// Current status of this snapshot.
    ///
    /// Precedence: the explicit override column, then the payload error
    /// marker, then "did the terminal step complete", else in-progress.
    pub fn status(&self) -> JobStatus {
        if let Some(status) = self.status {
            return status;
        }
        if self.payload.has_error() {
            return JobStatus::Error;
        }
        match self.payload.job() {
            Some(job) if self.payload.complete().contains(&job) => JobStatus::Complete,
            _ => JobStatus::InProgress,
        }
    }

    /// Percentage of the job completed, or `-1` when progress is undefined
    /// (no route and no completions recorded — distinct from `0`).
    ///
    /// `done` counts true step completions (sub-step markers excluded);
    /// the denominator is the de-duplicated union of done entries and
    /// route entries.
    pub fn percent_complete(&self) -> i32 {
        let done = self.payload.completed_steps();
        let route = self.payload.route();
        let basis: BTreeSet<&str> = done
            .iter()
            .map(String::as_str)
            .chain(route.iter().map(String::as_str))
            .collect();
        if basis.is_empty() {
            return -1;
        }
        ((done.len() as f64 / basis.len() as f64) * 100.0) as i32
    }

    /// Task label of the job: the router action, falling back to the
    /// terminal step identifier.
    pub fn task(&self) -> Option<String> {
        self.payload.action().or_else(|| self.payload.job())
    }

    /// Assemble the full derived view of this snapshot.
    pub fn progress(&self) -> JobProgress {
        JobProgress {
            status: self.status(),
            percent_complete: self.percent_complete(),
            pending_services: self.pending_services(),
            completed_services: self.completed_services(),
            task: self.task(),
        }
    }
}
