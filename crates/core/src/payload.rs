// crates/core/src/payload.rs
//! Typed view over a job's semi-structured execution payload.
//!
//! Producers own the payload shape; nothing here assumes a field is
//! present. Every accessor is total: a missing or mis-typed field reads as
//! its documented default, never as an error. Field names and nesting are
//! a wire contract with producers and must not be renamed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator marking a sub-step completion entry (`"service:step"`).
/// Entries containing it are excluded from step-completion counts.
const SUB_STEP_SEPARATOR: char = ':';

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobPayload(Value);

impl JobPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Planned remaining path (`data.router.route`), in payload order.
    /// Empty when absent.
    pub fn route(&self) -> Vec<String> {
        string_array(self.0.pointer("/data/router/route"))
    }

    /// Raw completion markers, sub-step entries included.
    pub fn complete(&self) -> Vec<String> {
        string_array(self.0.get("complete"))
    }

    /// Finished pipeline steps: completion markers without a sub-step
    /// separator, in completion order.
    pub fn completed_steps(&self) -> Vec<String> {
        self.complete()
            .into_iter()
            .filter(|entry| !entry.contains(SUB_STEP_SEPARATOR))
            .collect()
    }

    /// Identifier of the job's terminal/target step.
    pub fn job(&self) -> Option<String> {
        self.0
            .get("job")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// True when the producer recorded an error marker.
    pub fn has_error(&self) -> bool {
        matches!(self.0.get("error"), Some(value) if !value.is_null())
    }

    /// Task label (`data.router.action`).
    pub fn action(&self) -> Option<String> {
        self.0
            .pointer("/data/router/action")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

impl From<Value> for JobPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Read an array of strings at `value`, skipping non-string elements.
fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
