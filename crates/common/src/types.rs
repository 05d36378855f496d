//! Core types for qarun

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status recorded when a run never reaches a terminal state
pub const TIMEOUT_STATUS: &str = "TIMEOUT";

/// An artifact produced by an integration run, as found in the exported CSV
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub name: String,
    pub id: String,
}

impl ExtractedItem {
    /// Build an item from the digits captured after the `Thing:` marker
    pub fn thing(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: format!("Thing {}", id),
            id,
        }
    }
}

/// One row of the run ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// ISO-8601 UTC timestamp of when the record was written
    pub timestamp: String,

    pub run_id: String,

    /// Terminal status text as shown by the UI, or [`TIMEOUT_STATUS`]
    pub status: String,

    pub action_count: u64,

    pub items: Vec<ExtractedItem>,
}

impl RunRecord {
    pub fn new(run_id: impl Into<String>, status: impl Into<String>, action_count: u64, items: Vec<ExtractedItem>) -> Self {
        Self {
            timestamp: now_iso8601(),
            run_id: run_id.into(),
            status: status.into(),
            action_count,
            items,
        }
    }

    /// The record written when the status poll hits its ceiling
    pub fn timed_out(run_id: impl Into<String>) -> Self {
        Self::new(run_id, TIMEOUT_STATUS, 0, Vec::new())
    }

    pub fn is_timeout(&self) -> bool {
        self.status == TIMEOUT_STATUS
    }
}

/// How a status text relates to the end of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Complete,
    Errored,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalState::Complete => write!(f, "complete"),
            TerminalState::Errored => write!(f, "errored"),
        }
    }
}

/// Classify a status text. `Errored` wins when both markers appear.
pub fn terminal_state(status_text: &str) -> Option<TerminalState> {
    if status_text.contains("Errored") {
        Some(TerminalState::Errored)
    } else if status_text.contains("Complete") {
        Some(TerminalState::Complete)
    } else {
        None
    }
}

/// True when the job behind this status text will not change state again
pub fn is_terminal(status_text: &str) -> bool {
    terminal_state(status_text).is_some()
}

/// A fresh run identifier
pub fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC time, second precision, `Z` suffix
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
