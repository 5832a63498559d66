use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One recorded field mutation; accumulates in the shared per-form log
/// until the author submits.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub field: String,
    pub value: Value,
    pub user_id: String,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot archived when a user submits: the full answers map
/// at that moment plus the submitter's own log entries.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub submission_id: String,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    pub answers: HashMap<String, Value>,
    pub logs: Vec<LogEntry>,
}

/// The durable per-form document: current answers, the transient shared
/// change log, and archived submissions.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct FormDocument {
    pub form_id: String,
    #[serde(default)]
    pub answers: HashMap<String, Value>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
}

impl FormDocument {
    pub fn empty(form_id: impl Into<String>) -> Self {
        Self {
            form_id: form_id.into(),
            answers: HashMap::new(),
            logs: Vec::new(),
            submissions: Vec::new(),
        }
    }
}
