pub mod dbform;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{FormDocument, LogEntry, Submission};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("form not found")]
    FormNotFound,
}

/// Durable store for per-form answer documents.
///
/// The collaboration engine is the only writer. The contract is
/// deliberately small: read the document, set one answer plus append one
/// log entry (upserting the document), and archive one submission while
/// clearing the submitter's log entries -- each call atomic per form.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn get_document(&self, form_id: &str) -> Result<Option<FormDocument>, StoreError>;

    /// Fetch the document, creating an empty one if none exists yet.
    async fn ensure_document(&self, form_id: &str, user_id: &str)
        -> Result<FormDocument, StoreError>;

    /// Persist one accepted update: set `answers[entry.field]` and append
    /// the entry to the shared log, upserting the document.
    async fn record_answer(&self, form_id: &str, entry: &LogEntry) -> Result<(), StoreError>;

    /// Archive a submission and drop the submitter's entries from the
    /// shared log in the same store call. Other users' pending entries
    /// survive.
    async fn record_submission(
        &self,
        form_id: &str,
        submission: &Submission,
    ) -> Result<(), StoreError>;
}
