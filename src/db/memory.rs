//! In-memory store, used when no database URL is configured and by the
//! test suite. Implements the same contracts as the Postgres store; all
//! mutations happen under one lock, which gives the per-form atomicity
//! the engine relies on.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{ResponseStore, StoreError};
use crate::models::{FieldSchema, FormDocument, FormMeta, LogEntry, Submission};
use crate::services::directory::{Directory, FormCatalog};

#[derive(Debug, Clone)]
struct UserRecord {
    email: String,
    name: String,
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<String, UserRecord>,
    forms: HashMap<String, FormMeta>,
    access: HashSet<(String, String)>,
    responses: HashMap<String, FormDocument>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user so email-based grants and display-name lookups
    /// can resolve. In production these records live in the identity
    /// service's database.
    pub async fn add_user(&self, id: &str, email: &str, name: &str) {
        let mut inner = self.inner.write().await;
        inner.users.insert(
            id.to_string(),
            UserRecord {
                email: email.to_string(),
                name: name.to_string(),
            },
        );
    }

    /// Grant `user_id` access to `form_id` directly.
    pub async fn grant_access(&self, form_id: &str, user_id: &str) {
        let mut inner = self.inner.write().await;
        inner
            .access
            .insert((form_id.to_string(), user_id.to_string()));
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn get_document(&self, form_id: &str) -> Result<Option<FormDocument>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.responses.get(form_id).cloned())
    }

    async fn ensure_document(
        &self,
        form_id: &str,
        _user_id: &str,
    ) -> Result<FormDocument, StoreError> {
        let mut inner = self.inner.write().await;
        let doc = inner
            .responses
            .entry(form_id.to_string())
            .or_insert_with(|| FormDocument::empty(form_id));
        Ok(doc.clone())
    }

    async fn record_answer(&self, form_id: &str, entry: &LogEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let doc = inner
            .responses
            .entry(form_id.to_string())
            .or_insert_with(|| FormDocument::empty(form_id));
        doc.answers.insert(entry.field.clone(), entry.value.clone());
        doc.logs.push(entry.clone());
        Ok(())
    }

    async fn record_submission(
        &self,
        form_id: &str,
        submission: &Submission,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let doc = inner
            .responses
            .get_mut(form_id)
            .ok_or(StoreError::FormNotFound)?;
        doc.submissions.push(submission.clone());
        doc.logs
            .retain(|entry| entry.user_id != submission.submitted_by);
        Ok(())
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn has_access(&self, form_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .access
            .contains(&(form_id.to_string(), user_id.to_string())))
    }

    async fn form_schema(&self, form_id: &str) -> Result<Option<Vec<FieldSchema>>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.forms.get(form_id).map(|form| form.fields.clone()))
    }

    async fn display_name(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(user_id).map(|user| user.name.clone()))
    }
}

#[async_trait]
impl FormCatalog for MemoryStore {
    async fn create_form(
        &self,
        title: &str,
        fields: &[FieldSchema],
        created_by: &str,
        access_emails: &[String],
    ) -> Result<String, StoreError> {
        let form_id = Uuid::new_v4().to_string();
        let mut inner = self.inner.write().await;
        inner.forms.insert(
            form_id.clone(),
            FormMeta {
                id: form_id.clone(),
                title: title.to_string(),
                fields: fields.to_vec(),
                created_by: created_by.to_string(),
            },
        );
        inner
            .access
            .insert((form_id.clone(), created_by.to_string()));
        for email in access_emails {
            let granted: Vec<String> = inner
                .users
                .iter()
                .filter(|(id, user)| user.email == *email && id.as_str() != created_by)
                .map(|(id, _)| id.clone())
                .collect();
            for user_id in granted {
                inner.access.insert((form_id.clone(), user_id));
            }
        }
        Ok(form_id)
    }

    async fn get_form(&self, form_id: &str) -> Result<Option<FormMeta>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.forms.get(form_id).cloned())
    }
}
