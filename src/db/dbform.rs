use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;
use uuid::Uuid;

use crate::db::{ResponseStore, StoreError};
use crate::models::{FieldSchema, FormDocument, FormMeta, LogEntry, Submission};
use crate::services::directory::{Directory, FormCatalog};

// Global database instance
static DB: OnceCell<Arc<DbForm>> = OnceCell::const_new();

/// Initialize the global database connection
pub async fn init_db(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = DbForm::new(database_url).await?;
    DB.set(Arc::new(db))
        .map_err(|_| "Database already initialized")?;
    Ok(())
}

/// Get the global database instance
pub fn get_db() -> Option<Arc<DbForm>> {
    DB.get().cloned()
}

/// Database connection pool
pub struct DbForm {
    pool: PgPool,
}

impl DbForm {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.ensure_schema().await?;
        info!("Database connection pool established");
        Ok(db)
    }

    async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS form_users (
                id    TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                name  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS forms (
                id         TEXT PRIMARY KEY,
                title      TEXT NOT NULL,
                fields     JSONB NOT NULL,
                created_by TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS form_access (
                form_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role    TEXT NOT NULL,
                PRIMARY KEY (form_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS form_responses (
                form_id     TEXT PRIMARY KEY,
                answers     JSONB NOT NULL DEFAULT '{}'::jsonb,
                logs        JSONB NOT NULL DEFAULT '[]'::jsonb,
                submissions JSONB NOT NULL DEFAULT '[]'::jsonb
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn document_from_row(form_id: &str, row: &sqlx::postgres::PgRow) -> Result<FormDocument, StoreError> {
        let answers: serde_json::Value = row.try_get("answers")?;
        let logs: serde_json::Value = row.try_get("logs")?;
        let submissions: serde_json::Value = row.try_get("submissions")?;
        Ok(FormDocument {
            form_id: form_id.to_string(),
            answers: serde_json::from_value(answers).unwrap_or_default(),
            logs: serde_json::from_value(logs).unwrap_or_default(),
            submissions: serde_json::from_value(submissions).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ResponseStore for DbForm {
    async fn get_document(&self, form_id: &str) -> Result<Option<FormDocument>, StoreError> {
        let row = sqlx::query(
            "SELECT answers, logs, submissions FROM form_responses WHERE form_id = $1",
        )
        .bind(form_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(Self::document_from_row(form_id, &row)?)),
            None => Ok(None),
        }
    }

    async fn ensure_document(
        &self,
        form_id: &str,
        _user_id: &str,
    ) -> Result<FormDocument, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO form_responses (form_id) VALUES ($1)
            ON CONFLICT (form_id) DO UPDATE SET form_id = form_responses.form_id
            RETURNING answers, logs, submissions
            "#,
        )
        .bind(form_id)
        .fetch_one(&self.pool)
        .await?;
        Self::document_from_row(form_id, &row)
    }

    async fn record_answer(&self, form_id: &str, entry: &LogEntry) -> Result<(), StoreError> {
        let value = serde_json::to_value(&entry.value).unwrap_or_default();
        let entry_json = serde_json::to_value(entry).unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO form_responses (form_id, answers, logs)
            VALUES ($1, jsonb_build_object($2::text, $3::jsonb), jsonb_build_array($4::jsonb))
            ON CONFLICT (form_id) DO UPDATE
            SET answers = jsonb_set(form_responses.answers, ARRAY[$2::text], $3::jsonb, true),
                logs    = form_responses.logs || jsonb_build_array($4::jsonb)
            "#,
        )
        .bind(form_id)
        .bind(&entry.field)
        .bind(value)
        .bind(entry_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_submission(
        &self,
        form_id: &str,
        submission: &Submission,
    ) -> Result<(), StoreError> {
        let submission_json = serde_json::to_value(submission).unwrap_or_default();
        let result = sqlx::query(
            r#"
            UPDATE form_responses
            SET submissions = submissions || jsonb_build_array($2::jsonb),
                logs = COALESCE(
                    (SELECT jsonb_agg(e) FROM jsonb_array_elements(logs) AS e
                     WHERE e->>'userId' IS DISTINCT FROM $3),
                    '[]'::jsonb)
            WHERE form_id = $1
            "#,
        )
        .bind(form_id)
        .bind(submission_json)
        .bind(&submission.submitted_by)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::FormNotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for DbForm {
    async fn has_access(&self, form_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM form_access WHERE form_id = $1 AND user_id = $2) AS granted",
        )
        .bind(form_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("granted")?)
    }

    async fn form_schema(&self, form_id: &str) -> Result<Option<Vec<FieldSchema>>, StoreError> {
        let row = sqlx::query("SELECT fields FROM forms WHERE id = $1")
            .bind(form_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let fields: serde_json::Value = row.try_get("fields")?;
                Ok(Some(serde_json::from_value(fields).unwrap_or_default()))
            }
            None => Ok(None),
        }
    }

    async fn display_name(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT name FROM form_users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get("name")))
    }
}

#[async_trait]
impl FormCatalog for DbForm {
    async fn create_form(
        &self,
        title: &str,
        fields: &[FieldSchema],
        created_by: &str,
        access_emails: &[String],
    ) -> Result<String, StoreError> {
        let form_id = Uuid::new_v4().to_string();
        let fields_json = serde_json::to_value(fields).unwrap_or_default();

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO forms (id, title, fields, created_by) VALUES ($1, $2, $3, $4)")
            .bind(&form_id)
            .bind(title)
            .bind(fields_json)
            .bind(created_by)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO form_access (form_id, user_id, role) VALUES ($1, $2, 'OWNER')")
            .bind(&form_id)
            .bind(created_by)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO form_access (form_id, user_id, role)
            SELECT $1, id, 'EDITOR' FROM form_users
            WHERE email = ANY($2) AND id <> $3
            ON CONFLICT (form_id, user_id) DO NOTHING
            "#,
        )
        .bind(&form_id)
        .bind(access_emails)
        .bind(created_by)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(form_id)
    }

    async fn get_form(&self, form_id: &str) -> Result<Option<FormMeta>, StoreError> {
        let row = sqlx::query("SELECT title, fields, created_by FROM forms WHERE id = $1")
            .bind(form_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let fields: serde_json::Value = row.try_get("fields")?;
                Ok(Some(FormMeta {
                    id: form_id.to_string(),
                    title: row.try_get("title")?,
                    fields: serde_json::from_value(fields).unwrap_or_default(),
                    created_by: row.try_get("created_by")?,
                }))
            }
            None => Ok(None),
        }
    }
}
