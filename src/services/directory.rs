use async_trait::async_trait;

use crate::db::StoreError;
use crate::models::{FieldSchema, FormMeta};

/// Read side of the form catalog, as the collaboration engine sees it:
/// access grants, schemas and display names. Identity itself is resolved
/// from the JWT before any of these are consulted.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Whether `user_id` holds an access grant for `form_id`.
    async fn has_access(&self, form_id: &str, user_id: &str) -> Result<bool, StoreError>;

    /// The ordered field schema of a form, or `None` if the form is unknown.
    async fn form_schema(&self, form_id: &str) -> Result<Option<Vec<FieldSchema>>, StoreError>;

    /// Display name for lock notices; `None` when the user is unknown.
    async fn display_name(&self, user_id: &str) -> Result<Option<String>, StoreError>;
}

/// Write side of the form catalog, used by the REST surface.
#[async_trait]
pub trait FormCatalog: Send + Sync {
    /// Create a form, grant the creator owner access and grant editor
    /// access to every known user matched by `access_emails`. Returns the
    /// new form id.
    async fn create_form(
        &self,
        title: &str,
        fields: &[FieldSchema],
        created_by: &str,
        access_emails: &[String],
    ) -> Result<String, StoreError>;

    async fn get_form(&self, form_id: &str) -> Result<Option<FormMeta>, StoreError>;
}
