use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One field descriptor of a form schema.
///
/// The `label` doubles as the stable field key: locks, answers and log
/// entries are all keyed by it. There is no separate numeric field id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl FieldSchema {
    pub fn text(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            field_type: "text".to_string(),
            options: None,
            required: None,
            min: None,
            max: None,
        }
    }
}

/// A stored form: title, ordered field schema and creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormMeta {
    pub id: String,
    pub title: String,
    pub fields: Vec<FieldSchema>,
    pub created_by: String,
}

/// Request body for creating a form
#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFormRequest {
    pub title: String,
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub access_emails: Vec<String>,
}

/// Response for a created form
#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFormResponse {
    pub message: String,
    pub form_id: String,
    pub form_url: String,
}

/// Response for a form schema fetch
#[derive(Serialize, Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormResponse {
    pub id: String,
    pub title: String,
    pub fields: Vec<FieldSchema>,
}
