use axum::{extract::State, http::StatusCode, Extension, Json};
use std::sync::Arc;
use tracing::{error, info};

use crate::models::{CreateFormRequest, CreateFormResponse, ErrorResponse};
use crate::services::auth_service::AuthUser;
use crate::AppState;

/// Create a form definition. The creator gets access implicitly;
/// `accessEmails` grants access to other registered users.
pub async fn create_form(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateFormRequest>,
) -> Result<(StatusCode, Json<CreateFormResponse>), (StatusCode, Json<ErrorResponse>)> {
    if request.title.trim().is_empty() {
        return Err(ErrorResponse::reply(
            StatusCode::BAD_REQUEST,
            "Form title must not be empty",
        ));
    }
    if request.fields.is_empty() {
        return Err(ErrorResponse::reply(
            StatusCode::BAD_REQUEST,
            "Form must have at least one field",
        ));
    }

    // Drop anything that is obviously not an address.
    let access_emails: Vec<String> = request
        .access_emails
        .iter()
        .filter(|email| email.contains('@'))
        .cloned()
        .collect();

    let form_id = app_state
        .catalog
        .create_form(&request.title, &request.fields, &user.user_id, &access_emails)
        .await
        .map_err(|e| {
            error!("Failed to create form: {}", e);
            ErrorResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create form")
        })?;
    info!("User {} created form {}", user.user_id, form_id);

    Ok((
        StatusCode::CREATED,
        Json(CreateFormResponse {
            message: "Form created successfully".to_string(),
            form_id: form_id.clone(),
            form_url: format!("/forms/{}", form_id),
        }),
    ))
}
