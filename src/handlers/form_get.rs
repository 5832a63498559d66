use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::error;

use crate::auth::auth::ensure_form_access;
use crate::models::{ErrorResponse, FormResponse};
use crate::services::auth_service::AuthUser;
use crate::AppState;

/// Fetch a form definition
pub async fn get_form(
    Path(form_id): Path<String>,
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<FormResponse>, (StatusCode, Json<ErrorResponse>)> {
    ensure_form_access(app_state.directory.as_ref(), &form_id, &user.user_id).await?;

    let form = app_state
        .catalog
        .get_form(&form_id)
        .await
        .map_err(|e| {
            error!("Failed to load form {}: {}", form_id, e);
            ErrorResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load form")
        })?
        .ok_or_else(|| {
            ErrorResponse::reply(
                StatusCode::NOT_FOUND,
                format!("Form '{}' not found", form_id),
            )
        })?;

    Ok(Json(FormResponse {
        id: form.id,
        title: form.title,
        fields: form.fields,
    }))
}
