use axum::{http::StatusCode, Json};

use crate::models::ErrorResponse;
use crate::services::directory::Directory;

/// Ensure `user_id` may read or edit `form_id`. Lookup failures are
/// reported as forbidden rather than leaking store errors to clients.
pub async fn ensure_form_access(
    directory: &dyn Directory,
    form_id: &str,
    user_id: &str,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    match directory.has_access(form_id, user_id).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(ErrorResponse::reply(
            StatusCode::FORBIDDEN,
            format!("Access to form '{}' denied", form_id),
        )),
        Err(e) => {
            tracing::error!("Access check failed for form {}: {}", form_id, e);
            Err(ErrorResponse::reply(
                StatusCode::FORBIDDEN,
                format!("Access to form '{}' denied", form_id),
            ))
        }
    }
}
