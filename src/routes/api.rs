use axum::{middleware, routing::get, routing::post, Router};
use std::sync::Arc;

use crate::handlers::{create_form, diagnostics, get_form, health_check, ready_check};
use crate::routes::auth_middleware::auth_middleware;
use crate::AppState;

/// Create API routes
pub fn create_api_routes(app_state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/v1/forms", post(create_form))
        .route("/v1/forms/:form_id", get(get_form))
        .route("/v1/diagnostics", get(diagnostics))
        .route_layer(middleware::from_fn(auth_middleware)) // Applies to all routes added above
        .route("/v1/health", get(health_check))
        .route("/v1/ready", get(ready_check))
        .with_state(app_state)
}
