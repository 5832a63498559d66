use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/ready",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Create a new form
#[utoipa::path(
    post,
    path = "/api/v1/forms",
    request_body = CreateFormRequest,
    responses(
        (status = 201, description = "Form created successfully", body = CreateFormResponse),
        (status = 400, description = "Invalid form definition", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[allow(dead_code)]
pub async fn create_form_doc() {}

/// Fetch a form definition
#[utoipa::path(
    get,
    path = "/api/v1/forms/{form_id}",
    params(
        ("form_id" = String, Path, description = "Form identifier")
    ),
    responses(
        (status = 200, description = "The form definition", body = FormResponse),
        (status = 403, description = "Access denied", body = ErrorResponse),
        (status = 404, description = "Form not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn get_form_doc() {}

/// Service diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Operational snapshot", body = DiagnosticsResponse),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        create_form_doc,
        get_form_doc,
        diagnostics_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            CreateFormRequest,
            CreateFormResponse,
            FormResponse,
            FieldSchema,
            DiagnosticsResponse
        )
    ),
    tags(
        (name = "api", description = "Form service API endpoints")
    )
)]
pub struct ApiDoc;
