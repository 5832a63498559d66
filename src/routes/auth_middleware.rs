use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::{error, info};

use crate::config;
use crate::services::auth_service::{get_auth_token, validate_jwt, AuthUser};

pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    // 1. Get the auth token from the request
    let token = match get_auth_token(req.headers()) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    // 2. Validate Token
    let config = config::get_config();
    let secret = match &config.jwt_secret {
        Some(secret) => secret,
        None => {
            error!("JWT secret not configured");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let token_data = match validate_jwt(&token, secret) {
        Ok(token_data) => token_data,
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };
    info!("Token validated for user {}", token_data.claims.sub);

    // 3. Expose the identity to downstream handlers
    req.extensions_mut()
        .insert(AuthUser::from(token_data.claims));

    Ok(next.run(req).await)
}
