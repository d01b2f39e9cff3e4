use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use shared_config::AppConfig;
use shared_models::auth::Session;
use shared_models::error::AppError;

use crate::jwt::validate_token;
use crate::session::SessionContext;

pub fn bearer_token<B>(request: &Request<B>) -> Result<&str, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))
}

/// Validates the bearer token and attaches the `User` plus a signed-in
/// `SessionContext` to the request extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?.to_string();

    let user = validate_token(&token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    let context = SessionContext::signed_in(Session::new(user.clone(), token));

    request.extensions_mut().insert(user);
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}
