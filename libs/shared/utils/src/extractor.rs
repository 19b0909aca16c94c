use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Query parameter accepted in place of the `Authorization` header. Browsers
/// cannot attach headers to a WebSocket upgrade.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;

    let user = validate_token(&token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

fn bearer_token<B>(request: &Request<B>) -> Result<String, AppError> {
    if let Some(auth_header) = request.headers().get("Authorization") {
        let auth_value = auth_header
            .to_str()
            .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

        return auth_value
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()));
    }

    request
        .uri()
        .query()
        .and_then(|query| {
            query.split('&').find_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                (key == ACCESS_TOKEN_PARAM && !value.is_empty()).then(|| value.to_string())
            })
        })
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))
}

pub async fn extract_user<B>(request: &Request<B>) -> Result<User, AppError> {
    request
        .extensions()
        .get::<User>()
        .cloned()
        .ok_or_else(|| AppError::Auth("User not found in request extensions".to_string()))
}

/// Fails with `Forbidden` unless the user carries one of `allowed`.
pub fn require_role(user: &User, allowed: &[Role]) -> Result<Role, AppError> {
    match user.role() {
        Some(role) if allowed.contains(&role) => Ok(role),
        _ => Err(AppError::Forbidden(format!(
            "Role {} is not allowed to perform this action",
            user.role.as_deref().unwrap_or("none")
        ))),
    }
}
