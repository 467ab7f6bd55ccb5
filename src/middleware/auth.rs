// src/middleware/auth.rs
use crate::handlers::auth::verify_jwt_token;
use crate::models::auth::ErrorResponse;
use crate::AppState;
use axum::{
    extract::{Extension, Request},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

pub async fn auth_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, impl IntoResponse> {
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(message) => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    success: false,
                    message: message.to_string(),
                }),
            ));
        }
    };

    let claims = match verify_jwt_token(token, &state.config.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("JWT verification failed: {}", e);
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    success: false,
                    message: "Invalid or expired token".to_string(),
                }),
            ));
        }
    };

    // Handlers read the caller from the request extensions
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Extracts `<token>` from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let header = headers
        .get("Authorization")
        .ok_or("Missing Authorization header")?;
    let value = header
        .to_str()
        .map_err(|_| "Invalid Authorization header format")?;
    value
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or("Invalid Authorization header format. Expected 'Bearer <token>'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Ok("abc.def"));
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), Err("Missing Authorization header"));

        headers.insert("Authorization", HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert("Authorization", HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_err());
    }
}
