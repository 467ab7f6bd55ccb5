// src/middleware/logging.rs
use axum::{
    extract::{MatchedPath, Request},
    http::Uri,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use uuid::Uuid;

/// Structured log line per request, levelled by response status.
pub async fn request_logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().clone();
    let uri_path = loggable_uri(req.uri());
    let matched_path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_owned())
        .unwrap_or_else(|| "unknown".to_owned());
    let remote_addr = req
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %matched_path,
        remote_addr = %remote_addr,
        "incoming request"
    );

    let response = next.run(req).await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();

    match status {
        500..=599 => tracing::error!(
            request_id = %request_id,
            method = %method,
            path = %matched_path,
            uri = %uri_path,
            status,
            duration_ms = %duration_ms,
            "request completed (server error)"
        ),
        400..=499 => tracing::warn!(
            request_id = %request_id,
            method = %method,
            path = %matched_path,
            uri = %uri_path,
            status,
            duration_ms = %duration_ms,
            "request completed (client error)"
        ),
        _ => tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %matched_path,
            uri = %uri_path,
            status,
            duration_ms = %duration_ms,
            "request completed"
        ),
    }

    response
}

/// Path only; query strings carry tokens (websocket JWT, e-mail verification).
fn loggable_uri(uri: &Uri) -> String {
    uri.path().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_tokens_are_not_logged() {
        let uri: Uri = "/ws/chats/abc?token=eyJhbGciOi.secret".parse().unwrap();
        assert_eq!(loggable_uri(&uri), "/ws/chats/abc");

        let uri: Uri = "/api/auth/verify-email?token=deadbeef".parse().unwrap();
        assert!(!loggable_uri(&uri).contains("deadbeef"));
    }
}
