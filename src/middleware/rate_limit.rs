// src/middleware/rate_limit.rs
use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Requests per minute on authentication endpoints.
pub const STRICT_REQUESTS_PER_MINUTE: u32 = 10;
/// Requests per minute on generation endpoints.
pub const GENERATION_REQUESTS_PER_MINUTE: u32 = 20;

/// Fixed-window limiter keyed by client IP.
#[derive(Clone)]
pub struct RateLimiter {
    // IP -> (request_count, window_start)
    clients: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
    max_requests: u32,
    window_duration: Duration,
    label: &'static str,
}

impl RateLimiter {
    pub fn new(label: &'static str, max_requests: u32, window: Duration) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window_duration: window,
            label,
        }
    }

    pub fn strict() -> Self {
        Self::new("auth", STRICT_REQUESTS_PER_MINUTE, Duration::from_secs(60))
    }

    pub fn generation() -> Self {
        Self::new("generation", GENERATION_REQUESTS_PER_MINUTE, Duration::from_secs(60))
    }

    pub fn check_rate_limit(&self, client_ip: &str) -> bool {
        self.check_at(client_ip, Instant::now())
    }

    fn check_at(&self, client_ip: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match clients.get_mut(client_ip) {
            Some((count, window_start)) => {
                if now.duration_since(*window_start) > self.window_duration {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count >= self.max_requests {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                clients.insert(client_ip.to_string(), (1, now));
                true
            }
        }
    }

    pub fn cleanup_expired(&self) {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        clients.retain(|_, (_, window_start)| now.duration_since(*window_start) <= self.window_duration);
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, impl IntoResponse> {
    let client_ip = addr.ip().to_string();

    if !limiter.check_rate_limit(&client_ip) {
        tracing::warn!("Rate limit ({}) exceeded for IP: {}", limiter.label, client_ip);
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "success": false,
                "message": "Rate limit exceeded. Please try again later.",
                "retry_after": limiter.window_duration.as_secs()
            })),
        ));
    }

    // Occasionally clean up expired entries
    if rand::random::<u8>() < 10 {
        limiter.cleanup_expired();
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_max_requests_in_window() {
        let limiter = RateLimiter::new("test", 3, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check_at("1.1.1.1", now));
        assert!(limiter.check_at("1.1.1.1", now));
        assert!(limiter.check_at("1.1.1.1", now));
        assert!(!limiter.check_at("1.1.1.1", now));
        // Other clients have their own window.
        assert!(limiter.check_at("2.2.2.2", now));
    }

    #[test]
    fn window_resets_after_it_expires() {
        let limiter = RateLimiter::new("test", 1, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("1.1.1.1", start));
        assert!(!limiter.check_at("1.1.1.1", start + Duration::from_secs(30)));
        assert!(limiter.check_at("1.1.1.1", start + Duration::from_secs(61)));
    }
}
