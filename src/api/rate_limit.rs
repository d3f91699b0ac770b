//! Fixed-window rate limiting per client.

use super::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Window shared by both limiters
pub const RATE_WINDOW: Duration = Duration::from_secs(15 * 60);
const AUTH_MAX_REQUESTS: u32 = 20;
const API_MAX_REQUESTS: u32 = 500;
/// Stale windows are swept once the table grows past this many clients
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Counts requests per client key in fixed windows.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    message: &'static str,
    trust_proxy: bool,
    hits: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    /// Allows `max_requests` per `window`, rejecting the rest with `message`.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration, message: &'static str) -> Self {
        Self {
            max_requests,
            window,
            message,
            trust_proxy: false,
            hits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Limiter for login, registration and logout
    #[must_use]
    pub fn auth() -> Self {
        Self::new(
            AUTH_MAX_REQUESTS,
            RATE_WINDOW,
            "Too many attempts, please try again later",
        )
    }

    /// Limiter for status and polling endpoints
    #[must_use]
    pub fn api() -> Self {
        Self::new(
            API_MAX_REQUESTS,
            RATE_WINDOW,
            "Too many requests, please try again later",
        )
    }

    /// Keys clients by the first `X-Forwarded-For` entry when set.
    #[must_use]
    pub const fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    /// Records a request from `key`. Returns `false` once the window is exhausted.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);

        if hits.len() > SWEEP_THRESHOLD {
            let window = self.window;
            hits.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = hits.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }
        entry.count = entry.count.saturating_add(1);
        entry.count <= self.max_requests
    }

    fn client_key(&self, req: &Request) -> String {
        if self.trust_proxy {
            let forwarded = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(client) = forwarded {
                return client.to_string();
            }
        }
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
    }
}

/// Middleware rejecting over-limit clients with 429.
pub async fn limit(State(limiter): State<RateLimiter>, req: Request, next: Next) -> Response {
    let key = limiter.client_key(&req);
    if !limiter.check(&key) {
        warn!("Rate limit exceeded for {} on {}", key, req.uri().path());
        return ApiError::TooManyRequests(limiter.message.to_string()).into_response();
    }
    next.run(req).await
}
