//! Fixed-window request limits for the registration and login endpoints.

use crate::error::AppError;
use crate::server::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Windows are pruned once the table grows past this many entries.
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Per-client request counters, one window per (bucket, client) pair.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<(&'static str, Option<IpAddr>), Window>>,
}

impl RateLimiter {
    /// Create an empty limiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request and report whether it is within `limit` per minute.
    ///
    /// A limit of zero disables the check.
    pub fn check(&self, bucket: &'static str, client: Option<IpAddr>, limit: u32) -> bool {
        self.check_at(bucket, client, limit, Instant::now())
    }

    fn check_at(&self, bucket: &'static str, client: Option<IpAddr>, limit: u32, now: Instant) -> bool {
        if limit == 0 {
            return true;
        }

        let mut windows = self.windows.lock();
        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started) < WINDOW);
        }

        let window = windows.entry((bucket, client)).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= WINDOW {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= limit {
            return false;
        }
        window.count += 1;
        true
    }
}

fn client_ip(req: &Request) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

async fn enforce(state: &AppState, bucket: &'static str, limit: u32, req: Request, next: Next) -> Response {
    let client = client_ip(&req);
    if !state.limiter.check(bucket, client, limit) {
        tracing::warn!(bucket, client = ?client, "Rate limit exceeded");
        return AppError::TooManyRequests.into_response();
    }
    next.run(req).await
}

/// Middleware limiting registration requests.
pub async fn limit_register(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let limit = state.config.auth.register_per_minute;
    enforce(&state, "register", limit, req, next).await
}

/// Middleware limiting login requests.
pub async fn limit_login(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let limit = state.config.auth.login_per_minute;
    enforce(&state, "login", limit, req, next).await
}
