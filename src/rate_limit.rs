//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tracing::debug;

use crate::api::ApiError;
use crate::auth::extract_client_ip;
use crate::cli::IpExtractor;

/// Interval between sweeps of idle per-IP entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for password logins
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for self-service registration
    pub register: Arc<IpLimiter>,
    /// Proxy header to read the client IP from, if any
    pub ip_extractor: Option<IpExtractor>,
}

impl RateLimitConfig {
    /// Create limiters allowing `attempts_per_minute` requests per IP on
    /// each endpoint. Zero is treated as one.
    pub fn new(attempts_per_minute: u32, ip_extractor: Option<IpExtractor>) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(attempts_per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            login: Arc::new(RateLimiter::keyed(quota)),
            register: Arc::new(RateLimiter::keyed(quota)),
            ip_extractor,
        }
    }

    /// Drop entries for clients whose buckets have fully refilled.
    pub fn sweep(&self) {
        for limiter in [&self.login, &self.register] {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    /// Number of clients currently tracked across both limiters.
    pub fn tracked_clients(&self) -> usize {
        self.login.len() + self.register.len()
    }
}

/// Spawn a background task that sweeps the limiters periodically.
pub fn spawn_sweeper(config: Arc<RateLimitConfig>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            config.sweep();
            debug!(clients = config.tracked_clients(), "Rate limiter sweep");
        }
    })
}

fn check(
    limiter: &IpLimiter,
    request: &Request,
    ip_extractor: Option<&IpExtractor>,
) -> Result<(), ApiError> {
    let ip = match extract_client_ip(request, ip_extractor) {
        Ok(ip) => ip,
        Err(reason) => {
            debug!("Rejecting request without client IP: {}", reason);
            return Err(ApiError::forbidden("Unable to determine client IP."));
        }
    };

    limiter.check_key(&ip).map_err(|_| {
        debug!("Rate limit hit for {}", ip);
        ApiError::too_many_requests("Too many attempts. Please wait before trying again.")
    })
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(&config.login, &request, config.ip_extractor.as_ref()) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

/// Middleware for rate limiting registrations.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(&config.register, &request, config.ip_extractor.as_ref()) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}
