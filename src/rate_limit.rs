//! Per-client rate limiting over a sliding window.
//!
//! Every accepted request is logged per client; hits older than the window
//! fall out of the log. Responses carry the standard `RateLimit-*` headers.

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::client_ip::ClientIp;
use crate::config::RateLimitConfig;

const RATELIMIT_POLICY: HeaderName = HeaderName::from_static("ratelimit-policy");
const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    /// Time until the oldest hit in the window expires.
    pub reset_after: Duration,
}

/// Sliding-window rate limiter keyed by client IP.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    hits: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            hits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Records a hit for `ip` at `now` if it fits in the window.
    pub fn check(&self, ip: IpAddr, now: Instant) -> RateLimitDecision {
        let window = self.config.window;
        let limit = self.config.max_requests;

        let mut hits = self.hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let log = hits.entry(ip).or_default();

        while let Some(&oldest) = log.front() {
            if now.saturating_duration_since(oldest) >= window {
                log.pop_front();
            } else {
                break;
            }
        }

        let allowed = log.len() < limit;
        if allowed {
            log.push_back(now);
        }

        let reset_after = log
            .front()
            .map(|&oldest| window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(window);

        RateLimitDecision {
            allowed,
            limit,
            remaining: limit.saturating_sub(log.len()),
            reset_after,
        }
    }

    /// Drops clients with no hits left inside the window.
    pub fn prune(&self, now: Instant) {
        let window = self.config.window;
        let mut hits = self.hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        hits.retain(|_, log| {
            log.back()
                .is_some_and(|&newest| now.saturating_duration_since(newest) < window)
        });
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Periodically prunes idle clients for as long as the runtime lives.
    pub fn spawn_pruner(&self) {
        let limiter = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.config.window);
            loop {
                ticker.tick().await;
                limiter.prune(Instant::now());
            }
        });
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn apply_headers(response: &mut Response, decision: &RateLimitDecision, window: Duration) {
    let headers = response.headers_mut();
    let reset = ceil_secs(decision.reset_after);

    let values = [
        (RATELIMIT_POLICY, format!("{};w={}", decision.limit, window.as_secs())),
        (RATELIMIT_LIMIT, decision.limit.to_string()),
        (RATELIMIT_REMAINING, decision.remaining.to_string()),
        (RATELIMIT_RESET, reset.to_string()),
    ];

    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }

    if !decision.allowed {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(reset));
    }
}

/// Rate limiting middleware.
///
/// Keys on the [`ClientIp`] resolved upstream; requests with no known
/// address share the unspecified-address bucket.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ClientIp>()
        .map(|ClientIp(ip)| *ip)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let decision = limiter.check(ip, Instant::now());

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        warn!(
            client_ip = %ip,
            retry_after = ceil_secs(decision.reset_after),
            "Rate limit exceeded"
        );

        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Too many requests, please try again later." })),
        )
            .into_response()
    };

    apply_headers(&mut response, &decision, limiter.config.window);
    response
}
