//! Per-client fixed-window request limiting for the HTTP API.

use crate::config::RateLimitConfig;
use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use hyper::StatusCode;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::time::Instant;

/// Tracked clients above which expired windows are swept.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Clone, Copy, Debug)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32, resets_in: Duration },
    Limited { resets_in: Duration },
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    clients: DashMap<IpAddr, Window>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: DashMap::new(),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_window, config.window())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Counts one request from `client` against its current window.
    pub fn check(&self, client: IpAddr) -> RateDecision {
        let now = Instant::now();
        if self.clients.len() > SWEEP_THRESHOLD {
            self.clients
                .retain(|_, w| now.duration_since(w.started) < self.window);
        }

        let mut entry = self.clients.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }
        let resets_in = self.window.saturating_sub(now.duration_since(entry.started));

        if entry.count >= self.limit {
            return RateDecision::Limited { resets_in };
        }
        entry.count += 1;
        RateDecision::Allowed {
            remaining: self.limit - entry.count,
            resets_in,
        }
    }
}

fn client_ip(req: &Request) -> IpAddr {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn set_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, resets_in: Duration) {
    let reset = OffsetDateTime::now_utc() + resets_in;
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    if let Ok(reset) = reset.format(&Rfc3339)
        && let Ok(value) = HeaderValue::from_str(&reset)
    {
        headers.insert("x-ratelimit-reset", value);
    }
}

/// Middleware answering 429 once a client has used up its window.
pub async fn limit_requests(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_ip(&req);
    match limiter.check(client) {
        RateDecision::Allowed {
            remaining,
            resets_in,
        } => {
            let mut response = next.run(req).await;
            set_headers(response.headers_mut(), limiter.limit(), remaining, resets_in);
            response
        }
        RateDecision::Limited { resets_in } => {
            let retry_after = resets_in.as_secs_f64().ceil() as u64;
            tracing::warn!(
                name = "api.rate_limited",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                client = %client,
                retry_after_secs = retry_after,
                message = "Client exceeded request limit"
            );
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "Too Many Requests",
                    "retryAfter": retry_after,
                })),
            )
                .into_response();
            let headers = response.headers_mut();
            set_headers(headers, limiter.limit(), 0, resets_in);
            headers.insert(hyper::header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}
