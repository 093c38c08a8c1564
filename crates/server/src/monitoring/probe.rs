//! Probe executor: one bounded-time reachability check against a URL.
//!
//! A probe never fails. Timeouts, refused connections, DNS errors and non-2xx
//! responses all come back as an unreachable [`ProbeOutcome`] carrying a short
//! classification.

use crate::http_client::{HttpClient, USER_AGENT, build_http_client};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Uri};
use std::fmt;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Why a probe classified its target as unreachable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeFailure {
    /// No terminal outcome within the allotted time.
    Timeout,
    /// Network level failure: DNS, refused connection, reset, TLS.
    NoResponse(String),
    /// The server answered with a status outside 200-299.
    HttpStatus(u16),
    /// The address could not be turned into a request.
    InvalidAddress(String),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Timeout => write!(f, "timeout"),
            ProbeFailure::NoResponse(detail) => write!(f, "no response: {detail}"),
            ProbeFailure::HttpStatus(code) => write!(f, "http error: {code}"),
            ProbeFailure::InvalidAddress(detail) => write!(f, "invalid address: {detail}"),
        }
    }
}

/// Result of a single probe, before it is persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status_code: Option<u16>,
    /// Wall clock from request start to terminal outcome, rounded to the
    /// nearest millisecond. Populated on failure too.
    pub latency_ms: i64,
    pub reachable: bool,
    pub error: Option<ProbeFailure>,
    pub checked_at: OffsetDateTime,
}

impl ProbeOutcome {
    pub fn reachable(status_code: u16, latency_ms: i64) -> Self {
        Self {
            status_code: Some(status_code),
            latency_ms,
            reachable: true,
            error: None,
            checked_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn unreachable(failure: ProbeFailure, latency_ms: i64) -> Self {
        let status_code = match failure {
            ProbeFailure::HttpStatus(code) => Some(code),
            _ => None,
        };
        Self {
            status_code,
            latency_ms,
            reachable: false,
            error: Some(failure),
            checked_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Anything that can check a target address.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome;
}

/// `GET`-based HTTP(S) probe.
#[derive(Clone)]
pub struct HttpProbe {
    client: HttpClient,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::with_client(build_http_client())
    }

    pub fn with_client(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    #[tracing::instrument(name = "probe", skip(self), fields(timeout_ms = timeout.as_millis() as u64))]
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeOutcome {
        let started = Instant::now();

        let uri = match address.parse::<Uri>() {
            Ok(uri) if uri.scheme().is_some() && uri.authority().is_some() => uri,
            Ok(_) => {
                return ProbeOutcome::unreachable(
                    ProbeFailure::InvalidAddress("missing scheme or host".into()),
                    elapsed_ms(started),
                );
            }
            Err(e) => {
                return ProbeOutcome::unreachable(
                    ProbeFailure::InvalidAddress(e.to_string()),
                    elapsed_ms(started),
                );
            }
        };

        let request = match Request::get(uri)
            .header(hyper::header::USER_AGENT, USER_AGENT)
            .body(Full::new(Bytes::new()))
        {
            Ok(request) => request,
            Err(e) => {
                return ProbeOutcome::unreachable(
                    ProbeFailure::InvalidAddress(e.to_string()),
                    elapsed_ms(started),
                );
            }
        };

        let outcome = match tokio::time::timeout(timeout, self.client.request(request)).await {
            Err(_) => ProbeOutcome::unreachable(ProbeFailure::Timeout, elapsed_ms(started)),
            Ok(Err(e)) => ProbeOutcome::unreachable(
                ProbeFailure::NoResponse(describe_client_error(&e)),
                elapsed_ms(started),
            ),
            Ok(Ok(response)) => {
                let status = response.status();
                let latency_ms = elapsed_ms(started);
                if status.is_success() {
                    ProbeOutcome::reachable(status.as_u16(), latency_ms)
                } else {
                    ProbeOutcome::unreachable(ProbeFailure::HttpStatus(status.as_u16()), latency_ms)
                }
            }
        };

        tracing::debug!(
            name = "probe.completed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            address = %address,
            reachable = outcome.reachable,
            status_code = ?outcome.status_code,
            latency_ms = outcome.latency_ms,
            error = ?outcome.error,
            message = "Probe completed"
        );
        outcome
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    (started.elapsed().as_secs_f64() * 1000.0).round() as i64
}

/// Flattens a client error into "what failed: innermost cause".
fn describe_client_error(err: &hyper_util::client::legacy::Error) -> String {
    let mut root: &dyn std::error::Error = err;
    while let Some(source) = root.source() {
        root = source;
    }
    if err.is_connect() {
        format!("connect error: {root}")
    } else {
        root.to_string()
    }
}
