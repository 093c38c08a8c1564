//! HTTP API.
//!
//! - `targets` - target CRUD (/api/targets)
//! - `alert_configs` - alert settings (/api/alert-configurations)
//! - `checks` - history, latest status, uptime, incidents (/api/checks)
//! - `events` - live check results over SSE (/api/events)
//! - `health` - liveness (/healthz)
//! - `openapi` - OpenAPI document, served with Redoc at /api-docs
//! - `rate_limit` - per-client request limit applied to every API route

pub mod alert_configs;
pub mod checks;
pub mod events;
pub mod health;
pub mod openapi;
pub mod rate_limit;
pub mod targets;

pub use alert_configs::ALERT_CONFIGS_TAG;
pub use checks::CHECKS_TAG;
pub use events::EVENTS_TAG;
pub use health::MISC_TAG;
pub use targets::TARGETS_TAG;

use crate::AppResources;
use axum::Router;
use rate_limit::RateLimiter;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the full router, including the Redoc page.
pub fn router(app_resources: AppResources) -> Router {
    let limits = &app_resources.config.rate_limit;
    let limiter = limits
        .enabled
        .then(|| Arc::new(RateLimiter::from_config(limits)));

    let mut api_router = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .merge(targets::router())
        .merge(alert_configs::router())
        .merge(checks::router())
        .routes(routes!(events::events))
        .routes(routes!(health::health));
    if let Some(limiter) = limiter {
        api_router = api_router.layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limit::limit_requests,
        ));
    }

    let (router, api) = api_router
        .layer(axum::Extension(app_resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Serves the API on the configured bind address until the process exits.
#[tracing::instrument(skip(app_resources))]
pub async fn start_webserver(app_resources: AppResources) -> color_eyre::Result<()> {
    let bind_address = app_resources.config.bind_address.clone();
    let router = router(app_resources);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(
        name = "api.listening",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        addr = %bind_address,
        message = "Server running"
    );
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
