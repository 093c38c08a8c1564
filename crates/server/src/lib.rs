//! Endpoint uptime monitoring.
//!
//! Registered targets are probed on their own schedule. Every probe result is
//! stored, reachable/unreachable edges open and resolve incidents, and
//! incident changes are pushed to email and webhook channels.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::monitoring::{
    AlertDispatcher, CheckPipeline, JobQueue, Probe, RecurringScheduler, ResultBroadcaster,
    RetryPolicy,
};
use crate::notify::{EmailTransport, WebhookTransport};
use crate::store::Store;

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod http_client;
pub mod monitoring;
pub mod notify;
pub mod stats;
pub mod store;
pub mod validation;

/// Everything request handlers need, passed to them as an axum `Extension`.
#[derive(Clone)]
pub struct AppResources {
    pub store: Store,
    pub scheduler: Arc<RecurringScheduler>,
    pub broadcaster: ResultBroadcaster,
    pub config: Arc<AppConfig>,
}

impl AppResources {
    /// Wires store, pipeline, queue and scheduler together.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        probe: Arc<dyn Probe>,
        email: Arc<dyn EmailTransport>,
        webhook: Arc<dyn WebhookTransport>,
    ) -> Self {
        let monitoring = &config.monitoring;
        let store = Store::new(db);
        let broadcaster = ResultBroadcaster::new(monitoring.broadcast_capacity);

        let pipeline = Arc::new(CheckPipeline::new(
            store.clone(),
            probe,
            AlertDispatcher::new(email, webhook),
            broadcaster.clone(),
        ));
        let queue = Arc::new(JobQueue::new(
            pipeline,
            RetryPolicy {
                max_attempts: monitoring.max_attempts,
                backoff_base: monitoring.backoff_base(),
            },
        ));
        let scheduler = Arc::new(RecurringScheduler::new(
            queue,
            monitoring.min_interval(),
            monitoring.probe_timeout(),
        ));

        Self {
            store,
            scheduler,
            broadcaster,
            config,
        }
    }
}
