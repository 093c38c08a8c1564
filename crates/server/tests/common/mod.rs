//! Shared fixtures: in-memory database, configuration and recording fakes.

#![allow(dead_code)]

use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use pulsewatch::AppResources;
use pulsewatch::config::{AppConfig, MonitoringConfig, RateLimitConfig};
use pulsewatch::entity::monitored_target;
use pulsewatch::error::NotifyError;
use pulsewatch::monitoring::{Probe, ProbeFailure, ProbeOutcome};
use pulsewatch::notify::{EmailTransport, WebhookTransport};
use pulsewatch::store::{NewTarget, Store};
use sea_orm::{Database, DatabaseConnection};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;

pub const T0: OffsetDateTime = datetime!(2026-10-01 12:00 UTC);

/// Fresh in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");
    Migrator::up(&db, None).await.expect("Failed to run migrations");
    Arc::new(db)
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        bind_address: "127.0.0.1:0".into(),
        smtp: None,
        monitoring: MonitoringConfig {
            min_interval_secs: 10,
            probe_timeout_ms: 2000,
            max_attempts: 2,
            backoff_base_ms: 10,
            broadcast_capacity: 16,
        },
        rate_limit: RateLimitConfig::default(),
    }
}

pub async fn create_target(store: &Store, name: &str) -> monitored_target::Model {
    store
        .create_target(NewTarget {
            name: name.into(),
            address: format!("https://{name}.example.com/health"),
            interval_secs: 60,
            active: true,
        })
        .await
        .expect("create target")
}

/// Probe that replays a scripted reachability sequence. Once the script is
/// exhausted every probe is reachable. Outcome timestamps advance by one
/// minute per probe starting at [`T0`].
pub struct ScriptedProbe {
    script: Mutex<VecDeque<bool>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedProbe {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn always_up() -> Self {
        Self::new([])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, _address: &str, _timeout: Duration) -> ProbeOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let reachable = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(true);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut outcome = if reachable {
            ProbeOutcome::reachable(200, 25)
        } else {
            ProbeOutcome::unreachable(ProbeFailure::Timeout, 2000)
        };
        outcome.checked_at = T0 + time::Duration::minutes(n as i64);
        outcome
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<SentEmail>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailTransport for RecordingMailer {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
        });
        if self.fail {
            Err(NotifyError::Smtp("relay unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct RecordingWebhook {
    pub sent: Mutex<Vec<(String, serde_json::Value)>>,
    pub fail: bool,
}

impl RecordingWebhook {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, serde_json::Value)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookTransport for RecordingWebhook {
    async fn send_webhook(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        if self.fail {
            Err(NotifyError::Webhook("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

pub struct TestApp {
    pub resources: AppResources,
    pub probe: Arc<ScriptedProbe>,
    pub mailer: Arc<RecordingMailer>,
    pub webhook: Arc<RecordingWebhook>,
}

pub async fn test_app(probe: ScriptedProbe) -> TestApp {
    test_app_with_config(probe, test_config()).await
}

pub async fn test_app_with_config(probe: ScriptedProbe, config: AppConfig) -> TestApp {
    let db = setup_test_db().await;
    let probe = Arc::new(probe);
    let mailer = Arc::new(RecordingMailer::default());
    let webhook = Arc::new(RecordingWebhook::default());
    let resources = AppResources::new(
        db,
        Arc::new(config),
        probe.clone(),
        mailer.clone(),
        webhook.clone(),
    );
    TestApp {
        resources,
        probe,
        mailer,
        webhook,
    }
}
