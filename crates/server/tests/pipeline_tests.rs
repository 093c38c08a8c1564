//! End-to-end check pipeline behaviour against an in-memory database.

mod common;

use common::{
    RecordingMailer, RecordingWebhook, ScriptedProbe, T0, create_target, setup_test_db,
};
use pulsewatch::entity::monitored_target;
use pulsewatch::monitoring::dispatcher::ChannelResult;
use async_trait::async_trait;
use pulsewatch::error::PipelineError;
use pulsewatch::monitoring::{
    AlertDispatcher, CheckJob, CheckPipeline, DispatchReport, IncidentChange, JobHandler,
    JobQueue, ResultBroadcaster, RetryPolicy,
};
use pulsewatch::store::{HistoryQuery, NewAlertConfiguration, Store};
use sea_orm::ConnectionTrait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Harness {
    store: Store,
    pipeline: Arc<CheckPipeline>,
    broadcaster: ResultBroadcaster,
    mailer: Arc<RecordingMailer>,
    webhook: Arc<RecordingWebhook>,
    target: monitored_target::Model,
}

impl Harness {
    fn job(&self) -> CheckJob {
        CheckJob {
            target_id: self.target.id,
            address: self.target.address.clone(),
            timeout: Duration::from_secs(2),
        }
    }

    async fn alert_on(&self, notify_on_down: bool, notify_on_up: bool) {
        self.store
            .create_alert_configuration(NewAlertConfiguration {
                target_id: self.target.id,
                email_recipient: Some("ops@example.com".into()),
                webhook_url: Some("https://hooks.example.com/pulse".into()),
                notify_on_down,
                notify_on_up,
            })
            .await
            .expect("create alert configuration");
    }
}

impl Harness {
    async fn outcome_count(&self) -> usize {
        self.store
            .check_history(
                self.target.id,
                &HistoryQuery {
                    start: None,
                    end: None,
                    take: 100,
                    skip: 0,
                },
            )
            .await
            .unwrap()
            .len()
    }

    async fn sql(&self, statement: &str) {
        self.store
            .connection()
            .execute_unprepared(statement)
            .await
            .expect("execute statement");
    }
}

const REFUSE_INCIDENT_INSERT: &str = "CREATE TRIGGER refuse_incident_insert BEFORE INSERT ON incident \
     BEGIN SELECT RAISE(ABORT, 'incident table is read-only'); END";
const REFUSE_INCIDENT_UPDATE: &str = "CREATE TRIGGER refuse_incident_update BEFORE UPDATE ON incident \
     BEGIN SELECT RAISE(ABORT, 'incident table is read-only'); END";

/// Handler that lifts a database fault after the first failed attempt, the
/// way a transient outage clears between queue retries.
struct TransientFault {
    pipeline: Arc<CheckPipeline>,
    store: Store,
    clear: &'static str,
    failures: AtomicUsize,
}

#[async_trait]
impl JobHandler for TransientFault {
    async fn handle(&self, job: &CheckJob) -> Result<(), PipelineError> {
        let result = self.pipeline.handle(job).await;
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::SeqCst);
            self.store
                .connection()
                .execute_unprepared(self.clear)
                .await
                .expect("clear fault");
        }
        result
    }
}

async fn harness_with(
    probe: ScriptedProbe,
    mailer: RecordingMailer,
    webhook: RecordingWebhook,
) -> Harness {
    let store = Store::new(setup_test_db().await);
    let target = create_target(&store, "shop").await;
    let mailer = Arc::new(mailer);
    let webhook = Arc::new(webhook);
    let broadcaster = ResultBroadcaster::new(16);
    let pipeline = Arc::new(CheckPipeline::new(
        store.clone(),
        Arc::new(probe),
        AlertDispatcher::new(mailer.clone(), webhook.clone()),
        broadcaster.clone(),
    ));
    Harness {
        store,
        pipeline,
        broadcaster,
        mailer,
        webhook,
        target,
    }
}

async fn harness(script: impl IntoIterator<Item = bool>) -> Harness {
    harness_with(
        ScriptedProbe::new(script),
        RecordingMailer::default(),
        RecordingWebhook::default(),
    )
    .await
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn first_check_unreachable_opens_incident() {
    let h = harness([false]).await;

    let report = h.pipeline.run(&h.job()).await.expect("pipeline run");
    assert!(!report.outcome.reachable);
    assert!(matches!(report.incident, IncidentChange::Opened(_)));

    let incidents = h.store.incidents_for_target(h.target.id).await.unwrap();
    assert_eq!(incidents.len(), 1);
    assert!(incidents[0].is_open());
    assert_eq!(incidents[0].opened_at, T0);
}

#[tokio::test]
async fn up_down_up_opens_and_resolves_at_third_check() {
    let h = harness([true, false, true]).await;

    for _ in 0..3 {
        h.pipeline.run(&h.job()).await.expect("pipeline run");
    }

    let incidents = h.store.incidents_for_target(h.target.id).await.unwrap();
    assert_eq!(incidents.len(), 1);
    let incident = &incidents[0];
    assert_eq!(incident.opened_at, T0 + time::Duration::minutes(1));
    assert_eq!(incident.resolved_at, Some(T0 + time::Duration::minutes(2)));
    assert!(h.store.open_incident(h.target.id).await.unwrap().is_none());
}

#[tokio::test]
async fn steady_reachable_target_has_no_incidents() {
    let h = harness([true; 10]).await;

    for _ in 0..10 {
        let report = h.pipeline.run(&h.job()).await.expect("pipeline run");
        assert_eq!(report.incident, IncidentChange::None);
        assert!(report.dispatch.is_none());
    }

    assert!(h.store.incidents_for_target(h.target.id).await.unwrap().is_empty());
    let history = h
        .store
        .outcomes_between(h.target.id, T0, T0 + time::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(history.len(), 10);
}

#[tokio::test]
async fn notify_on_down_disabled_sends_nothing_on_opening() {
    let h = harness([false]).await;
    h.alert_on(false, true).await;

    let report = h.pipeline.run(&h.job()).await.expect("pipeline run");
    assert_eq!(report.dispatch, Some(DispatchReport::Suppressed));
    assert!(h.mailer.sent().is_empty());
    assert!(h.webhook.sent().is_empty());
}

#[tokio::test]
async fn webhook_failure_does_not_stop_email_or_fail_pipeline() {
    let h = harness_with(
        ScriptedProbe::new([false]),
        RecordingMailer::default(),
        RecordingWebhook::failing(),
    )
    .await;
    h.alert_on(true, true).await;

    let report = h.pipeline.run(&h.job()).await.expect("pipeline succeeds");
    let Some(DispatchReport::Attempted { email, webhook }) = report.dispatch else {
        panic!("expected dispatch attempt, got {:?}", report.dispatch);
    };
    assert_eq!(email, ChannelResult::Sent);
    assert!(matches!(webhook, ChannelResult::Failed(_)));
    assert_eq!(h.mailer.sent().len(), 1);
    assert_eq!(h.webhook.sent().len(), 1);
}

#[tokio::test]
async fn email_failure_does_not_stop_webhook() {
    let h = harness_with(
        ScriptedProbe::new([false]),
        RecordingMailer::failing(),
        RecordingWebhook::default(),
    )
    .await;
    h.alert_on(true, true).await;

    h.pipeline.run(&h.job()).await.expect("pipeline succeeds");
    assert_eq!(h.webhook.sent().len(), 1);
}

#[tokio::test]
async fn resolution_notice_carries_duration() {
    let h = harness([false, true]).await;
    h.alert_on(true, true).await;

    h.pipeline.run(&h.job()).await.unwrap();
    h.pipeline.run(&h.job()).await.unwrap();

    let emails = h.mailer.sent();
    assert_eq!(emails.len(), 2);
    assert!(emails[0].subject.starts_with("ALERT:"));
    assert!(emails[1].subject.starts_with("RESOLVED:"));
    assert!(emails[1].html.contains("Duration: 1.00 minutes"));

    let hooks = h.webhook.sent();
    assert_eq!(hooks[1].0, "https://hooks.example.com/pulse");
    assert_eq!(hooks[1].1["isResolution"], true);
    assert_eq!(hooks[1].1["durationMinutes"], 1.0);
}

// =============================================================================
// Invariants
// =============================================================================

#[tokio::test]
async fn openings_match_down_edges_and_never_overlap() {
    let sequence = [
        true, false, false, true, false, true, true, false, false, false, true, false,
    ];
    let h = harness(sequence).await;

    for _ in 0..sequence.len() {
        h.pipeline.run(&h.job()).await.expect("pipeline run");
        let incidents = h.store.incidents_for_target(h.target.id).await.unwrap();
        assert!(incidents.iter().filter(|i| i.is_open()).count() <= 1);
    }

    let expected = sequence
        .iter()
        .enumerate()
        .filter(|&(i, &up)| !up && (i == 0 || sequence[i - 1]))
        .count();
    let incidents = h.store.incidents_for_target(h.target.id).await.unwrap();
    assert_eq!(incidents.len(), expected);
    // The sequence ends down, so exactly the newest incident is open.
    assert!(incidents[0].is_open());
}

#[tokio::test]
async fn concurrent_runs_for_one_target_are_serialized() {
    let h = harness_with(
        ScriptedProbe::new([false, false]).with_delay(Duration::from_millis(20)),
        RecordingMailer::default(),
        RecordingWebhook::default(),
    )
    .await;

    let job = h.job();
    let (a, b) = tokio::join!(h.pipeline.run(&job), h.pipeline.run(&job));
    a.expect("first run");
    b.expect("second run");

    let incidents = h.store.incidents_for_target(h.target.id).await.unwrap();
    assert_eq!(incidents.len(), 1);
}

#[tokio::test]
async fn every_run_is_broadcast() {
    let h = harness([true, false]).await;
    let mut rx = h.broadcaster.subscribe();

    h.pipeline.run(&h.job()).await.unwrap();
    h.pipeline.run(&h.job()).await.unwrap();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.target_id, h.target.id);
    assert!(first.reachable);
    assert_eq!(first.status_code, Some(200));
    assert!(!second.reachable);
    assert_eq!(second.checked_at, T0 + time::Duration::minutes(1));
}

#[tokio::test]
async fn persistence_failure_fails_run_without_incident_logic() {
    let h = harness([false]).await;
    h.store
        .connection()
        .execute_unprepared("DROP TABLE check_outcome")
        .await
        .expect("drop table");

    let err = h.pipeline.run(&h.job()).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(h.store.incidents_for_target(h.target.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleted_target_skips_notification() {
    let h = harness([false]).await;
    h.alert_on(true, true).await;
    h.store.delete_target(h.target.id).await.unwrap();

    let report = h.pipeline.run(&h.job()).await.expect("pipeline run");
    assert!(matches!(report.incident, IncidentChange::Opened(_)));
    assert!(report.dispatch.is_none());
    assert!(h.mailer.sent().is_empty());
}

// =============================================================================
// Failed incident writes
// =============================================================================

#[tokio::test]
async fn failed_incident_write_rolls_back_outcome() {
    let h = harness([true, false, false]).await;
    h.pipeline.run(&h.job()).await.expect("first run");

    h.sql(REFUSE_INCIDENT_INSERT).await;
    let err = h.pipeline.run(&h.job()).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.outcome_count().await, 1);
    h.sql("DROP TRIGGER refuse_incident_insert").await;

    // The rerun still sees the reachable check as its predecessor.
    let report = h.pipeline.run(&h.job()).await.expect("rerun");
    assert!(matches!(report.incident, IncidentChange::Opened(_)));
    let incidents = h.store.incidents_for_target(h.target.id).await.unwrap();
    assert_eq!(incidents.len(), 1);
    assert!(incidents[0].is_open());
    assert_eq!(h.outcome_count().await, 2);
}

#[tokio::test]
async fn failed_resolution_is_retried_on_next_run() {
    let h = harness([false, true, true]).await;
    h.pipeline.run(&h.job()).await.expect("opening run");

    h.sql(REFUSE_INCIDENT_UPDATE).await;
    assert!(h.pipeline.run(&h.job()).await.is_err());
    assert!(h.store.open_incident(h.target.id).await.unwrap().is_some());
    h.sql("DROP TRIGGER refuse_incident_update").await;

    let report = h.pipeline.run(&h.job()).await.expect("rerun");
    assert!(matches!(report.incident, IncidentChange::Resolved(_)));
    assert!(h.store.open_incident(h.target.id).await.unwrap().is_none());
    assert_eq!(
        h.store.incidents_for_target(h.target.id).await.unwrap()[0].resolved_at,
        Some(report.outcome.checked_at)
    );
}

#[tokio::test]
async fn queue_retry_after_incident_write_failure_opens_incident() {
    let h = harness([false, false]).await;
    h.sql(REFUSE_INCIDENT_INSERT).await;

    let handler = Arc::new(TransientFault {
        pipeline: h.pipeline.clone(),
        store: h.store.clone(),
        clear: "DROP TRIGGER refuse_incident_insert",
        failures: Default::default(),
    });
    let queue = JobQueue::new(
        handler.clone(),
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(5),
        },
    );

    let result = queue.run_now(&h.job()).await.expect("not in flight");
    assert!(result.is_ok());
    assert_eq!(handler.failures.load(Ordering::SeqCst), 1);

    let incidents = h.store.incidents_for_target(h.target.id).await.unwrap();
    assert_eq!(incidents.len(), 1);
    assert!(incidents[0].is_open());
    assert_eq!(h.outcome_count().await, 1);
}

// =============================================================================
// Leases
// =============================================================================

#[tokio::test]
async fn leases_are_released_after_runs() {
    let h = harness_with(
        ScriptedProbe::new([true, false]).with_delay(Duration::from_millis(10)),
        RecordingMailer::default(),
        RecordingWebhook::default(),
    )
    .await;

    let job = h.job();
    let (a, b) = tokio::join!(h.pipeline.run(&job), h.pipeline.run(&job));
    a.unwrap();
    b.unwrap();
    assert_eq!(h.pipeline.lease_count(), 0);

    h.sql("DROP TABLE check_outcome").await;
    assert!(h.pipeline.run(&job).await.is_err());
    assert_eq!(h.pipeline.lease_count(), 0);
}
