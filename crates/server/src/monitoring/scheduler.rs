//! Recurring scheduler: keeps exactly one live trigger per scheduled target.

use crate::entity::{TargetId, monitored_target};
use crate::error::{PipelineError, StoreError};
use crate::monitoring::queue::{CheckJob, JobQueue, TriggerId};
use crate::store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ScheduledTrigger {
    trigger: TriggerId,
    interval: Duration,
}

/// Maps target ids to their recurring trigger in the [`JobQueue`].
///
/// All mutations hold the write lock for the whole replace, so concurrent
/// `schedule` calls for the same target still end with a single trigger.
pub struct RecurringScheduler {
    queue: Arc<JobQueue>,
    floor: Duration,
    probe_timeout: Duration,
    scheduled: RwLock<HashMap<TargetId, ScheduledTrigger>>,
}

impl RecurringScheduler {
    pub fn new(queue: Arc<JobQueue>, floor: Duration, probe_timeout: Duration) -> Self {
        Self {
            queue,
            floor,
            probe_timeout,
            scheduled: RwLock::new(HashMap::new()),
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// The target's interval, raised to the configured floor.
    pub fn effective_interval(&self, target: &monitored_target::Model) -> Duration {
        let requested = Duration::from_secs(u64::try_from(target.interval_secs).unwrap_or(0));
        requested.max(self.floor)
    }

    /// Job payload for `target`. The probe timeout never reaches the interval.
    pub fn check_job(&self, target: &monitored_target::Model) -> CheckJob {
        let interval = self.effective_interval(target);
        let timeout = if self.probe_timeout < interval {
            self.probe_timeout
        } else {
            interval.saturating_sub(Duration::from_millis(1))
        };
        CheckJob {
            target_id: target.id,
            address: target.address.clone(),
            timeout,
        }
    }

    /// Replaces any existing trigger for the target with a fresh one.
    #[tracing::instrument(skip(self, target), fields(target_id = target.id))]
    pub async fn schedule(&self, target: &monitored_target::Model) {
        let interval = self.effective_interval(target);
        let job = self.check_job(target);

        let mut scheduled = self.scheduled.write().await;
        if let Some(old) = scheduled.remove(&target.id) {
            self.queue.cancel_recurring(old.trigger);
        }
        let trigger = self.queue.schedule_recurring(interval, job);
        scheduled.insert(target.id, ScheduledTrigger { trigger, interval });

        tracing::info!(
            name = "scheduler.scheduled",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            target_id = target.id,
            interval_secs = interval.as_secs(),
            message = "Target scheduled"
        );
    }

    /// Removes the target's trigger. No-op when none exists.
    #[tracing::instrument(skip(self))]
    pub async fn unschedule(&self, target_id: TargetId) {
        let mut scheduled = self.scheduled.write().await;
        if let Some(old) = scheduled.remove(&target_id) {
            self.queue.cancel_recurring(old.trigger);
            tracing::info!(
                name = "scheduler.unscheduled",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                target_id = target_id,
                message = "Target unscheduled"
            );
        }
    }

    /// Unschedules, then schedules again only if the target is still active.
    pub async fn reschedule(&self, target: &monitored_target::Model) {
        self.unschedule(target.id).await;
        if target.active {
            self.schedule(target).await;
        }
    }

    /// Schedules every active target in the store. Returns how many were
    /// scheduled.
    #[tracing::instrument(skip(self, store))]
    pub async fn load_all(&self, store: &Store) -> Result<usize, StoreError> {
        let targets = store.list_active_targets().await?;
        for target in &targets {
            self.schedule(target).await;
        }
        tracing::info!(
            name = "scheduler.loaded",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            count = targets.len(),
            message = "Scheduled active targets"
        );
        Ok(targets.len())
    }

    /// Runs one check for `target` and waits for it, retries included.
    /// `None` when a check for the target is already running.
    pub async fn check_now(
        &self,
        target: &monitored_target::Model,
    ) -> Option<Result<(), PipelineError>> {
        self.queue.run_now(&self.check_job(target)).await
    }

    pub async fn scheduled_interval(&self, target_id: TargetId) -> Option<Duration> {
        self.scheduled
            .read()
            .await
            .get(&target_id)
            .map(|s| s.interval)
    }

    pub async fn is_scheduled(&self, target_id: TargetId) -> bool {
        self.scheduled.read().await.contains_key(&target_id)
    }

    pub async fn scheduled_count(&self) -> usize {
        self.scheduled.read().await.len()
    }

    /// Cancels every trigger.
    pub async fn stop_all(&self) {
        let mut scheduled = self.scheduled.write().await;
        for (_, s) in scheduled.drain() {
            self.queue.cancel_recurring(s.trigger);
        }
    }
}
