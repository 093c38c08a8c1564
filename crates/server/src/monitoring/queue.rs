//! In-process recurring job queue.
//!
//! Each recurring trigger is a tokio task driving an interval. A firing is
//! spawned onto its own task so a slow check never delays the trigger loop,
//! and a firing is dropped when a job for the same target is still running.
//! Failed jobs are retried according to a [`RetryPolicy`].

use crate::entity::TargetId;
use crate::error::PipelineError;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Opaque handle of a recurring trigger.
pub type TriggerId = u64;

/// Payload carried by every firing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckJob {
    pub target_id: TargetId,
    pub address: String,
    pub timeout: Duration,
}

/// Work executed for each job. Registered once at queue construction.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &CheckJob) -> Result<(), PipelineError>;
}

/// Bounded exponential backoff for failed jobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exp)
    }
}

struct Trigger {
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Marks a target as having a job in flight until dropped.
struct InFlightGuard {
    in_flight: Arc<DashSet<TargetId>>,
    target_id: TargetId,
}

impl InFlightGuard {
    fn claim(in_flight: &Arc<DashSet<TargetId>>, target_id: TargetId) -> Option<Self> {
        in_flight.insert(target_id).then(|| Self {
            in_flight: in_flight.clone(),
            target_id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.target_id);
    }
}

pub struct JobQueue {
    handler: Arc<dyn JobHandler>,
    retry: RetryPolicy,
    triggers: DashMap<TriggerId, Trigger>,
    in_flight: Arc<DashSet<TargetId>>,
    next_id: AtomicU64,
}

impl JobQueue {
    pub fn new(handler: Arc<dyn JobHandler>, retry: RetryPolicy) -> Self {
        Self {
            handler,
            retry,
            triggers: DashMap::new(),
            in_flight: Arc::new(DashSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a trigger firing `job` every `interval`, first one interval
    /// from now.
    #[tracing::instrument(skip(self, job), fields(target_id = job.target_id))]
    pub fn schedule_recurring(&self, interval: Duration, job: CheckJob) -> TriggerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        let handler = self.handler.clone();
        let in_flight = self.in_flight.clone();
        let retry = self.retry;
        let flag = active.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                let Some(guard) = InFlightGuard::claim(&in_flight, job.target_id) else {
                    tracing::debug!(
                        name = "queue.firing_coalesced",
                        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                        target_id = job.target_id,
                        message = "Previous job still running, skipping firing"
                    );
                    continue;
                };
                let handler = handler.clone();
                let job = job.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    execute(handler.as_ref(), retry, &job).await.ok();
                });
            }
        });

        self.triggers.insert(id, Trigger { active, task });
        tracing::info!(
            name = "queue.trigger_registered",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            trigger_id = id,
            interval_secs = interval.as_secs(),
            message = "Recurring trigger registered"
        );
        id
    }

    /// Stops future firings of a trigger. Jobs already running finish.
    /// Unknown handles are ignored.
    #[tracing::instrument(skip(self))]
    pub fn cancel_recurring(&self, id: TriggerId) -> bool {
        match self.triggers.remove(&id) {
            Some((_, trigger)) => {
                trigger.active.store(false, Ordering::SeqCst);
                trigger.task.abort();
                true
            }
            None => false,
        }
    }

    /// Runs `job` once on the caller's task, with retries. Returns `None` when
    /// a job for the same target is already in flight.
    pub async fn run_now(&self, job: &CheckJob) -> Option<Result<(), PipelineError>> {
        let _guard = InFlightGuard::claim(&self.in_flight, job.target_id)?;
        Some(execute(self.handler.as_ref(), self.retry, job).await)
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_in_flight(&self, target_id: TargetId) -> bool {
        self.in_flight.contains(&target_id)
    }

    pub fn cancel_all(&self) {
        let ids: Vec<TriggerId> = self.triggers.iter().map(|t| *t.key()).collect();
        for id in ids {
            self.cancel_recurring(id);
        }
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        for trigger in self.triggers.iter() {
            trigger.active.store(false, Ordering::SeqCst);
            trigger.task.abort();
        }
    }
}

async fn execute(
    handler: &dyn JobHandler,
    retry: RetryPolicy,
    job: &CheckJob,
) -> Result<(), PipelineError> {
    let mut attempt = 1;
    loop {
        match handler.handle(job).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                let delay = retry.backoff(attempt);
                tracing::warn!(
                    name = "queue.job_retry",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    target_id = job.target_id,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    message = "Job failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    name = "queue.job_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    target_id = job.target_id,
                    attempts = attempt,
                    error = %e,
                    message = "Job failed"
                );
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_base: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
    }

    #[test]
    fn backoff_saturates() {
        let policy = RetryPolicy {
            max_attempts: 100,
            backoff_base: Duration::MAX,
        };
        assert_eq!(policy.backoff(40), Duration::MAX);
    }
}
