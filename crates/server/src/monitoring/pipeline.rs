//! Check pipeline: the job handler run for every firing.
//!
//! probe -> persist outcome and incident change in one transaction -> dispatch
//! alerts -> broadcast. Only persistence failures fail a run, and a failed run
//! leaves nothing behind, so a retry sees the same previous outcome.

use crate::entity::incident::IncidentKind;
use crate::entity::{TargetId, check_outcome, incident};
use crate::error::PipelineError;
use crate::monitoring::broadcast::{CheckEvent, ResultBroadcaster};
use crate::monitoring::detector::{Transition, detect};
use crate::monitoring::dispatcher::{AlertDispatcher, DispatchReport};
use crate::monitoring::probe::Probe;
use crate::monitoring::queue::{CheckJob, JobHandler};
use crate::store::Store;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// What happened to the incident state during one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncidentChange {
    None,
    Opened(incident::Model),
    Resolved(incident::Model),
}

#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub outcome: check_outcome::Model,
    pub incident: IncidentChange,
    /// `None` when no transition happened or the target vanished mid-run.
    pub dispatch: Option<DispatchReport>,
}

pub struct CheckPipeline {
    store: Store,
    probe: Arc<dyn Probe>,
    dispatcher: AlertDispatcher,
    broadcaster: ResultBroadcaster,
    leases: DashMap<TargetId, Arc<Mutex<()>>>,
}

impl CheckPipeline {
    pub fn new(
        store: Store,
        probe: Arc<dyn Probe>,
        dispatcher: AlertDispatcher,
        broadcaster: ResultBroadcaster,
    ) -> Self {
        Self {
            store,
            probe,
            dispatcher,
            broadcaster,
            leases: DashMap::new(),
        }
    }

    fn lease(&self, target_id: TargetId) -> Arc<Mutex<()>> {
        self.leases.entry(target_id).or_default().clone()
    }

    /// Number of targets with a live lease entry.
    pub fn lease_count(&self) -> usize {
        self.leases.len()
    }

    /// Runs one check for `job`. Runs for the same target are serialized.
    #[tracing::instrument(skip(self, job), fields(target_id = job.target_id))]
    pub async fn run(&self, job: &CheckJob) -> Result<PipelineReport, PipelineError> {
        let lease = self.lease(job.target_id);
        let result = {
            let _held = lease.lock().await;
            self.run_leased(job).await
        };
        // Only the map and this run hold the lease: nobody is waiting on it.
        self.leases.remove_if(&job.target_id, |_, held| {
            Arc::ptr_eq(held, &lease) && Arc::strong_count(held) == 2
        });
        result
    }

    async fn run_leased(&self, job: &CheckJob) -> Result<PipelineReport, PipelineError> {
        let probed = self.probe.probe(&job.address, job.timeout).await;

        let tx = self.store.begin_check().await?;
        let outcome = tx.create_check_outcome(job.target_id, &probed).await?;
        let previous = tx.previous_outcome(job.target_id, outcome.id).await?;
        let open = tx.open_incident(job.target_id).await?;

        let incident = match detect(previous.as_ref(), &outcome, open.as_ref()) {
            Transition::None => IncidentChange::None,
            Transition::Opened { description } => IncidentChange::Opened(
                tx.create_incident(
                    job.target_id,
                    IncidentKind::Unreachable,
                    description,
                    outcome.checked_at,
                )
                .await?,
            ),
            Transition::Closed {
                incident,
                resolved_at,
            } => IncidentChange::Resolved(tx.resolve_incident(incident.id, resolved_at).await?),
        };
        tx.commit().await?;

        let dispatch = match &incident {
            IncidentChange::None => None,
            IncidentChange::Opened(opened) => {
                tracing::warn!(
                    name = "pipeline.incident_opened",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    target_id = job.target_id,
                    incident_id = opened.id,
                    description = %opened.description,
                    message = "Target went down"
                );
                self.notify(job.target_id, opened, false).await
            }
            IncidentChange::Resolved(resolved) => {
                tracing::info!(
                    name = "pipeline.incident_resolved",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    target_id = job.target_id,
                    incident_id = resolved.id,
                    message = "Target recovered"
                );
                self.notify(job.target_id, resolved, true).await
            }
        };

        self.broadcaster.publish(CheckEvent::from(&outcome));

        Ok(PipelineReport {
            outcome,
            incident,
            dispatch,
        })
    }

    /// Loads the target and its alert settings, then dispatches. The incident
    /// change is already durable here, so lookup failures are logged rather
    /// than failing the run.
    async fn notify(
        &self,
        target_id: TargetId,
        incident: &incident::Model,
        is_resolution: bool,
    ) -> Option<DispatchReport> {
        let lookup = async {
            let target = self.store.get_target(target_id).await?;
            let config = self.store.alert_configuration(target_id).await?;
            Ok::<_, crate::error::StoreError>((target, config))
        };

        match lookup.await {
            Ok((Some(target), config)) => Some(
                self.dispatcher
                    .dispatch(&target, config.as_ref(), incident, is_resolution)
                    .await,
            ),
            Ok((None, _)) => None,
            Err(e) => {
                tracing::error!(
                    name = "pipeline.alert_lookup_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    target_id = target_id,
                    incident_id = incident.id,
                    error = %e,
                    message = "Could not load alert settings, notification skipped"
                );
                None
            }
        }
    }
}

#[async_trait]
impl JobHandler for CheckPipeline {
    async fn handle(&self, job: &CheckJob) -> Result<(), PipelineError> {
        self.run(job).await.map(|_| ())
    }
}
