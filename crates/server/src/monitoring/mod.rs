//! Scheduling, probing and incident detection.

pub mod broadcast;
pub mod detector;
pub mod dispatcher;
pub mod pipeline;
pub mod probe;
pub mod queue;
pub mod scheduler;

pub use broadcast::{CheckEvent, ResultBroadcaster};
pub use detector::{Transition, detect};
pub use dispatcher::{AlertDispatcher, DispatchReport};
pub use pipeline::{CheckPipeline, IncidentChange, PipelineReport};
pub use probe::{HttpProbe, Probe, ProbeFailure, ProbeOutcome};
pub use queue::{CheckJob, JobHandler, JobQueue, RetryPolicy, TriggerId};
pub use scheduler::RecurringScheduler;
