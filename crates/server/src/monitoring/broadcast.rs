//! Fan-out of fresh check results to connected viewers.

use crate::entity::{TargetId, check_outcome};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use utoipa::ToSchema;

/// Published after every persisted check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct CheckEvent {
    pub target_id: TargetId,
    pub status_code: Option<i32>,
    pub latency_ms: i64,
    pub reachable: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}

impl From<&check_outcome::Model> for CheckEvent {
    fn from(outcome: &check_outcome::Model) -> Self {
        Self {
            target_id: outcome.target_id,
            status_code: outcome.status_code,
            latency_ms: outcome.latency_ms,
            reachable: outcome.reachable,
            checked_at: outcome.checked_at,
        }
    }
}

/// Fire-and-forget publisher. Slow subscribers lag and lose events; nobody
/// listening is not an error.
#[derive(Clone, Debug)]
pub struct ResultBroadcaster {
    tx: broadcast::Sender<CheckEvent>,
}

impl ResultBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CheckEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: CheckEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!(
                name = "broadcast.no_subscribers",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "Check result dropped, no subscribers"
            );
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
