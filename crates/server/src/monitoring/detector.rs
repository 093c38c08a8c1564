//! Transition detector.
//!
//! A target is a two-state machine (up, down). Only edges between two
//! consecutive outcomes open or close incidents; repeated outcomes in the same
//! state never do.

use crate::entity::{check_outcome, incident};
use time::OffsetDateTime;

/// What the newest outcome means for the target's incident state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    None,
    /// An up to down edge, or a first-ever check that is already down.
    Opened { description: String },
    /// A down to up edge while an incident is open.
    Closed {
        incident: incident::Model,
        resolved_at: OffsetDateTime,
    },
}

impl Transition {
    pub fn is_none(&self) -> bool {
        matches!(self, Transition::None)
    }
}

/// Decides the transition for `current` given the immediately preceding
/// outcome of the same target and the currently open incident, if any.
///
/// Pure: performs no IO and never mutates its inputs.
pub fn detect(
    previous: Option<&check_outcome::Model>,
    current: &check_outcome::Model,
    open: Option<&incident::Model>,
) -> Transition {
    let was_up = previous.is_none_or(|p| p.reachable);

    match (was_up, current.reachable) {
        (true, false) => {
            // An incident left open by an earlier run keeps covering this outage.
            if open.is_some() {
                return Transition::None;
            }
            Transition::Opened {
                description: describe_outage(current),
            }
        }
        (false, true) => match open {
            Some(incident) => Transition::Closed {
                incident: incident.clone(),
                resolved_at: current.checked_at,
            },
            None => Transition::None,
        },
        _ => Transition::None,
    }
}

fn describe_outage(current: &check_outcome::Model) -> String {
    let reason = current.error.as_deref().unwrap_or("unknown error");
    match current.status_code {
        Some(code) => format!("Target is unreachable (HTTP {code}): {reason}"),
        None => format!("Target is unreachable: {reason}"),
    }
}
