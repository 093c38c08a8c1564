//! Uptime aggregation over stored check outcomes.

use crate::entity::check_outcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use time::{Duration, OffsetDateTime, UtcOffset};
use utoipa::ToSchema;

/// Bucket width for uptime reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UptimePeriod {
    Hour,
    Day,
    /// Weeks start on Monday.
    Week,
    Month,
}

impl FromStr for UptimePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(UptimePeriod::Hour),
            "day" => Ok(UptimePeriod::Day),
            "week" => Ok(UptimePeriod::Week),
            "month" => Ok(UptimePeriod::Month),
            other => Err(format!(
                "Invalid period '{other}', expected one of hour, day, week, month"
            )),
        }
    }
}

impl UptimePeriod {
    /// Start of the UTC-aligned bucket containing `at`.
    pub fn bucket_start(self, at: OffsetDateTime) -> OffsetDateTime {
        let at = at.to_offset(UtcOffset::UTC);
        let date = at.date();
        match self {
            UptimePeriod::Hour => {
                date.midnight().assume_utc() + Duration::hours(i64::from(at.hour()))
            }
            UptimePeriod::Day => date.midnight().assume_utc(),
            UptimePeriod::Week => {
                let back = i64::from(date.weekday().number_days_from_monday());
                (date - Duration::days(back)).midnight().assume_utc()
            }
            UptimePeriod::Month => {
                let back = i64::from(date.day()) - 1;
                (date - Duration::days(back)).midnight().assume_utc()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct UptimeBucket {
    #[serde(with = "time::serde::rfc3339")]
    pub bucket_start: OffsetDateTime,
    pub total_checks: u64,
    pub reachable_checks: u64,
    /// 0-100, two decimals.
    pub uptime_percent: f64,
    pub avg_latency_ms: f64,
}

#[derive(Default)]
struct Tally {
    total: u64,
    reachable: u64,
    latency_sum: i64,
}

/// Groups outcomes into ascending buckets. Empty input gives no buckets.
pub fn uptime_buckets(outcomes: &[check_outcome::Model], period: UptimePeriod) -> Vec<UptimeBucket> {
    let mut tallies: BTreeMap<OffsetDateTime, Tally> = BTreeMap::new();
    for outcome in outcomes {
        let tally = tallies.entry(period.bucket_start(outcome.checked_at)).or_default();
        tally.total += 1;
        tally.latency_sum += outcome.latency_ms;
        if outcome.reachable {
            tally.reachable += 1;
        }
    }

    tallies
        .into_iter()
        .map(|(bucket_start, t)| UptimeBucket {
            bucket_start,
            total_checks: t.total,
            reachable_checks: t.reachable,
            uptime_percent: round2(t.reachable as f64 * 100.0 / t.total as f64),
            avg_latency_ms: round2(t.latency_sum as f64 / t.total as f64),
        })
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
