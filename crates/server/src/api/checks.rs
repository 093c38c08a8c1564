//! Check history, latest status, uptime and incidents (`/api/checks`).

use crate::AppResources;
use crate::entity::{check_outcome, incident, monitored_target};
use crate::error::ApiError;
use crate::stats::{UptimeBucket, UptimePeriod, uptime_buckets};
use crate::store::HistoryQuery;
use axum::{
    Extension, Json,
    extract::{Path, Query},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

pub const CHECKS_TAG: &str = "Checks";

const DEFAULT_TAKE: u64 = 100;
const MAX_TAKE: u64 = 1000;

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryParams {
    /// RFC 3339 lower bound (inclusive).
    pub start: Option<String>,
    /// RFC 3339 upper bound (inclusive).
    pub end: Option<String>,
    /// Page size, at most 1000.
    pub take: Option<u64>,
    pub skip: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UptimeParams {
    /// hour, day, week or month
    pub period: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LatestStatus {
    pub target: monitored_target::Model,
    pub latest: Option<check_outcome::Model>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UptimeReport {
    pub target_id: i32,
    pub period: UptimePeriod,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
    pub buckets: Vec<UptimeBucket>,
}

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(latest))
        .routes(routes!(history))
        .routes(routes!(uptime))
        .routes(routes!(incidents))
}

fn parse_timestamp(field: &str, value: &str) -> Result<OffsetDateTime, ApiError> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|e| {
        ApiError::Validation(format!("{field} must be an RFC 3339 timestamp: {e}"))
    })
}

fn parse_optional(field: &str, value: Option<&str>) -> Result<Option<OffsetDateTime>, ApiError> {
    value.map(|v| parse_timestamp(field, v)).transpose()
}

async fn require_target(resources: &AppResources, target_id: i32) -> Result<(), ApiError> {
    match resources.store.get_target(target_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::NotFound("Target not found".into())),
    }
}

#[utoipa::path(
    get,
    path = "/api/checks/latest",
    tag = CHECKS_TAG,
    operation_id = "Latest Checks",
    summary = "Latest outcome for every target",
    responses((status = 200, description = "One entry per target", body = Vec<LatestStatus>))
)]
async fn latest(
    Extension(resources): Extension<AppResources>,
) -> Result<Json<Vec<LatestStatus>>, ApiError> {
    let latest = resources
        .store
        .latest_outcomes()
        .await?
        .into_iter()
        .map(|(target, latest)| LatestStatus { target, latest })
        .collect();
    Ok(Json(latest))
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/api/checks/{target_id}/history",
    tag = CHECKS_TAG,
    operation_id = "Check History",
    summary = "Stored outcomes, newest first",
    params(("target_id" = i32, Path, description = "Target id"), HistoryParams),
    responses(
        (status = 200, description = "Outcomes", body = Vec<check_outcome::Model>),
        (status = 400, description = "Bad query parameters", content_type = "application/json"),
        (status = 404, description = "No such target", content_type = "application/json")
    )
)]
async fn history(
    Extension(resources): Extension<AppResources>,
    Path(target_id): Path<i32>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<check_outcome::Model>>, ApiError> {
    let query = HistoryQuery {
        start: parse_optional("start", params.start.as_deref())?,
        end: parse_optional("end", params.end.as_deref())?,
        take: params.take.unwrap_or(DEFAULT_TAKE).min(MAX_TAKE),
        skip: params.skip.unwrap_or(0),
    };
    require_target(&resources, target_id).await?;
    Ok(Json(resources.store.check_history(target_id, &query).await?))
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/api/checks/{target_id}/uptime",
    tag = CHECKS_TAG,
    operation_id = "Uptime",
    summary = "Uptime buckets between two timestamps",
    params(("target_id" = i32, Path, description = "Target id"), UptimeParams),
    responses(
        (status = 200, description = "Uptime report", body = UptimeReport),
        (status = 400, description = "Missing or invalid period, start or end", content_type = "application/json"),
        (status = 404, description = "No such target", content_type = "application/json")
    )
)]
async fn uptime(
    Extension(resources): Extension<AppResources>,
    Path(target_id): Path<i32>,
    Query(params): Query<UptimeParams>,
) -> Result<Json<UptimeReport>, ApiError> {
    let (Some(period), Some(start), Some(end)) = (
        params.period.as_deref(),
        params.start.as_deref(),
        params.end.as_deref(),
    ) else {
        return Err(ApiError::Validation(
            "period, start and end are required".into(),
        ));
    };

    let period: UptimePeriod = period.parse().map_err(ApiError::Validation)?;
    let start = parse_timestamp("start", start)?;
    let end = parse_timestamp("end", end)?;
    if start > end {
        return Err(ApiError::Validation("start must not be after end".into()));
    }

    require_target(&resources, target_id).await?;
    let outcomes = resources
        .store
        .outcomes_between(target_id, start, end)
        .await?;

    Ok(Json(UptimeReport {
        target_id,
        period,
        start,
        end,
        buckets: uptime_buckets(&outcomes, period),
    }))
}

#[utoipa::path(
    get,
    path = "/api/checks/{target_id}/incidents",
    tag = CHECKS_TAG,
    operation_id = "Incidents",
    summary = "Incidents for a target, newest first",
    params(("target_id" = i32, Path, description = "Target id")),
    responses((status = 200, description = "Incidents", body = Vec<incident::Model>))
)]
async fn incidents(
    Extension(resources): Extension<AppResources>,
    Path(target_id): Path<i32>,
) -> Result<Json<Vec<incident::Model>>, ApiError> {
    Ok(Json(resources.store.incidents_for_target(target_id).await?))
}
