//! Monitored target management (`/api/targets`).

use crate::AppResources;
use crate::entity::monitored_target;
use crate::error::ApiError;
use crate::store::{NewTarget, TargetChanges};
use crate::validation::target::{validate_address, validate_interval, validate_name};
use axum::{Extension, Json, extract::Path, response::IntoResponse};
use hyper::StatusCode;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

pub const TARGETS_TAG: &str = "Targets";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTarget {
    pub name: String,
    /// Absolute http(s) URL probed with `GET`.
    pub address: String,
    /// Seconds between checks. Must be at least the configured floor.
    pub interval_secs: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateTarget {
    pub name: Option<String>,
    pub address: Option<String>,
    pub interval_secs: Option<i32>,
    pub active: Option<bool>,
}

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(create_target, list_targets))
        .routes(routes!(get_target, update_target, delete_target))
}

#[tracing::instrument(skip(resources, payload), fields(name = %payload.name))]
#[utoipa::path(
    post,
    path = "/api/targets",
    tag = TARGETS_TAG,
    operation_id = "Create Target",
    summary = "Register a target",
    description = "Stores the target, runs one check before responding and schedules recurring checks if the target is active.",
    request_body = CreateTarget,
    responses(
        (status = 201, description = "Target created", body = monitored_target::Model),
        (status = 400, description = "Validation failed", content_type = "application/json")
    )
)]
async fn create_target(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<CreateTarget>,
) -> Result<impl IntoResponse, ApiError> {
    validate_name(&payload.name)?;
    validate_address(&payload.address)?;
    validate_interval(payload.interval_secs, resources.config.monitoring.min_interval_secs)?;

    let target = resources
        .store
        .create_target(NewTarget {
            name: payload.name.trim().to_string(),
            address: payload.address.trim().to_string(),
            interval_secs: payload.interval_secs,
            active: payload.active,
        })
        .await?;

    if target.active {
        if let Some(Err(e)) = resources.scheduler.check_now(&target).await {
            tracing::warn!(
                name = "api.targets.initial_check_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                target_id = target.id,
                error = %e,
                message = "Initial check could not be stored"
            );
        }
        resources.scheduler.schedule(&target).await;
    }

    tracing::info!(
        name = "api.targets.created",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        target_id = target.id,
        address = %target.address,
        message = "Target created"
    );
    Ok((StatusCode::CREATED, Json(target)))
}

#[utoipa::path(
    get,
    path = "/api/targets",
    tag = TARGETS_TAG,
    operation_id = "List Targets",
    responses((status = 200, description = "All targets", body = Vec<monitored_target::Model>))
)]
async fn list_targets(
    Extension(resources): Extension<AppResources>,
) -> Result<Json<Vec<monitored_target::Model>>, ApiError> {
    Ok(Json(resources.store.list_targets().await?))
}

#[utoipa::path(
    get,
    path = "/api/targets/{id}",
    tag = TARGETS_TAG,
    operation_id = "Get Target",
    params(("id" = i32, Path, description = "Target id")),
    responses(
        (status = 200, description = "The target", body = monitored_target::Model),
        (status = 404, description = "No such target", content_type = "application/json")
    )
)]
async fn get_target(
    Extension(resources): Extension<AppResources>,
    Path(id): Path<i32>,
) -> Result<Json<monitored_target::Model>, ApiError> {
    resources
        .store
        .get_target(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Target not found".into()))
}

#[tracing::instrument(skip(resources, payload))]
#[utoipa::path(
    put,
    path = "/api/targets/{id}",
    tag = TARGETS_TAG,
    operation_id = "Update Target",
    summary = "Partially update a target",
    description = "Only the supplied fields change. Changing the address, interval or active flag re-registers the schedule.",
    params(("id" = i32, Path, description = "Target id")),
    request_body = UpdateTarget,
    responses(
        (status = 200, description = "Updated target", body = monitored_target::Model),
        (status = 400, description = "Validation failed", content_type = "application/json"),
        (status = 404, description = "No such target", content_type = "application/json")
    )
)]
async fn update_target(
    Extension(resources): Extension<AppResources>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateTarget>,
) -> Result<Json<monitored_target::Model>, ApiError> {
    if let Some(name) = &payload.name {
        validate_name(name)?;
    }
    if let Some(address) = &payload.address {
        validate_address(address)?;
    }
    if let Some(interval_secs) = payload.interval_secs {
        validate_interval(interval_secs, resources.config.monitoring.min_interval_secs)?;
    }

    let schedule_changed = payload.address.is_some()
        || payload.interval_secs.is_some()
        || payload.active.is_some();

    let updated = resources
        .store
        .update_target(
            id,
            TargetChanges {
                name: payload.name.map(|n| n.trim().to_string()),
                address: payload.address.map(|a| a.trim().to_string()),
                interval_secs: payload.interval_secs,
                active: payload.active,
            },
        )
        .await?;

    if schedule_changed {
        resources.scheduler.reschedule(&updated).await;
    }
    Ok(Json(updated))
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    delete,
    path = "/api/targets/{id}",
    tag = TARGETS_TAG,
    operation_id = "Delete Target",
    summary = "Delete a target",
    description = "Stops scheduling and removes the target with its alert configuration. Check history and incidents are kept.",
    params(("id" = i32, Path, description = "Target id")),
    responses(
        (status = 204, description = "Target deleted"),
        (status = 404, description = "No such target", content_type = "application/json")
    )
)]
async fn delete_target(
    Extension(resources): Extension<AppResources>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    resources.scheduler.unschedule(id).await;
    resources.store.delete_target(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
