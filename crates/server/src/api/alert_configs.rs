//! Per-target alert settings (`/api/alert-configurations`).

use crate::AppResources;
use crate::entity::alert_configuration;
use crate::error::ApiError;
use crate::store::{AlertConfigurationChanges, NewAlertConfiguration};
use crate::validation::target::{validate_address, validate_email};
use axum::{Extension, Json, extract::Path, response::IntoResponse};
use hyper::StatusCode;
use serde::{Deserialize, Deserializer};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

pub const ALERT_CONFIGS_TAG: &str = "Alert configurations";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAlertConfiguration {
    pub target_id: i32,
    pub email_recipient: Option<String>,
    pub webhook_url: Option<String>,
    #[serde(default = "default_true")]
    pub notify_on_down: bool,
    #[serde(default = "default_true")]
    pub notify_on_up: bool,
}

/// Omitted fields stay unchanged; `null` clears a channel.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateAlertConfiguration {
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub email_recipient: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub webhook_url: Option<Option<String>>,
    pub notify_on_down: Option<bool>,
    pub notify_on_up: Option<bool>,
}

fn default_true() -> bool {
    true
}

/// Distinguishes an explicit `null` from an absent field.
fn present<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

fn validate_channels(email: Option<&str>, webhook: Option<&str>) -> Result<(), ApiError> {
    if let Some(email) = email {
        validate_email(email)?;
    }
    if let Some(webhook) = webhook {
        validate_address(webhook)
            .map_err(|e| ApiError::Validation(format!("Invalid webhook URL: {e}")))?;
    }
    Ok(())
}

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(create_alert_configuration, list_alert_configurations))
        .routes(routes!(alert_configuration_for_target))
        .routes(routes!(update_alert_configuration, delete_alert_configuration))
}

#[tracing::instrument(skip(resources, payload), fields(target_id = payload.target_id))]
#[utoipa::path(
    post,
    path = "/api/alert-configurations",
    tag = ALERT_CONFIGS_TAG,
    operation_id = "Create Alert Configuration",
    request_body = CreateAlertConfiguration,
    responses(
        (status = 201, description = "Configuration created", body = alert_configuration::Model),
        (status = 400, description = "Validation failed", content_type = "application/json"),
        (status = 404, description = "No such target", content_type = "application/json"),
        (status = 409, description = "The target already has a configuration", content_type = "application/json")
    )
)]
async fn create_alert_configuration(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<CreateAlertConfiguration>,
) -> Result<impl IntoResponse, ApiError> {
    validate_channels(
        payload.email_recipient.as_deref(),
        payload.webhook_url.as_deref(),
    )?;
    let created = resources
        .store
        .create_alert_configuration(NewAlertConfiguration {
            target_id: payload.target_id,
            email_recipient: payload.email_recipient,
            webhook_url: payload.webhook_url,
            notify_on_down: payload.notify_on_down,
            notify_on_up: payload.notify_on_up,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/alert-configurations",
    tag = ALERT_CONFIGS_TAG,
    operation_id = "List Alert Configurations",
    responses((status = 200, description = "All configurations", body = Vec<alert_configuration::Model>))
)]
async fn list_alert_configurations(
    Extension(resources): Extension<AppResources>,
) -> Result<Json<Vec<alert_configuration::Model>>, ApiError> {
    Ok(Json(resources.store.list_alert_configurations().await?))
}

#[utoipa::path(
    get,
    path = "/api/alert-configurations/target/{target_id}",
    tag = ALERT_CONFIGS_TAG,
    operation_id = "Get Alert Configuration For Target",
    params(("target_id" = i32, Path, description = "Target id")),
    responses(
        (status = 200, description = "The target's configuration", body = alert_configuration::Model),
        (status = 404, description = "No configuration for this target", content_type = "application/json")
    )
)]
async fn alert_configuration_for_target(
    Extension(resources): Extension<AppResources>,
    Path(target_id): Path<i32>,
) -> Result<Json<alert_configuration::Model>, ApiError> {
    resources
        .store
        .alert_configuration(target_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Alert configuration not found".into()))
}

#[tracing::instrument(skip(resources, payload))]
#[utoipa::path(
    put,
    path = "/api/alert-configurations/{id}",
    tag = ALERT_CONFIGS_TAG,
    operation_id = "Update Alert Configuration",
    params(("id" = i32, Path, description = "Alert configuration id")),
    request_body = UpdateAlertConfiguration,
    responses(
        (status = 200, description = "Updated configuration", body = alert_configuration::Model),
        (status = 400, description = "Validation failed", content_type = "application/json"),
        (status = 404, description = "No such configuration", content_type = "application/json")
    )
)]
async fn update_alert_configuration(
    Extension(resources): Extension<AppResources>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateAlertConfiguration>,
) -> Result<Json<alert_configuration::Model>, ApiError> {
    validate_channels(
        payload.email_recipient.as_ref().and_then(Option::as_deref),
        payload.webhook_url.as_ref().and_then(Option::as_deref),
    )?;
    let updated = resources
        .store
        .update_alert_configuration(
            id,
            AlertConfigurationChanges {
                email_recipient: payload.email_recipient,
                webhook_url: payload.webhook_url,
                notify_on_down: payload.notify_on_down,
                notify_on_up: payload.notify_on_up,
            },
        )
        .await?;
    Ok(Json(updated))
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    delete,
    path = "/api/alert-configurations/{id}",
    tag = ALERT_CONFIGS_TAG,
    operation_id = "Delete Alert Configuration",
    params(("id" = i32, Path, description = "Alert configuration id")),
    responses(
        (status = 204, description = "Configuration deleted"),
        (status = 404, description = "No such configuration", content_type = "application/json")
    )
)]
async fn delete_alert_configuration(
    Extension(resources): Extension<AppResources>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    resources.store.delete_alert_configuration(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
