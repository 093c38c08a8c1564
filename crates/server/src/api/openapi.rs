use crate::api::{ALERT_CONFIGS_TAG, CHECKS_TAG, EVENTS_TAG, MISC_TAG, TARGETS_TAG};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "pulsewatch API",
        version = "1.0.0",
        description = "Register endpoints, inspect their check history and incidents, and configure alerts."
    ),
    tags(
        (name = TARGETS_TAG, description = "Monitored targets"),
        (name = ALERT_CONFIGS_TAG, description = "Email and webhook alert settings"),
        (name = CHECKS_TAG, description = "Check history, uptime and incidents"),
        (name = EVENTS_TAG, description = "Live check results"),
        (name = MISC_TAG, description = "Miscellaneous endpoints")
    )
)]
pub struct ApiDoc;
