//! Live check results as Server-Sent Events.

use crate::AppResources;
use axum::Extension;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

pub const EVENTS_TAG: &str = "Events";

/// Name of the SSE event carrying a `CheckEvent` JSON body.
pub const CHECK_RESULT_EVENT: &str = "check_result";

#[utoipa::path(
    get,
    path = "/api/events",
    tag = EVENTS_TAG,
    operation_id = "Check Result Stream",
    summary = "Stream of new check results",
    description = "Each persisted check is pushed as a `check_result` event. Delivery is best effort: slow clients skip events.",
    responses(
        (status = 200, description = "Event stream", body = crate::monitoring::CheckEvent, content_type = "text/event-stream")
    )
)]
pub async fn events(
    Extension(resources): Extension<AppResources>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = resources.broadcaster.subscribe();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default().event(CHECK_RESULT_EVENT).json_data(&event);
                    return Some((sse, rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        name = "api.events.lagged",
                        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                        skipped = skipped,
                        message = "Event subscriber lagged"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
