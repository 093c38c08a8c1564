//! Alert dispatcher: decides which channels hear about an incident edge and
//! what they are told.

use crate::entity::{alert_configuration, incident, monitored_target};
use crate::error::NotifyError;
use crate::notify::{EmailTransport, WebhookTransport};
use askama::Template;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// JSON body posted to webhooks.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub incident_id: i32,
    pub target_id: i32,
    pub target_name: String,
    pub target_address: String,
    pub incident_kind: incident::IncidentKind,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub opened_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
    pub is_resolution: bool,
    /// Whole incident length in minutes, two decimals. Resolutions only.
    pub duration_minutes: Option<f64>,
}

/// Subject and HTML body of an alert email.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertEmail {
    pub subject: String,
    pub html: String,
}

#[derive(Template)]
#[template(path = "incident_down.html")]
struct IncidentDownTemplate<'a> {
    target_name: &'a str,
    target_address: &'a str,
    kind: String,
    description: &'a str,
    opened_at: String,
}

#[derive(Template)]
#[template(path = "incident_resolved.html")]
struct IncidentResolvedTemplate<'a> {
    target_name: &'a str,
    target_address: &'a str,
    description: &'a str,
    opened_at: String,
    resolved_at: String,
    duration: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelResult {
    NotConfigured,
    Sent,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchReport {
    /// The target has no alert configuration.
    NoConfiguration,
    /// The configuration opts out of this kind of edge.
    Suppressed,
    Attempted {
        email: ChannelResult,
        webhook: ChannelResult,
    },
}

impl DispatchReport {
    pub fn sends_attempted(&self) -> usize {
        match self {
            DispatchReport::Attempted { email, webhook } => [email, webhook]
                .iter()
                .filter(|c| !matches!(c, ChannelResult::NotConfigured))
                .count(),
            _ => 0,
        }
    }
}

pub struct AlertDispatcher {
    email: Arc<dyn EmailTransport>,
    webhook: Arc<dyn WebhookTransport>,
}

impl AlertDispatcher {
    pub fn new(email: Arc<dyn EmailTransport>, webhook: Arc<dyn WebhookTransport>) -> Self {
        Self { email, webhook }
    }

    /// Notifies the configured channels about an opening or a resolution.
    ///
    /// Never fails: channel errors are logged and reported, and one channel
    /// failing does not stop the other.
    #[tracing::instrument(skip_all, fields(target_id = target.id, incident_id = incident.id, is_resolution = is_resolution))]
    pub async fn dispatch(
        &self,
        target: &monitored_target::Model,
        config: Option<&alert_configuration::Model>,
        incident: &incident::Model,
        is_resolution: bool,
    ) -> DispatchReport {
        let Some(config) = config else {
            tracing::debug!(
                name = "dispatcher.no_configuration",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                target_id = target.id,
                message = "No alert configuration, skipping notification"
            );
            return DispatchReport::NoConfiguration;
        };

        let wanted = if is_resolution {
            config.notify_on_up
        } else {
            config.notify_on_down
        };
        if !wanted {
            return DispatchReport::Suppressed;
        }

        let payload = alert_payload(target, incident, is_resolution);

        let email = async {
            let Some(to) = config.email_recipient.as_deref() else {
                return ChannelResult::NotConfigured;
            };
            let sent = match AlertEmail::render(&payload) {
                Ok(mail) => self.email.send_email(to, &mail.subject, &mail.html).await,
                Err(e) => Err(e),
            };
            match sent {
                Ok(()) => ChannelResult::Sent,
                Err(e) => {
                    tracing::error!(
                        name = "dispatcher.email_failed",
                        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                        target_id = target.id,
                        incident_id = incident.id,
                        error = %e,
                        message = "Failed to send alert email"
                    );
                    ChannelResult::Failed(e.to_string())
                }
            }
        };

        let webhook = async {
            let Some(url) = config.webhook_url.as_deref() else {
                return ChannelResult::NotConfigured;
            };
            let body = match serde_json::to_value(&payload) {
                Ok(body) => body,
                Err(e) => return ChannelResult::Failed(e.to_string()),
            };
            match self.webhook.send_webhook(url, &body).await {
                Ok(()) => ChannelResult::Sent,
                Err(e) => {
                    tracing::error!(
                        name = "dispatcher.webhook_failed",
                        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                        target_id = target.id,
                        incident_id = incident.id,
                        error = %e,
                        message = "Failed to deliver alert webhook"
                    );
                    ChannelResult::Failed(e.to_string())
                }
            }
        };

        let (email, webhook) = tokio::join!(email, webhook);
        tracing::info!(
            name = "dispatcher.dispatched",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            target_id = target.id,
            incident_id = incident.id,
            email = ?email,
            webhook = ?webhook,
            message = "Alert dispatched"
        );
        DispatchReport::Attempted { email, webhook }
    }
}

/// Webhook body for an incident edge. `duration_minutes` is only set on
/// resolutions.
pub fn alert_payload(
    target: &monitored_target::Model,
    incident: &incident::Model,
    is_resolution: bool,
) -> AlertPayload {
    let duration_minutes = incident.resolved_at.filter(|_| is_resolution).map(|resolved| {
        let minutes = (resolved - incident.opened_at).as_seconds_f64() / 60.0;
        (minutes * 100.0).round() / 100.0
    });

    AlertPayload {
        incident_id: incident.id,
        target_id: target.id,
        target_name: target.name.clone(),
        target_address: target.address.clone(),
        incident_kind: incident.kind,
        description: incident.description.clone(),
        opened_at: incident.opened_at,
        resolved_at: incident.resolved_at,
        is_resolution,
        duration_minutes,
    }
}

impl AlertEmail {
    #[tracing::instrument(skip_all, fields(incident_id = payload.incident_id))]
    pub fn render(payload: &AlertPayload) -> Result<Self, NotifyError> {
        let opened_at = format_timestamp(payload.opened_at);
        let (subject, html) = if payload.is_resolution {
            let html = IncidentResolvedTemplate {
                target_name: &payload.target_name,
                target_address: &payload.target_address,
                description: &payload.description,
                opened_at,
                resolved_at: payload
                    .resolved_at
                    .map(format_timestamp)
                    .unwrap_or_else(|| "N/A".into()),
                duration: payload
                    .duration_minutes
                    .map(|m| format!("{m:.2} minutes"))
                    .unwrap_or_else(|| "N/A".into()),
            }
            .render();
            (format!("RESOLVED: {} is back online", payload.target_name), html)
        } else {
            let html = IncidentDownTemplate {
                target_name: &payload.target_name,
                target_address: &payload.target_address,
                kind: payload.incident_kind.to_string(),
                description: &payload.description,
                opened_at,
            }
            .render();
            (format!("ALERT: {} is down", payload.target_name), html)
        };

        Ok(Self {
            subject,
            html: html.map_err(|e| NotifyError::EmailBuild(e.to_string()))?,
        })
    }
}

fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::incident::IncidentKind;
    use time::macros::datetime;

    fn target() -> monitored_target::Model {
        monitored_target::Model {
            id: 3,
            name: "Shop <prod>".into(),
            address: "https://shop.example.com".into(),
            interval_secs: 60,
            active: true,
            created_at: datetime!(2026-10-01 00:00 UTC),
            updated_at: datetime!(2026-10-01 00:00 UTC),
        }
    }

    fn incident(resolved_at: Option<OffsetDateTime>) -> incident::Model {
        incident::Model {
            id: 9,
            target_id: 3,
            kind: IncidentKind::Unreachable,
            description: "Target is unreachable: timeout".into(),
            opened_at: datetime!(2026-10-01 12:00 UTC),
            resolved_at,
        }
    }

    #[test]
    fn opening_email() {
        let payload = alert_payload(&target(), &incident(None), false);
        assert_eq!(payload.duration_minutes, None);
        assert!(!payload.is_resolution);

        let mail = AlertEmail::render(&payload).unwrap();
        assert_eq!(mail.subject, "ALERT: Shop <prod> is down");
        assert!(mail.html.contains("Shop &lt;prod&gt; is down"));
        assert!(!mail.html.contains("<prod>"));
        assert!(mail.html.contains("Incident type: unreachable"));
        assert!(mail.html.contains("2026-10-01T12:00:00Z"));
    }

    #[test]
    fn resolution_email_carries_duration() {
        let inc = incident(Some(datetime!(2026-10-01 12:07:30 UTC)));
        let payload = alert_payload(&target(), &inc, true);
        assert_eq!(payload.duration_minutes, Some(7.5));

        let mail = AlertEmail::render(&payload).unwrap();
        assert_eq!(mail.subject, "RESOLVED: Shop <prod> is back online");
        assert!(mail.html.contains("Shop &lt;prod&gt; is back online"));
        assert!(mail.html.contains("Duration: 7.50 minutes"));
        assert!(mail.html.contains("Resolved: 2026-10-01T12:07:30Z"));
    }

    #[test]
    fn payload_uses_camel_case_keys() {
        let inc = incident(Some(datetime!(2026-10-01 12:01 UTC)));
        let json = serde_json::to_value(alert_payload(&target(), &inc, true)).unwrap();
        assert_eq!(json["incidentId"], 9);
        assert_eq!(json["targetName"], "Shop <prod>");
        assert_eq!(json["incidentKind"], "unreachable");
        assert_eq!(json["isResolution"], true);
        assert_eq!(json["openedAt"], "2026-10-01T12:00:00Z");
        assert_eq!(json["resolvedAt"], "2026-10-01T12:01:00Z");
    }
}
