use crate::error::NotifyError;
use crate::http_client::{HttpClient, USER_AGENT, build_http_client};
use crate::notify::WebhookTransport;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Request, header};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts JSON payloads. Any non-2xx response is a failure.
#[derive(Clone)]
pub struct HttpWebhookSender {
    client: HttpClient,
    timeout: Duration,
}

impl Default for HttpWebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpWebhookSender {
    pub fn new() -> Self {
        Self {
            client: build_http_client(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookSender {
    #[tracing::instrument(skip(self, payload))]
    async fn send_webhook(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(payload).map_err(|e| NotifyError::Webhook(e.to_string()))?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, USER_AGENT)
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| NotifyError::InvalidAddress {
                address: url.to_string(),
                reason: e.to_string(),
            })?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| NotifyError::Webhook("request timed out".into()))?
            .map_err(|e| NotifyError::Webhook(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::WebhookStatus(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_json_payload() {
        let server = MockServer::start().await;
        let payload = json!({ "incidentId": 1, "isResolution": false });
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_eq("content-type", "application/json"))
            .and(body_json(&payload))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sender = HttpWebhookSender::new();
        sender
            .send_webhook(&format!("{}/hook", server.uri()), &payload)
            .await
            .expect("webhook delivered");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = HttpWebhookSender::new()
            .send_webhook(&server.uri(), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::WebhookStatus(s) if s.as_u16() == 500));
    }

    #[tokio::test]
    async fn invalid_url_is_rejected() {
        let err = HttpWebhookSender::new()
            .send_webhook("not a url", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::InvalidAddress { .. }));
    }
}
