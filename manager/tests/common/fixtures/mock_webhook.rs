//! Mock webhook server for testing notification delivery
//!
//! This simulates the endpoint that relays alert notifications, allowing
//! tests to verify payloads and retry behaviour.

use serde_json::Value;
use wiremock::{
    matchers::{method, path},
    Mock, MockBuilder, MockServer, ResponseTemplate,
};

fn webhook_post() -> MockBuilder {
    Mock::given(method("POST")).and(path("/webhook"))
}

/// Mock webhook server that records notification requests
pub struct MockWebhookServer {
    pub server: MockServer,
    pub base_url: String,
}

impl MockWebhookServer {
    /// Create a new mock webhook server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();
        Self { server, base_url }
    }

    /// Accept every notification
    pub async fn mock_success(&self) {
        webhook_post()
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// Reject every notification with `status_code`
    pub async fn mock_failure(&self, status_code: u16) {
        webhook_post()
            .respond_with(ResponseTemplate::new(status_code))
            .mount(&self.server)
            .await;
    }

    /// Reject the first `times` notifications, then accept
    pub async fn mock_failures_then_success(&self, status_code: u16, times: u64) {
        webhook_post()
            .respond_with(ResponseTemplate::new(status_code))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
        webhook_post()
            .respond_with(ResponseTemplate::new(200))
            .with_priority(2)
            .mount(&self.server)
            .await;
    }

    /// Bodies of every request received so far, in arrival order
    pub async fn get_captured_requests(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| request.body_json::<Value>().ok())
            .collect()
    }

    /// Get the number of webhook requests received
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Get the webhook URL
    pub fn webhook_url(&self) -> String {
        format!("{}/webhook", self.base_url)
    }

    /// Verify a notification of `kind` was sent for `alert_id`
    pub async fn assert_notification_sent(&self, alert_id: &str, kind: &str) -> bool {
        self.get_captured_requests().await.iter().any(|body| {
            let notification = &body["notification"];
            notification["alertId"].as_str() == Some(alert_id)
                && notification["type"].as_str() == Some(kind)
        })
    }
}
