// File: manager/src/services/notification_service.rs
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertNotification, NotificationKind};
use crate::constants::notifications;

/// Rendered message POSTed to the notification webhook
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload<'a> {
    pub from: &'a str,
    pub to: &'a [String],
    pub subject: String,
    pub text: String,
    pub notification: &'a AlertNotification,
}

/// Delivers alert notifications to a webhook with exponential retry
pub struct NotificationService {
    webhook_url: String,
    sender: String,
    client: Client,
    attempts: u32,
    backoff: Duration,
}

impl NotificationService {
    pub fn new(webhook_url: String, sender: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(notifications::WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client for NotificationService: {}", e))?;

        Ok(Self {
            webhook_url,
            sender,
            client,
            attempts: notifications::DELIVERY_ATTEMPTS,
            backoff: notifications::DELIVERY_BACKOFF,
        })
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    pub fn get_webhook_url(&self) -> &str {
        &self.webhook_url
    }

    pub fn render_subject(notification: &AlertNotification) -> String {
        match notification.kind {
            NotificationKind::AlertTriggered => {
                format!("🚨 Alert Triggered: {}", notification.alert_name)
            }
            NotificationKind::AlertResolved => {
                format!("✅ Alert Resolved: {}", notification.alert_name)
            }
        }
    }

    pub fn render_text(notification: &AlertNotification) -> String {
        let status = match notification.kind {
            NotificationKind::AlertTriggered => "TRIGGERED",
            NotificationKind::AlertResolved => "RESOLVED",
        };

        format!(
            "Queue Manager Alert {status}\n\n\
             Alert: {name}\n\
             Type: {label}\n\
             Queue: {queue}\n\
             Connection: {connection}\n\
             Current Value: {value}\n\
             Time: {time}\n\n\
             {message}\n\n\
             ---\n\
             This is an automated alert from the queue manager.",
            status = status,
            name = notification.alert_name,
            label = notification.alert_type.label(),
            queue = notification.queue_name,
            connection = notification.connection_name,
            value = notification.alert_type.format_value(notification.value),
            time = notification.timestamp.to_rfc3339(),
            message = notification.message,
        )
    }

    /// Deliver one notification, retrying with exponential backoff
    ///
    /// Succeeds without sending anything when no webhook is configured.
    pub async fn deliver(&self, notification: &AlertNotification) -> Result<()> {
        if !self.is_enabled() {
            warn!(
                "No notification webhook configured, dropping {:?} for alert {}",
                notification.kind, notification.alert_id
            );
            return Ok(());
        }

        let payload = NotificationPayload {
            from: &self.sender,
            to: &notification.recipients,
            subject: Self::render_subject(notification),
            text: Self::render_text(notification),
            notification,
        };

        let mut attempt = 1;
        loop {
            match self.send_webhook(&payload).await {
                Ok(()) => {
                    info!(
                        "Notification sent for alert {} ({:?}) to {} recipients",
                        notification.alert_id,
                        notification.kind,
                        notification.recipients.len()
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.attempts => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        "Notification attempt {}/{} for alert {} failed: {}. Retrying in {}ms",
                        attempt,
                        self.attempts,
                        notification.alert_id,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(anyhow!(
                        "Notification for alert {} failed after {} attempts: {}",
                        notification.alert_id,
                        self.attempts,
                        e
                    ));
                }
            }
        }
    }

    /// Consume the notification queue until every sender is dropped
    pub fn spawn_worker(
        self: Arc<Self>,
        mut queue: mpsc::UnboundedReceiver<AlertNotification>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(notification) = queue.recv().await {
                if let Err(e) = self.deliver(&notification).await {
                    error!("{}", e);
                }
            }
            debug!("Notification queue closed, worker exiting");
        })
    }

    async fn send_webhook(&self, payload: &NotificationPayload<'_>) -> Result<()> {
        match timeout(
            notifications::WEBHOOK_TIMEOUT,
            self.client.post(&self.webhook_url).json(payload).send(),
        )
        .await
        {
            Ok(Ok(response)) if response.status().is_success() => Ok(()),
            Ok(Ok(response)) => Err(anyhow!("webhook returned status {}", response.status())),
            Ok(Err(e)) => Err(anyhow!("request failed: {}", e)),
            Err(_) => Err(anyhow!("webhook timeout")),
        }
    }
}
