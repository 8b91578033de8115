use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::evaluators::evaluate_alert_at;
use super::{
    Alert, AlertEvaluationUpdate, AlertHistoryRecord, AlertNotification, AlertStatus,
    EvaluationResult, NotificationKind,
};
use crate::connection::ConnectionManager;
use crate::errors::{AlertError, ConnectionError, ManagerError};
use crate::queue::QueueService;

/// Persistence the engine needs from the alert store
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn list_enabled_alerts(&self) -> Result<Vec<Alert>>;

    async fn get_alert(&self, id: &str) -> Result<Option<Alert>>;

    /// Store an evaluation that left the status unchanged
    async fn record_evaluation(&self, alert_id: &str, update: &AlertEvaluationUpdate) -> Result<()>;

    /// Store a status change and its history entry as one unit; on error
    /// neither is persisted
    async fn record_transition(
        &self,
        alert_id: &str,
        update: &AlertEvaluationUpdate,
        result: &EvaluationResult,
    ) -> Result<AlertHistoryRecord>;
}

/// Aggregate counts for one evaluation tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub processed: u32,
    pub triggered: u32,
    pub resolved: u32,
    pub skipped: u32,
    pub errors: u32,
}

impl TickSummary {
    fn merge(&mut self, other: TickSummary) {
        self.processed += other.processed;
        self.triggered += other.triggered;
        self.resolved += other.resolved;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

/// Result of a manual "test this alert now" action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertTestResult {
    pub alert_id: String,
    pub alert_name: String,
    pub current_status: AlertStatus,
    pub evaluation: EvaluationResult,
}

/// Whether a status transition should produce a notification
///
/// Resolutions always notify. A trigger notifies when the alert never
/// triggered before or the cooldown since the previous trigger has elapsed.
pub fn should_send_notification(
    previous: AlertStatus,
    next: AlertStatus,
    last_triggered_at: Option<DateTime<Utc>>,
    cooldown_minutes: u32,
    now: DateTime<Utc>,
) -> bool {
    match (previous, next) {
        (AlertStatus::Triggered, AlertStatus::Ok) => true,
        (AlertStatus::Ok, AlertStatus::Triggered) => match last_triggered_at {
            None => true,
            Some(last) => now - last >= ChronoDuration::minutes(i64::from(cooldown_minutes)),
        },
        _ => false,
    }
}

enum Outcome {
    Unchanged,
    Triggered,
    Resolved,
}

/// Evaluates enabled alerts against live connections
pub struct AlertEvaluationEngine {
    store: Arc<dyn AlertStore>,
    connections: Arc<ConnectionManager>,
    notifications: mpsc::UnboundedSender<AlertNotification>,
}

impl AlertEvaluationEngine {
    pub fn new(
        store: Arc<dyn AlertStore>,
        connections: Arc<ConnectionManager>,
        notifications: mpsc::UnboundedSender<AlertNotification>,
    ) -> Self {
        Self {
            store,
            connections,
            notifications,
        }
    }

    pub async fn tick(&self) -> Result<TickSummary> {
        self.tick_at(Utc::now()).await
    }

    /// Run one evaluation pass with `now` as the reference time
    ///
    /// Alerts sharing a connection are evaluated one after another; distinct
    /// connections run concurrently. A failing alert is counted and does not
    /// stop the pass.
    #[instrument(skip(self))]
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let alerts = self
            .store
            .list_enabled_alerts()
            .await
            .context("Failed to load enabled alerts")?;
        info!("Evaluating {} enabled alerts", alerts.len());

        let mut by_connection: BTreeMap<String, Vec<Alert>> = BTreeMap::new();
        for alert in alerts {
            by_connection
                .entry(alert.connection_id.clone())
                .or_default()
                .push(alert);
        }

        let groups = by_connection
            .into_iter()
            .map(|(connection_id, alerts)| self.evaluate_group(connection_id, alerts, now));

        let mut summary = TickSummary::default();
        for group in join_all(groups).await {
            summary.merge(group);
        }

        info!(
            "Alert tick completed: {} processed, {} triggered, {} resolved, {} skipped, {} errors",
            summary.processed, summary.triggered, summary.resolved, summary.skipped, summary.errors
        );
        Ok(summary)
    }

    async fn evaluate_group(
        &self,
        connection_id: String,
        alerts: Vec<Alert>,
        now: DateTime<Utc>,
    ) -> TickSummary {
        let mut summary = TickSummary::default();

        let Some(service) = self.connections.get_connection(&connection_id).await else {
            debug!(
                "Skipping {} alerts for connection {}: not connected",
                alerts.len(),
                connection_id
            );
            summary.skipped = alerts.len() as u32;
            return summary;
        };

        let connection_name = self
            .connections
            .get_config(&connection_id)
            .await
            .map(|config| config.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| connection_id.clone());

        for alert in &alerts {
            match self
                .process_alert(alert, service.as_ref(), &connection_name, now)
                .await
            {
                Ok(outcome) => {
                    summary.processed += 1;
                    match outcome {
                        Outcome::Triggered => summary.triggered += 1,
                        Outcome::Resolved => summary.resolved += 1,
                        Outcome::Unchanged => {}
                    }
                }
                Err(e) => {
                    error!("Error evaluating alert {}: {:#}", alert.id, e);
                    summary.errors += 1;
                }
            }
        }
        summary
    }

    async fn process_alert(
        &self,
        alert: &Alert,
        service: &dyn QueueService,
        connection_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let result = evaluate_alert_at(
            alert.alert_type,
            &alert.config,
            &alert.queue_name,
            service,
            alert.status,
            now.timestamp_millis(),
        )
        .await?;

        let changed = result.status != alert.status;
        let update = AlertEvaluationUpdate {
            status: result.status,
            value: result.value,
            checked_at: now,
            triggered_at: (changed && result.status == AlertStatus::Triggered).then_some(now),
            resolved_at: (changed && result.status == AlertStatus::Ok).then_some(now),
        };
        if !changed {
            self.store
                .record_evaluation(&alert.id, &update)
                .await
                .with_context(|| format!("Failed to record evaluation for alert {}", alert.id))?;
            return Ok(Outcome::Unchanged);
        }

        // Status and history commit together; a failure leaves the old status
        self.store
            .record_transition(&alert.id, &update, &result)
            .await
            .with_context(|| format!("Failed to record transition for alert {}", alert.id))?;

        info!(
            "Alert {} ({}) {} -> {}: {}",
            alert.id, alert.name, alert.status, result.status, result.message
        );

        let notify = should_send_notification(
            alert.status,
            result.status,
            alert.last_triggered_at,
            alert.cooldown_minutes,
            now,
        );
        if notify && !alert.recipients.is_empty() {
            self.enqueue_notification(alert, connection_name, &result, now);
        } else if !notify {
            debug!("Notification for alert {} suppressed by cooldown", alert.id);
        }

        Ok(match result.status {
            AlertStatus::Triggered => Outcome::Triggered,
            AlertStatus::Ok => Outcome::Resolved,
        })
    }

    fn enqueue_notification(
        &self,
        alert: &Alert,
        connection_name: &str,
        result: &EvaluationResult,
        now: DateTime<Utc>,
    ) {
        let kind = match result.status {
            AlertStatus::Triggered => NotificationKind::AlertTriggered,
            AlertStatus::Ok => NotificationKind::AlertResolved,
        };
        let notification = AlertNotification {
            kind,
            recipients: alert.recipients.clone(),
            alert_id: alert.id.clone(),
            alert_name: alert.name.clone(),
            alert_type: alert.alert_type,
            queue_name: alert.queue_name.clone(),
            connection_name: connection_name.to_string(),
            status: result.status,
            value: result.value,
            message: result.message.clone(),
            timestamp: now,
        };

        if self.notifications.send(notification).is_err() {
            warn!(
                "Notification queue closed, dropping notification for alert {}",
                alert.id
            );
        }
    }

    /// Evaluate one alert now without persisting anything
    #[instrument(skip(self))]
    pub async fn test_alert(&self, alert_id: &str) -> Result<AlertTestResult, ManagerError> {
        let alert = self
            .store
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| AlertError::NotFound {
                id: alert_id.to_string(),
            })?;

        let Some(service) = self.connections.get_connection(&alert.connection_id).await else {
            let state = self
                .connections
                .get_status(&alert.connection_id)
                .await
                .map(|status| status.state.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(ConnectionError::Unavailable {
                id: alert.connection_id.clone(),
                state,
            }
            .into());
        };

        let evaluation = evaluate_alert_at(
            alert.alert_type,
            &alert.config,
            &alert.queue_name,
            service.as_ref(),
            alert.status,
            Utc::now().timestamp_millis(),
        )
        .await?;

        Ok(AlertTestResult {
            alert_id: alert.id,
            alert_name: alert.name,
            current_status: alert.status,
            evaluation,
        })
    }
}
