//! Queue health alerts
//!
//! Alerts are evaluated periodically against the live [`QueueService`] of
//! their connection. Each alert type maps to one measurement in
//! [`evaluators`]; all of them share the same hysteresis rule so a value
//! hovering around the threshold does not flap.
//!
//! The [`engine`] persists status transitions through an [`AlertStore`] and
//! hands notifications to a delivery queue under a per-alert cooldown.
//!
//! [`QueueService`]: crate::queue::QueueService

pub mod engine;
pub mod evaluators;
pub mod scheduler;

pub use engine::{
    should_send_notification, AlertEvaluationEngine, AlertStore, AlertTestResult, TickSummary,
};
pub use evaluators::{evaluate_alert, evaluate_alert_at, format_ms};
pub use scheduler::AlertScheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::alerts as limits;
use crate::errors::AlertError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    FailureRate,
    BacklogExceeded,
    ProcessingTimeAvg,
    ProcessingTimeP95,
    ProcessingTimeP99,
    MissingWorkers,
}

impl AlertType {
    pub const ALL: [AlertType; 6] = [
        AlertType::FailureRate,
        AlertType::BacklogExceeded,
        AlertType::ProcessingTimeAvg,
        AlertType::ProcessingTimeP95,
        AlertType::ProcessingTimeP99,
        AlertType::MissingWorkers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::FailureRate => "FailureRate",
            AlertType::BacklogExceeded => "BacklogExceeded",
            AlertType::ProcessingTimeAvg => "ProcessingTimeAvg",
            AlertType::ProcessingTimeP95 => "ProcessingTimeP95",
            AlertType::ProcessingTimeP99 => "ProcessingTimeP99",
            AlertType::MissingWorkers => "MissingWorkers",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    /// Human readable label used in notifications
    pub fn label(&self) -> &'static str {
        match self {
            AlertType::FailureRate => "Failure Rate",
            AlertType::BacklogExceeded => "Backlog Exceeded",
            AlertType::ProcessingTimeAvg => "Average Processing Time",
            AlertType::ProcessingTimeP95 => "P95 Processing Time",
            AlertType::ProcessingTimeP99 => "P99 Processing Time",
            AlertType::MissingWorkers => "Missing Workers",
        }
    }

    pub fn is_processing_time(&self) -> bool {
        matches!(
            self,
            AlertType::ProcessingTimeAvg | AlertType::ProcessingTimeP95 | AlertType::ProcessingTimeP99
        )
    }

    /// Render an observed value with the unit of this alert type
    pub fn format_value(&self, value: f64) -> String {
        match self {
            AlertType::FailureRate => format!("{:.1}%", value),
            AlertType::BacklogExceeded => format!("{} jobs", value.round()),
            AlertType::ProcessingTimeAvg
            | AlertType::ProcessingTimeP95
            | AlertType::ProcessingTimeP99 => format_ms(value),
            AlertType::MissingWorkers => format!("{} workers", value.round()),
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertStatus {
    #[default]
    #[serde(rename = "OK")]
    Ok,
    Triggered,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Ok => "OK",
            AlertStatus::Triggered => "Triggered",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OK" => Some(AlertStatus::Ok),
            "Triggered" => Some(AlertStatus::Triggered),
            _ => None,
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific thresholds of an alert
///
/// Which fields are meaningful depends on the [`AlertType`]; see
/// [`AlertConfig::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_minutes: Option<u32>,
}

impl AlertConfig {
    pub fn threshold(threshold: f64) -> Self {
        Self {
            threshold: Some(threshold),
            ..Self::default()
        }
    }

    pub fn with_window(mut self, minutes: u32) -> Self {
        self.time_window_minutes = Some(minutes);
        self
    }

    pub fn with_resolve_threshold(mut self, resolve_threshold: f64) -> Self {
        self.resolve_threshold = Some(resolve_threshold);
        self
    }

    pub fn time_window(&self) -> u32 {
        self.time_window_minutes
            .unwrap_or(limits::DEFAULT_TIME_WINDOW_MINUTES)
    }

    pub fn validate(&self, alert_type: AlertType) -> Result<(), AlertError> {
        match alert_type {
            AlertType::FailureRate => {
                let threshold = self.require_threshold()?;
                check_range("config.threshold", threshold, 0.0, 100.0)?;
                self.validate_window()?;
                if let Some(resolve) = self.resolve_threshold {
                    check_range("config.resolveThreshold", resolve, 0.0, 100.0)?;
                }
            }
            AlertType::BacklogExceeded => {
                check_min("config.threshold", self.require_threshold()?, 1.0)?;
                if let Some(resolve) = self.resolve_threshold {
                    check_min("config.resolveThreshold", resolve, 0.0)?;
                }
            }
            AlertType::ProcessingTimeAvg
            | AlertType::ProcessingTimeP95
            | AlertType::ProcessingTimeP99 => {
                check_min("config.threshold", self.require_threshold()?, 1.0)?;
                self.validate_window()?;
                if let Some(resolve) = self.resolve_threshold {
                    check_min("config.resolveThreshold", resolve, 0.0)?;
                }
            }
            // Grace period is unsigned, nothing else to check
            AlertType::MissingWorkers => {}
        }
        Ok(())
    }

    fn require_threshold(&self) -> Result<f64, AlertError> {
        match self.threshold {
            Some(threshold) if threshold.is_finite() => Ok(threshold),
            Some(_) => Err(AlertError::validation(
                "config.threshold",
                "must be a finite number",
            )),
            None => Err(AlertError::validation("config.threshold", "is required")),
        }
    }

    fn validate_window(&self) -> Result<(), AlertError> {
        let window = self
            .time_window_minutes
            .ok_or_else(|| AlertError::validation("config.timeWindowMinutes", "is required"))?;
        if !(limits::MIN_TIME_WINDOW_MINUTES..=limits::MAX_TIME_WINDOW_MINUTES).contains(&window) {
            return Err(AlertError::validation(
                "config.timeWindowMinutes",
                format!(
                    "must be between {} and {}",
                    limits::MIN_TIME_WINDOW_MINUTES,
                    limits::MAX_TIME_WINDOW_MINUTES
                ),
            ));
        }
        Ok(())
    }
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), AlertError> {
    if !value.is_finite() || value < min || value > max {
        return Err(AlertError::validation(
            field,
            format!("must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

fn check_min(field: &str, value: f64, min: f64) -> Result<(), AlertError> {
    if !value.is_finite() || value < min {
        return Err(AlertError::validation(
            field,
            format!("must be at least {}", min),
        ));
    }
    Ok(())
}

/// Persisted alert definition plus its evaluation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub connection_id: String,
    pub name: String,
    pub description: Option<String>,
    pub queue_name: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub config: AlertConfig,
    pub recipients: Vec<String>,
    pub cooldown_minutes: u32,
    pub enabled: bool,
    pub status: AlertStatus,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_resolved_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of one status transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertHistoryRecord {
    pub id: String,
    pub alert_id: String,
    pub status: AlertStatus,
    pub value: f64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one evaluator run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub status: AlertStatus,
    pub value: f64,
    pub message: String,
}

/// State written back to an alert after an evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvaluationUpdate {
    pub status: AlertStatus,
    pub value: f64,
    pub checked_at: DateTime<Utc>,
    /// Set only on an OK to Triggered transition
    pub triggered_at: Option<DateTime<Utc>>,
    /// Set only on a Triggered to OK transition
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    AlertTriggered,
    AlertResolved,
}

/// Message handed to the notification delivery queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub recipients: Vec<String>,
    pub alert_id: String,
    pub alert_name: String,
    pub alert_type: AlertType,
    pub queue_name: String,
    pub connection_name: String,
    pub status: AlertStatus,
    pub value: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
