// File: manager/src/services/alert_service.rs
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::alerts::{
    Alert, AlertConfig, AlertEvaluationEngine, AlertHistoryRecord, AlertStatus, AlertTestResult,
    AlertType,
};
use crate::constants::alerts as limits;
use crate::database::{AlertFilter, Database};
use crate::errors::{AlertError, ConnectionError, ManagerError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlertInput {
    pub connection_id: String,
    pub name: String,
    pub description: Option<String>,
    pub queue_name: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub config: AlertConfig,
    pub recipients: Vec<String>,
    pub cooldown_minutes: Option<u32>,
    pub enabled: Option<bool>,
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAlertInput {
    pub name: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
    pub queue_name: Option<String>,
    #[serde(rename = "type")]
    pub alert_type: Option<AlertType>,
    pub config: Option<AlertConfig>,
    pub recipients: Option<Vec<String>>,
    pub cooldown_minutes: Option<u32>,
    pub enabled: Option<bool>,
}

/// Alert CRUD with validation, plus the manual test action
pub struct AlertService {
    database: Arc<Database>,
    engine: Arc<AlertEvaluationEngine>,
}

impl AlertService {
    pub fn new(database: Arc<Database>, engine: Arc<AlertEvaluationEngine>) -> Self {
        Self { database, engine }
    }

    pub async fn create_alert(&self, input: CreateAlertInput) -> Result<Alert, ManagerError> {
        if self
            .database
            .get_connection_by_id(&input.connection_id)
            .await?
            .is_none()
        {
            return Err(ConnectionError::NotFound {
                id: input.connection_id,
            }
            .into());
        }

        let now = Utc::now();
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            connection_id: input.connection_id,
            name: input.name.trim().to_string(),
            description: input.description,
            queue_name: input.queue_name,
            alert_type: input.alert_type,
            config: input.config,
            recipients: input.recipients,
            cooldown_minutes: input
                .cooldown_minutes
                .unwrap_or(limits::DEFAULT_COOLDOWN_MINUTES),
            enabled: input.enabled.unwrap_or(true),
            status: AlertStatus::Ok,
            last_triggered_at: None,
            last_resolved_at: None,
            last_checked_at: None,
            last_value: None,
            created_at: now,
            updated_at: now,
        };
        validate_alert(&alert)?;

        self.database.insert_alert(&alert).await?;
        info!(
            "Created {} alert '{}' on {}/{}",
            alert.alert_type, alert.name, alert.connection_id, alert.queue_name
        );
        Ok(alert)
    }

    pub async fn update_alert(
        &self,
        id: &str,
        input: UpdateAlertInput,
    ) -> Result<Alert, ManagerError> {
        let mut alert = self.require_alert(id).await?;

        if let Some(name) = input.name {
            alert.name = name.trim().to_string();
        }
        if let Some(description) = input.description {
            alert.description = description;
        }
        if let Some(queue_name) = input.queue_name {
            alert.queue_name = queue_name;
        }
        if let Some(alert_type) = input.alert_type {
            alert.alert_type = alert_type;
        }
        if let Some(config) = input.config {
            alert.config = config;
        }
        if let Some(recipients) = input.recipients {
            alert.recipients = recipients;
        }
        if let Some(cooldown_minutes) = input.cooldown_minutes {
            alert.cooldown_minutes = cooldown_minutes;
        }
        if let Some(enabled) = input.enabled {
            alert.enabled = enabled;
        }
        alert.updated_at = Utc::now();
        validate_alert(&alert)?;

        if !self.database.update_alert_definition(&alert).await? {
            return Err(AlertError::NotFound { id: id.to_string() }.into());
        }
        info!("Updated alert {} ('{}')", alert.id, alert.name);
        Ok(alert)
    }

    pub async fn delete_alert(&self, id: &str) -> Result<(), ManagerError> {
        if !self.database.delete_alert(id).await? {
            return Err(AlertError::NotFound { id: id.to_string() }.into());
        }
        info!("Deleted alert {}", id);
        Ok(())
    }

    pub async fn get_alert(&self, id: &str) -> Result<Alert, ManagerError> {
        self.require_alert(id).await
    }

    pub async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, ManagerError> {
        Ok(self.database.list_alerts(filter).await?)
    }

    /// Transition history, most recent first (default 50, at most 100)
    pub async fn get_history(
        &self,
        id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<AlertHistoryRecord>, ManagerError> {
        let limit = limit.unwrap_or(limits::DEFAULT_HISTORY_LIMIT);
        if !(1..=limits::MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(AlertError::validation(
                "historyLimit",
                format!("must be between 1 and {}", limits::MAX_HISTORY_LIMIT),
            )
            .into());
        }

        self.require_alert(id).await?;
        Ok(self.database.get_alert_history(id, limit).await?)
    }

    /// Evaluate an alert now with the engine's evaluator; nothing is persisted
    pub async fn test_alert(&self, id: &str) -> Result<AlertTestResult, ManagerError> {
        self.engine.test_alert(id).await
    }

    async fn require_alert(&self, id: &str) -> Result<Alert, ManagerError> {
        self.database
            .get_alert_by_id(id)
            .await?
            .ok_or_else(|| AlertError::NotFound { id: id.to_string() }.into())
    }
}

/// Check the user-editable fields of an alert
pub fn validate_alert(alert: &Alert) -> Result<(), AlertError> {
    let name_length = alert.name.chars().count();
    if name_length == 0 || name_length > limits::MAX_NAME_LENGTH {
        return Err(AlertError::validation(
            "name",
            format!("must be 1 to {} characters", limits::MAX_NAME_LENGTH),
        ));
    }

    if let Some(description) = &alert.description {
        if description.chars().count() > limits::MAX_DESCRIPTION_LENGTH {
            return Err(AlertError::validation(
                "description",
                format!("must be at most {} characters", limits::MAX_DESCRIPTION_LENGTH),
            ));
        }
    }

    if alert.queue_name.is_empty() {
        return Err(AlertError::validation("queueName", "is required"));
    }

    if alert.recipients.is_empty() {
        return Err(AlertError::validation(
            "recipients",
            "at least one recipient is required",
        ));
    }
    if let Some(invalid) = alert.recipients.iter().find(|r| !looks_like_email(r)) {
        return Err(AlertError::validation(
            "recipients",
            format!("'{}' is not a valid email address", invalid),
        ));
    }

    if !(limits::MIN_COOLDOWN_MINUTES..=limits::MAX_COOLDOWN_MINUTES)
        .contains(&alert.cooldown_minutes)
    {
        return Err(AlertError::validation(
            "cooldownMinutes",
            format!(
                "must be between {} and {}",
                limits::MIN_COOLDOWN_MINUTES,
                limits::MAX_COOLDOWN_MINUTES
            ),
        ));
    }

    alert.config.validate(alert.alert_type)
}

fn looks_like_email(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !address.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
