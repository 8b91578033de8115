//! Alert CRUD, evaluation state, and history operations.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use super::records::AlertFilter;
use super::Database;
use crate::alerts::{
    Alert, AlertEvaluationUpdate, AlertHistoryRecord, AlertStatus, AlertStore, AlertType,
    EvaluationResult,
};

const ALERT_COLUMNS: &str = r#"
    id, connection_id, name, description, queue_name, alert_type, config, recipients,
    cooldown_minutes, enabled, status, last_triggered_at, last_resolved_at,
    last_checked_at, last_value, created_at, updated_at
"#;

fn parse_status(raw: &str) -> Result<AlertStatus> {
    AlertStatus::parse(raw).ok_or_else(|| anyhow!("Unknown alert status '{}'", raw))
}

fn alert_from_row(row: &SqliteRow) -> Result<Alert> {
    let id: String = row.try_get("id")?;
    let alert_type: String = row.try_get("alert_type")?;
    let config: String = row.try_get("config")?;
    let recipients: String = row.try_get("recipients")?;
    let status: String = row.try_get("status")?;
    let cooldown_minutes: i64 = row.try_get("cooldown_minutes")?;

    Ok(Alert {
        connection_id: row.try_get("connection_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        queue_name: row.try_get("queue_name")?,
        alert_type: AlertType::parse(&alert_type)
            .ok_or_else(|| anyhow!("Unknown alert type '{}' on alert {}", alert_type, id))?,
        config: serde_json::from_str(&config)
            .with_context(|| format!("Invalid config JSON on alert {}", id))?,
        recipients: serde_json::from_str(&recipients)
            .with_context(|| format!("Invalid recipients JSON on alert {}", id))?,
        cooldown_minutes: u32::try_from(cooldown_minutes)?,
        enabled: row.try_get("enabled")?,
        status: parse_status(&status)?,
        last_triggered_at: row.try_get("last_triggered_at")?,
        last_resolved_at: row.try_get("last_resolved_at")?,
        last_checked_at: row.try_get("last_checked_at")?,
        last_value: row.try_get("last_value")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        id,
    })
}

async fn write_evaluation(
    conn: &mut SqliteConnection,
    alert_id: &str,
    update: &AlertEvaluationUpdate,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE alerts SET
            status = ?,
            last_value = ?,
            last_checked_at = ?,
            last_triggered_at = COALESCE(?, last_triggered_at),
            last_resolved_at = COALESCE(?, last_resolved_at)
        WHERE id = ?
        "#,
    )
    .bind(update.status.as_str())
    .bind(update.value)
    .bind(update.checked_at)
    .bind(update.triggered_at)
    .bind(update.resolved_at)
    .bind(alert_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(anyhow!("Alert {} disappeared during evaluation", alert_id));
    }
    Ok(())
}

async fn write_history(
    conn: &mut SqliteConnection,
    alert_id: &str,
    result: &EvaluationResult,
    at: DateTime<Utc>,
) -> Result<AlertHistoryRecord> {
    let record = AlertHistoryRecord {
        id: Uuid::new_v4().to_string(),
        alert_id: alert_id.to_string(),
        status: result.status,
        value: result.value,
        message: result.message.clone(),
        created_at: at,
    };

    sqlx::query(
        r#"
        INSERT INTO alert_history (id, alert_id, status, value, message, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.alert_id)
    .bind(record.status.as_str())
    .bind(record.value)
    .bind(&record.message)
    .bind(record.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(record)
}

impl Database {
    pub async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (id, connection_id, name, description, queue_name, alert_type,
                                config, recipients, cooldown_minutes, enabled, status,
                                last_triggered_at, last_resolved_at, last_checked_at,
                                last_value, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert.id)
        .bind(&alert.connection_id)
        .bind(&alert.name)
        .bind(&alert.description)
        .bind(&alert.queue_name)
        .bind(alert.alert_type.as_str())
        .bind(serde_json::to_string(&alert.config)?)
        .bind(serde_json::to_string(&alert.recipients)?)
        .bind(i64::from(alert.cooldown_minutes))
        .bind(alert.enabled)
        .bind(alert.status.as_str())
        .bind(alert.last_triggered_at)
        .bind(alert.last_resolved_at)
        .bind(alert.last_checked_at)
        .bind(alert.last_value)
        .bind(alert.created_at)
        .bind(alert.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Overwrite the user-editable fields of an alert
    ///
    /// Evaluation state is owned by the engine and left untouched.
    /// Returns false when the alert does not exist.
    pub async fn update_alert_definition(&self, alert: &Alert) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alerts SET
                name = ?,
                description = ?,
                queue_name = ?,
                alert_type = ?,
                config = ?,
                recipients = ?,
                cooldown_minutes = ?,
                enabled = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&alert.name)
        .bind(&alert.description)
        .bind(&alert.queue_name)
        .bind(alert.alert_type.as_str())
        .bind(serde_json::to_string(&alert.config)?)
        .bind(serde_json::to_string(&alert.recipients)?)
        .bind(i64::from(alert.cooldown_minutes))
        .bind(alert.enabled)
        .bind(alert.updated_at)
        .bind(&alert.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_alert(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_alert_by_id(&self, id: &str) -> Result<Option<Alert>> {
        let sql = format!("SELECT {} FROM alerts WHERE id = ?", ALERT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(alert_from_row).transpose()
    }

    pub async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let mut query =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM alerts WHERE 1 = 1", ALERT_COLUMNS));

        if let Some(connection_id) = &filter.connection_id {
            query.push(" AND connection_id = ").push_bind(connection_id.clone());
        }
        if let Some(queue_name) = &filter.queue_name {
            query.push(" AND queue_name = ").push_bind(queue_name.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(alert_type) = filter.alert_type {
            query.push(" AND alert_type = ").push_bind(alert_type.as_str());
        }
        if let Some(enabled) = filter.enabled {
            query.push(" AND enabled = ").push_bind(enabled);
        }
        query.push(" ORDER BY created_at DESC, id");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(alert_from_row).collect()
    }

    pub async fn list_enabled_alerts(&self) -> Result<Vec<Alert>> {
        self.list_alerts(&AlertFilter {
            enabled: Some(true),
            ..AlertFilter::default()
        })
        .await
    }

    pub async fn record_alert_evaluation(
        &self,
        alert_id: &str,
        update: &AlertEvaluationUpdate,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_evaluation(&mut conn, alert_id, update).await
    }

    pub async fn insert_alert_history(
        &self,
        alert_id: &str,
        result: &EvaluationResult,
        at: DateTime<Utc>,
    ) -> Result<AlertHistoryRecord> {
        let mut conn = self.pool.acquire().await?;
        write_history(&mut conn, alert_id, result, at).await
    }

    /// Evaluation state plus history row in a single transaction
    pub async fn record_alert_transition(
        &self,
        alert_id: &str,
        update: &AlertEvaluationUpdate,
        result: &EvaluationResult,
    ) -> Result<AlertHistoryRecord> {
        let mut tx = self.pool.begin().await?;
        write_evaluation(&mut tx, alert_id, update).await?;
        let record = write_history(&mut tx, alert_id, result, update.checked_at).await?;
        tx.commit()
            .await
            .with_context(|| format!("Failed to commit transition for alert {}", alert_id))?;
        Ok(record)
    }

    /// Most recent history entries first
    pub async fn get_alert_history(
        &self,
        alert_id: &str,
        limit: u32,
    ) -> Result<Vec<AlertHistoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, alert_id, status, value, message, created_at
            FROM alert_history
            WHERE alert_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(alert_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut history = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.try_get("status")?;
            history.push(AlertHistoryRecord {
                id: row.try_get("id")?,
                alert_id: row.try_get("alert_id")?,
                status: parse_status(&status)?,
                value: row.try_get("value")?,
                message: row.try_get("message")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(history)
    }
}

#[async_trait]
impl AlertStore for Database {
    async fn list_enabled_alerts(&self) -> Result<Vec<Alert>> {
        Database::list_enabled_alerts(self).await
    }

    async fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        self.get_alert_by_id(id).await
    }

    async fn record_evaluation(&self, alert_id: &str, update: &AlertEvaluationUpdate) -> Result<()> {
        self.record_alert_evaluation(alert_id, update).await
    }

    async fn record_transition(
        &self,
        alert_id: &str,
        update: &AlertEvaluationUpdate,
        result: &EvaluationResult,
    ) -> Result<AlertHistoryRecord> {
        self.record_alert_transition(alert_id, update, result).await
    }
}
