//! Per-type alert measurements
//!
//! Every evaluator reduces queue state to one number and hands it to
//! [`decide`], which applies the shared hysteresis rule:
//! - from `OK`, trigger when `value > threshold`
//! - from `Triggered`, resolve when `value <= resolve_threshold`
//!   (falling back to `threshold`)
//!
//! Evaluators read through [`QueueService`] only and persist nothing, so the
//! scheduled engine and the manual test action produce identical results.

use tracing::debug;

use super::{AlertConfig, AlertStatus, AlertType, EvaluationResult};
use crate::constants::jobs::METRIC_SAMPLE_LIMIT;
use crate::errors::AlertError;
use crate::queue::mapping::now_ms;
use crate::queue::{Job, JobQueryOptions, JobStatus, QueueService, SortField, SortOrder};

/// How a measured value maps to a status
#[derive(Debug, Clone, Copy, PartialEq)]
enum Rule {
    Hysteresis {
        threshold: f64,
        resolve_threshold: Option<f64>,
    },
    /// Triggered exactly when the value is zero, no band
    TriggerOnZero,
    /// No samples: healthy regardless of the previous status
    ForceOk,
}

struct Measurement {
    value: f64,
    message: String,
    rule: Rule,
}

/// Evaluate an alert against the current time
pub async fn evaluate_alert(
    alert_type: AlertType,
    config: &AlertConfig,
    queue_name: &str,
    service: &dyn QueueService,
    current_status: AlertStatus,
) -> Result<EvaluationResult, AlertError> {
    evaluate_alert_at(alert_type, config, queue_name, service, current_status, now_ms()).await
}

/// Evaluate an alert with time windows anchored at `now_ms`
pub async fn evaluate_alert_at(
    alert_type: AlertType,
    config: &AlertConfig,
    queue_name: &str,
    service: &dyn QueueService,
    current_status: AlertStatus,
    now_ms: i64,
) -> Result<EvaluationResult, AlertError> {
    let measurement = match alert_type {
        AlertType::FailureRate => measure_failure_rate(config, queue_name, service, now_ms).await?,
        AlertType::BacklogExceeded => measure_backlog(config, queue_name, service).await?,
        AlertType::ProcessingTimeAvg
        | AlertType::ProcessingTimeP95
        | AlertType::ProcessingTimeP99 => {
            measure_processing_time(alert_type, config, queue_name, service, now_ms).await?
        }
        AlertType::MissingWorkers => measure_workers(queue_name, service).await?,
    };

    let status = decide(measurement.rule, measurement.value, current_status);
    debug!(
        "Evaluated {} on {}: value={} {} -> {}",
        alert_type, queue_name, measurement.value, current_status, status
    );

    Ok(EvaluationResult {
        status,
        value: measurement.value,
        message: measurement.message,
    })
}

fn decide(rule: Rule, value: f64, current_status: AlertStatus) -> AlertStatus {
    match rule {
        Rule::Hysteresis {
            threshold,
            resolve_threshold,
        } => match current_status {
            AlertStatus::Ok if value > threshold => AlertStatus::Triggered,
            AlertStatus::Ok => AlertStatus::Ok,
            AlertStatus::Triggered if value <= resolve_threshold.unwrap_or(threshold) => {
                AlertStatus::Ok
            }
            AlertStatus::Triggered => AlertStatus::Triggered,
        },
        Rule::TriggerOnZero if value == 0.0 => AlertStatus::Triggered,
        Rule::TriggerOnZero | Rule::ForceOk => AlertStatus::Ok,
    }
}

fn hysteresis(config: &AlertConfig, alert_type: AlertType) -> Result<Rule, AlertError> {
    let threshold = config.threshold.ok_or_else(|| {
        AlertError::validation(
            "config.threshold",
            format!("is required for {} alerts", alert_type),
        )
    })?;
    Ok(Rule::Hysteresis {
        threshold,
        resolve_threshold: config.resolve_threshold,
    })
}

fn recent_finished(status: JobStatus) -> JobQueryOptions {
    JobQueryOptions::default()
        .with_status(status)
        .sorted_by(SortField::FinishedOn, SortOrder::Desc)
        .with_limit(METRIC_SAMPLE_LIMIT)
}

fn finished_since(job: &Job, cutoff_ms: i64) -> bool {
    matches!(job.finished_on, Some(finished) if finished > 0 && finished >= cutoff_ms)
}

fn window_cutoff(now_ms: i64, window_minutes: u32) -> i64 {
    now_ms - i64::from(window_minutes) * 60_000
}

async fn measure_failure_rate(
    config: &AlertConfig,
    queue_name: &str,
    service: &dyn QueueService,
    now_ms: i64,
) -> Result<Measurement, AlertError> {
    let rule = hysteresis(config, AlertType::FailureRate)?;
    let window = config.time_window();
    let cutoff = window_cutoff(now_ms, window);

    let completed_options = recent_finished(JobStatus::Completed);
    let failed_options = recent_finished(JobStatus::Failed);
    let (completed, failed) = futures::try_join!(
        service.get_jobs(queue_name, &completed_options),
        service.get_jobs(queue_name, &failed_options),
    )?;

    let recent_completed = completed.iter().filter(|j| finished_since(j, cutoff)).count();
    let recent_failed = failed.iter().filter(|j| finished_since(j, cutoff)).count();
    let total = recent_completed + recent_failed;
    let rate = if total > 0 {
        recent_failed as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    Ok(Measurement {
        value: rate,
        message: format!(
            "Failure rate: {:.1}% ({}/{} jobs in last {}min)",
            rate, recent_failed, total, window
        ),
        rule,
    })
}

async fn measure_backlog(
    config: &AlertConfig,
    queue_name: &str,
    service: &dyn QueueService,
) -> Result<Measurement, AlertError> {
    let rule = hysteresis(config, AlertType::BacklogExceeded)?;
    let counts = service.get_job_counts(queue_name).await?;
    let backlog = counts.backlog();

    Ok(Measurement {
        value: backlog as f64,
        message: format!(
            "Backlog: {} jobs (waiting: {}, delayed: {})",
            backlog, counts.waiting, counts.delayed
        ),
        rule,
    })
}

async fn measure_processing_time(
    alert_type: AlertType,
    config: &AlertConfig,
    queue_name: &str,
    service: &dyn QueueService,
    now_ms: i64,
) -> Result<Measurement, AlertError> {
    let rule = hysteresis(config, alert_type)?;
    let window = config.time_window();
    let cutoff = window_cutoff(now_ms, window);

    let completed = service
        .get_jobs(queue_name, &recent_finished(JobStatus::Completed))
        .await?;

    let mut durations: Vec<f64> = completed
        .iter()
        .filter(|job| finished_since(job, cutoff))
        .filter_map(|job| match (job.processed_on, job.finished_on) {
            (Some(started), Some(finished)) if started > 0 => Some((finished - started) as f64),
            _ => None,
        })
        .collect();

    if durations.is_empty() {
        return Ok(Measurement {
            value: 0.0,
            message: format!(
                "No completed jobs in last {}min to calculate processing time",
                window
            ),
            rule: Rule::ForceOk,
        });
    }

    durations.sort_by(|a, b| a.total_cmp(b));
    let (value, label) = match alert_type {
        AlertType::ProcessingTimeP95 => (percentile(&durations, 0.95), "P95"),
        AlertType::ProcessingTimeP99 => (percentile(&durations, 0.99), "P99"),
        _ => (
            durations.iter().sum::<f64>() / durations.len() as f64,
            "Average",
        ),
    };

    Ok(Measurement {
        value,
        message: format!(
            "{} processing time: {} (from {} jobs in last {}min)",
            label,
            format_ms(value),
            durations.len(),
            window
        ),
        rule,
    })
}

async fn measure_workers(
    queue_name: &str,
    service: &dyn QueueService,
) -> Result<Measurement, AlertError> {
    let workers = service.get_worker_count(queue_name).await?;
    let message = if workers.count == 0 {
        format!("No workers detected for queue \"{}\"", queue_name)
    } else {
        format!("{} worker(s) active", workers.count)
    };

    Ok(Measurement {
        value: f64::from(workers.count),
        message,
        rule: Rule::TriggerOnZero,
    })
}

/// Element at `floor(n * p)` of an ascending, non-empty sample
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let index = ((sorted.len() as f64 * p).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Render a millisecond duration as `ms`, `s` or `m`
pub fn format_ms(ms: f64) -> String {
    if ms < 1_000.0 {
        format!("{}ms", ms.round())
    } else if ms < 60_000.0 {
        format!("{:.1}s", ms / 1_000.0)
    } else {
        format!("{:.1}m", ms / 60_000.0)
    }
}
