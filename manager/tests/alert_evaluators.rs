//! Unit tests for the alert evaluators
//!
//! Each evaluator runs against an in-memory queue with a fixed reference
//! time so window boundaries are exact.

mod common;

use common::fixtures::*;
use queue_manager::alerts::{evaluate_alert_at, AlertConfig, AlertStatus, AlertType};
use queue_manager::errors::AlertError;
use queue_manager::queue::{JobCounts, JobStatus, ProviderType, QueueService};
use test_case::test_case;

const NOW_MS: i64 = 1_700_000_000_000;
const MINUTE_MS: i64 = 60_000;

async fn connected_service() -> FakeQueueService {
    let service = FakeQueueService::new(ProviderType::BullMq);
    service.connect().await.unwrap();
    service
}

/// `completed` and `failed` jobs finishing `age_ms` before now
fn finished_jobs(completed: usize, failed: usize, age_ms: i64) -> Vec<queue_manager::queue::Job> {
    let finished = NOW_MS - age_ms;
    let mut jobs = Vec::new();
    for i in 0..completed {
        jobs.push(finished_job(
            &format!("c{}", i),
            queues::EMAILS,
            JobStatus::Completed,
            finished - 500,
            finished,
        ));
    }
    for i in 0..failed {
        jobs.push(finished_job(
            &format!("f{}", i),
            queues::EMAILS,
            JobStatus::Failed,
            finished - 500,
            finished,
        ));
    }
    jobs
}

#[test_case(10.0, AlertStatus::Triggered ; "well below the rate")]
#[test_case(30.0, AlertStatus::Triggered ; "just below the rate")]
#[test_case(40.0, AlertStatus::Ok ; "above the rate")]
#[tokio::test]
async fn test_failure_rate_against_threshold(threshold: f64, expected: AlertStatus) {
    let service = connected_service().await;
    service.set_queue(
        queues::EMAILS,
        FakeQueue {
            jobs: finished_jobs(10, 5, MINUTE_MS),
            ..FakeQueue::default()
        },
    );

    let result = evaluate_alert_at(
        AlertType::FailureRate,
        &AlertConfig::threshold(threshold).with_window(10),
        queues::EMAILS,
        &service,
        AlertStatus::Ok,
        NOW_MS,
    )
    .await
    .unwrap();

    assert_eq!(result.status, expected);
    assert!((result.value - 33.333).abs() < 0.01);
    assert_eq!(result.message, "Failure rate: 33.3% (5/15 jobs in last 10min)");
}

#[tokio::test]
async fn test_failure_rate_ignores_jobs_outside_window() {
    let service = connected_service().await;
    let mut jobs = finished_jobs(4, 0, MINUTE_MS);
    // Failures that finished before the 5 minute default window
    jobs.extend(finished_jobs(0, 20, 6 * MINUTE_MS));
    service.set_queue(
        queues::EMAILS,
        FakeQueue {
            jobs,
            ..FakeQueue::default()
        },
    );

    let result = evaluate_alert_at(
        AlertType::FailureRate,
        &AlertConfig::threshold(10.0),
        queues::EMAILS,
        &service,
        AlertStatus::Ok,
        NOW_MS,
    )
    .await
    .unwrap();

    assert_eq!(result.status, AlertStatus::Ok);
    assert_eq!(result.value, 0.0);
    assert_eq!(result.message, "Failure rate: 0.0% (0/4 jobs in last 5min)");
}

#[tokio::test]
async fn test_failure_rate_with_no_jobs_is_zero() {
    let service = connected_service().await;
    service.set_queue(queues::EMAILS, FakeQueue::default());

    let result = evaluate_alert_at(
        AlertType::FailureRate,
        &AlertConfig::threshold(0.5),
        queues::EMAILS,
        &service,
        AlertStatus::Ok,
        NOW_MS,
    )
    .await
    .unwrap();

    assert_eq!(result.status, AlertStatus::Ok);
    assert_eq!(result.value, 0.0);
}

#[test_case(AlertStatus::Ok, 100, AlertStatus::Ok ; "at threshold does not trigger")]
#[test_case(AlertStatus::Ok, 150, AlertStatus::Triggered ; "above threshold triggers")]
#[test_case(AlertStatus::Triggered, 90, AlertStatus::Triggered ; "between resolve and trigger stays")]
#[test_case(AlertStatus::Triggered, 80, AlertStatus::Ok ; "at resolve threshold resolves")]
#[test_case(AlertStatus::Triggered, 70, AlertStatus::Ok ; "below resolve threshold resolves")]
#[tokio::test]
async fn test_backlog_hysteresis(current: AlertStatus, backlog: u64, expected: AlertStatus) {
    let service = connected_service().await;
    service.set_queue(
        queues::EMAILS,
        FakeQueue {
            counts: JobCounts {
                waiting: backlog - 10,
                delayed: 10,
                active: 500,
                ..JobCounts::default()
            },
            ..FakeQueue::default()
        },
    );

    let result = evaluate_alert_at(
        AlertType::BacklogExceeded,
        &AlertConfig::threshold(100.0).with_resolve_threshold(80.0),
        queues::EMAILS,
        &service,
        current,
        NOW_MS,
    )
    .await
    .unwrap();

    assert_eq!(result.status, expected);
    assert_eq!(result.value, backlog as f64);
    assert_eq!(
        result.message,
        format!(
            "Backlog: {} jobs (waiting: {}, delayed: 10)",
            backlog,
            backlog - 10
        )
    );
}

#[tokio::test]
async fn test_backlog_without_resolve_threshold_uses_trigger_threshold() {
    let service = connected_service().await;
    service.set_queue(
        queues::EMAILS,
        FakeQueue {
            counts: JobCounts {
                waiting: 100,
                ..JobCounts::default()
            },
            ..FakeQueue::default()
        },
    );

    let result = evaluate_alert_at(
        AlertType::BacklogExceeded,
        &AlertConfig::threshold(100.0),
        queues::EMAILS,
        &service,
        AlertStatus::Triggered,
        NOW_MS,
    )
    .await
    .unwrap();
    assert_eq!(result.status, AlertStatus::Ok);
}

fn timed_jobs(durations_ms: &[i64]) -> Vec<queue_manager::queue::Job> {
    durations_ms
        .iter()
        .enumerate()
        .map(|(i, duration)| {
            let finished = NOW_MS - MINUTE_MS;
            finished_job(
                &format!("t{}", i),
                queues::EMAILS,
                JobStatus::Completed,
                finished - duration,
                finished,
            )
        })
        .collect()
}

#[test_case(AlertType::ProcessingTimeAvg, 1_050.0, "Average processing time: 1.1s (from 20 jobs in last 5min)")]
#[test_case(AlertType::ProcessingTimeP95, 2_000.0, "P95 processing time: 2.0s (from 20 jobs in last 5min)")]
#[test_case(AlertType::ProcessingTimeP99, 2_000.0, "P99 processing time: 2.0s (from 20 jobs in last 5min)")]
#[tokio::test]
async fn test_processing_time_statistics(alert_type: AlertType, expected: f64, message: &str) {
    let service = connected_service().await;
    let durations: Vec<i64> = (1..=20).map(|i| i * 100).collect();
    service.set_queue(
        queues::EMAILS,
        FakeQueue {
            jobs: timed_jobs(&durations),
            ..FakeQueue::default()
        },
    );

    let result = evaluate_alert_at(
        alert_type,
        &AlertConfig::threshold(1_000.0),
        queues::EMAILS,
        &service,
        AlertStatus::Ok,
        NOW_MS,
    )
    .await
    .unwrap();

    assert_eq!(result.value, expected);
    assert_eq!(result.status, AlertStatus::Triggered);
    assert_eq!(result.message, message);
}

#[tokio::test]
async fn test_p95_picks_floor_index() {
    let service = connected_service().await;
    // Ten samples: index floor(10 * 0.95) = 9
    let durations: Vec<i64> = (1..=10).map(|i| i * 10).collect();
    service.set_queue(
        queues::EMAILS,
        FakeQueue {
            jobs: timed_jobs(&durations),
            ..FakeQueue::default()
        },
    );

    let result = evaluate_alert_at(
        AlertType::ProcessingTimeP95,
        &AlertConfig::threshold(1_000.0),
        queues::EMAILS,
        &service,
        AlertStatus::Ok,
        NOW_MS,
    )
    .await
    .unwrap();
    assert_eq!(result.value, 100.0);
    assert_eq!(result.status, AlertStatus::Ok);
}

#[tokio::test]
async fn test_processing_time_without_samples_forces_ok() {
    let service = connected_service().await;
    service.set_queue(queues::EMAILS, FakeQueue::default());

    let result = evaluate_alert_at(
        AlertType::ProcessingTimeAvg,
        &AlertConfig::threshold(1.0),
        queues::EMAILS,
        &service,
        AlertStatus::Triggered,
        NOW_MS,
    )
    .await
    .unwrap();

    assert_eq!(result.status, AlertStatus::Ok);
    assert_eq!(result.value, 0.0);
    assert_eq!(
        result.message,
        "No completed jobs in last 5min to calculate processing time"
    );
}

#[test_case(0, AlertStatus::Triggered, "No workers detected for queue \"emails\"")]
#[test_case(2, AlertStatus::Ok, "2 worker(s) active")]
#[tokio::test]
async fn test_missing_workers(workers: u32, expected: AlertStatus, message: &str) {
    let service = connected_service().await;
    service.set_queue(
        queues::EMAILS,
        FakeQueue {
            workers,
            ..FakeQueue::default()
        },
    );

    let result = evaluate_alert_at(
        AlertType::MissingWorkers,
        &AlertConfig::default(),
        queues::EMAILS,
        &service,
        AlertStatus::Ok,
        NOW_MS,
    )
    .await
    .unwrap();

    assert_eq!(result.status, expected);
    assert_eq!(result.value, f64::from(workers));
    assert_eq!(result.message, message);
}

#[tokio::test]
async fn test_missing_threshold_is_a_validation_error() {
    let service = connected_service().await;
    service.set_queue(queues::EMAILS, FakeQueue::default());

    let result = evaluate_alert_at(
        AlertType::BacklogExceeded,
        &AlertConfig::default(),
        queues::EMAILS,
        &service,
        AlertStatus::Ok,
        NOW_MS,
    )
    .await;
    assert!(matches!(result, Err(AlertError::Validation { .. })));
}

#[tokio::test]
async fn test_backend_errors_propagate() {
    let service = connected_service().await;

    let result = evaluate_alert_at(
        AlertType::MissingWorkers,
        &AlertConfig::default(),
        "unknown-queue",
        &service,
        AlertStatus::Ok,
        NOW_MS,
    )
    .await;
    assert!(matches!(result, Err(AlertError::Backend(_))));
}

#[test_case(AlertType::FailureRate, AlertConfig::threshold(10.0))]
#[test_case(AlertType::BacklogExceeded, AlertConfig::threshold(5.0))]
#[test_case(AlertType::ProcessingTimeAvg, AlertConfig::threshold(400.0))]
#[test_case(AlertType::ProcessingTimeP95, AlertConfig::threshold(400.0))]
#[test_case(AlertType::ProcessingTimeP99, AlertConfig::threshold(400.0))]
#[test_case(AlertType::MissingWorkers, AlertConfig::default())]
#[tokio::test]
async fn test_evaluation_is_repeatable(alert_type: AlertType, config: AlertConfig) {
    let service = connected_service().await;
    let mut jobs = finished_jobs(6, 2, MINUTE_MS);
    jobs.extend(timed_jobs(&[200, 300, 600]));
    service.set_queue(
        queues::EMAILS,
        FakeQueue {
            counts: JobCounts {
                waiting: 8,
                delayed: 2,
                ..JobCounts::default()
            },
            jobs,
            workers: 0,
            paused: false,
        },
    );

    let mut results = Vec::new();
    for _ in 0..2 {
        results.push(
            evaluate_alert_at(
                alert_type,
                &config,
                queues::EMAILS,
                &service,
                AlertStatus::Ok,
                NOW_MS,
            )
            .await
            .unwrap(),
        );
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].status, AlertStatus::Triggered);
}
