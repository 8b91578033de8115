//! In-memory queue service for exercising the connection and alert layers
//!
//! Each fake queue holds explicit counts, finished jobs and a worker count,
//! so tests can shape exactly what the evaluators observe.

use async_trait::async_trait;
use queue_manager::errors::{QueueError, QueueResult};
use queue_manager::queue::{
    Job, JobCounts, JobQueryOptions, JobStatus, JobSummary, ProviderType, QueueInfo,
    QueueService, WorkerCount,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct FakeQueue {
    pub counts: JobCounts,
    pub jobs: Vec<Job>,
    pub workers: u32,
    pub paused: bool,
}

pub struct FakeQueueService {
    provider_type: ProviderType,
    queues: Mutex<HashMap<String, FakeQueue>>,
    connected: AtomicBool,
    failing_connects: AtomicU32,
    connect_calls: AtomicU32,
    disconnect_calls: AtomicU32,
    connect_delay: Mutex<Duration>,
}

impl FakeQueueService {
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            queues: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(false),
            failing_connects: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
            connect_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Make the next `count` connect calls fail
    pub fn fail_next_connects(&self, count: u32) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Every following connect sleeps this long before resolving
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = delay;
    }

    pub fn set_queue(&self, name: &str, queue: FakeQueue) {
        self.queues.lock().unwrap().insert(name.to_string(), queue);
    }

    pub fn update_queue(&self, name: &str, update: impl FnOnce(&mut FakeQueue)) {
        let mut queues = self.queues.lock().unwrap();
        update(queues.entry(name.to_string()).or_default());
    }

    fn ensure_connected(&self) -> QueueResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::NotConnected)
        }
    }

    fn with_queue<T>(&self, name: &str, read: impl FnOnce(&FakeQueue) -> T) -> QueueResult<T> {
        self.ensure_connected()?;
        let queues = self.queues.lock().unwrap();
        queues
            .get(name)
            .map(read)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue: name.to_string(),
            })
    }

    fn matching_jobs(&self, name: &str, options: &JobQueryOptions) -> QueueResult<Vec<Job>> {
        self.with_queue(name, |queue| {
            queue
                .jobs
                .iter()
                .filter(|job| {
                    options
                        .status
                        .as_ref()
                        .is_none_or(|statuses| statuses.contains(&job.status))
                })
                .skip(options.offset)
                .take(options.limit)
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl QueueService for FakeQueueService {
    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    async fn connect(&self) -> QueueResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.failing_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(QueueError::Timeout {
                operation: "connecting to fake backend".to_string(),
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> QueueResult<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_queues(&self) -> QueueResult<Vec<QueueInfo>> {
        self.ensure_connected()?;
        let queues = self.queues.lock().unwrap();
        let mut infos: Vec<QueueInfo> = queues
            .iter()
            .map(|(name, queue)| QueueInfo {
                name: name.clone(),
                is_paused: queue.paused,
                job_counts: queue.counts,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn get_queue(&self, name: &str) -> QueueResult<Option<QueueInfo>> {
        self.ensure_connected()?;
        let queues = self.queues.lock().unwrap();
        Ok(queues.get(name).map(|queue| QueueInfo {
            name: name.to_string(),
            is_paused: queue.paused,
            job_counts: queue.counts,
        }))
    }

    async fn pause_queue(&self, name: &str) -> QueueResult<()> {
        self.ensure_connected()?;
        self.update_queue(name, |queue| queue.paused = true);
        Ok(())
    }

    async fn resume_queue(&self, name: &str) -> QueueResult<()> {
        self.ensure_connected()?;
        self.update_queue(name, |queue| queue.paused = false);
        Ok(())
    }

    async fn get_job_counts(&self, name: &str) -> QueueResult<JobCounts> {
        self.with_queue(name, |queue| queue.counts)
    }

    async fn get_jobs(&self, name: &str, options: &JobQueryOptions) -> QueueResult<Vec<Job>> {
        self.matching_jobs(name, options)
    }

    async fn get_jobs_summary(
        &self,
        name: &str,
        options: &JobQueryOptions,
    ) -> QueueResult<Vec<JobSummary>> {
        Ok(self
            .matching_jobs(name, options)?
            .into_iter()
            .map(|job| JobSummary {
                has_data: !job.data.is_null(),
                data_size: None,
                has_return_value: job.return_value.is_some(),
                has_stacktrace: job.stacktrace.is_some(),
                has_failed_reason: job.failed_reason.is_some(),
                id: job.id,
                name: job.name,
                queue_name: job.queue_name,
                status: job.status,
                progress: job.progress,
                attempts_made: job.attempts_made,
                attempts_limit: job.attempts_limit,
                timestamp: job.timestamp,
                processed_on: job.processed_on,
                finished_on: job.finished_on,
                delay: job.delay,
                priority: job.priority,
                parent_id: job.parent_id,
                repeat_job_key: job.repeat_job_key,
                failed_reason: job.failed_reason,
            })
            .collect())
    }

    async fn get_job(&self, name: &str, job_id: &str) -> QueueResult<Option<Job>> {
        self.with_queue(name, |queue| {
            queue.jobs.iter().find(|job| job.id == job_id).cloned()
        })
    }

    async fn retry_job(&self, name: &str, job_id: &str) -> QueueResult<()> {
        self.ensure_connected()?;
        let mut queues = self.queues.lock().unwrap();
        let queue = queues.get_mut(name).ok_or_else(|| QueueError::QueueNotFound {
            queue: name.to_string(),
        })?;
        let job = queue
            .jobs
            .iter_mut()
            .find(|job| job.id == job_id)
            .ok_or_else(|| QueueError::JobNotFound {
                queue: name.to_string(),
                job_id: job_id.to_string(),
            })?;
        if job.status != JobStatus::Failed {
            return Err(QueueError::InvalidJobState {
                queue: name.to_string(),
                job_id: job_id.to_string(),
                state: job.status.to_string(),
                expected: JobStatus::Failed.to_string(),
            });
        }
        job.status = JobStatus::Waiting;
        job.failed_reason = None;
        job.finished_on = None;
        Ok(())
    }

    async fn remove_job(&self, name: &str, job_id: &str) -> QueueResult<()> {
        self.ensure_connected()?;
        let mut queues = self.queues.lock().unwrap();
        let queue = queues.get_mut(name).ok_or_else(|| QueueError::QueueNotFound {
            queue: name.to_string(),
        })?;
        let before = queue.jobs.len();
        queue.jobs.retain(|job| job.id != job_id);
        if queue.jobs.len() == before {
            return Err(QueueError::JobNotFound {
                queue: name.to_string(),
                job_id: job_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_worker_count(&self, name: &str) -> QueueResult<WorkerCount> {
        self.with_queue(name, |queue| WorkerCount {
            queue_name: name.to_string(),
            count: queue.workers,
        })
    }
}

/// A finished job with the given timings, in epoch milliseconds
pub fn finished_job(
    id: &str,
    queue: &str,
    status: JobStatus,
    processed_on: i64,
    finished_on: i64,
) -> Job {
    Job {
        id: id.to_string(),
        name: "process".to_string(),
        queue_name: queue.to_string(),
        data: json!({ "id": id }),
        status,
        progress: json!(100),
        attempts_made: 1,
        attempts_limit: 3,
        failed_reason: (status == JobStatus::Failed).then(|| "boom".to_string()),
        stacktrace: None,
        return_value: None,
        timestamp: processed_on - 10,
        processed_on: Some(processed_on),
        finished_on: Some(finished_on),
        delay: None,
        priority: None,
        parent_id: None,
        repeat_job_key: None,
    }
}
