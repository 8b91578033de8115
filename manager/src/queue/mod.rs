//! Queue provider abstraction
//!
//! Two Redis-backed job-queue protocols are supported behind one
//! [`QueueService`] trait:
//! - `bull` (legacy layout, job status inferred from timestamps)
//! - `bullmq` (status read from the set the job id lives in, flows supported)
//!
//! The [`factory`] module picks the right adapter for a connection by running
//! the [`detector`] against the backend's key namespace.

pub mod adapter;
pub mod bull;
pub mod bullmq;
pub mod capabilities;
pub mod detector;
pub mod factory;
pub mod keys;
pub mod mapping;
pub mod redis_link;
pub mod types;

pub use capabilities::{get_provider_capabilities, ProviderType, QueueProviderCapabilities};
pub use detector::{detect_provider, DetectionConfidence, DetectionResult, DetectionSource, KeyspaceScanner};
pub use factory::{ProviderFactory, RedisProviderFactory};
pub use redis_link::LinkSettings;
pub use types::{
    Job, JobCounts, JobQueryOptions, JobSort, JobStatus, JobSummary, QueueInfo, SortField,
    SortOrder, WorkerCount,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::errors::QueueResult;

/// Transport-level events reported by an adapter to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// The backend became unreachable and the adapter gave up on it
    Disconnected { reason: String },
    Error { message: String },
    /// A health check failed; the transport is retrying on its own
    Reconnecting,
    /// A health check succeeded after a failure
    Reconnected,
    HealthCheck { at: DateTime<Utc> },
}

pub type AdapterEventSender = mpsc::UnboundedSender<AdapterEvent>;

/// Capability surface shared by every job-queue adapter
#[async_trait]
pub trait QueueService: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    async fn connect(&self) -> QueueResult<()>;

    async fn disconnect(&self) -> QueueResult<()>;

    fn is_connected(&self) -> bool;

    async fn get_queues(&self) -> QueueResult<Vec<QueueInfo>>;

    async fn get_queue(&self, name: &str) -> QueueResult<Option<QueueInfo>>;

    async fn pause_queue(&self, name: &str) -> QueueResult<()>;

    async fn resume_queue(&self, name: &str) -> QueueResult<()>;

    async fn get_job_counts(&self, name: &str) -> QueueResult<JobCounts>;

    async fn get_jobs(&self, name: &str, options: &JobQueryOptions) -> QueueResult<Vec<Job>>;

    async fn get_jobs_summary(
        &self,
        name: &str,
        options: &JobQueryOptions,
    ) -> QueueResult<Vec<JobSummary>>;

    async fn get_job(&self, name: &str, job_id: &str) -> QueueResult<Option<Job>>;

    async fn retry_job(&self, name: &str, job_id: &str) -> QueueResult<()>;

    async fn remove_job(&self, name: &str, job_id: &str) -> QueueResult<()>;

    async fn get_worker_count(&self, name: &str) -> QueueResult<WorkerCount>;

    fn get_capabilities(&self) -> QueueProviderCapabilities {
        get_provider_capabilities(self.provider_type())
    }
}
