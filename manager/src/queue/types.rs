use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::constants::jobs;

/// Variant-agnostic job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
    Paused,
    Prioritized,
    WaitingChildren,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Delayed => "delayed",
            JobStatus::Paused => "paused",
            JobStatus::Prioritized => "prioritized",
            JobStatus::WaitingChildren => "waiting-children",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" | "wait" => Some(JobStatus::Waiting),
            "active" => Some(JobStatus::Active),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "delayed" => Some(JobStatus::Delayed),
            "paused" => Some(JobStatus::Paused),
            "prioritized" => Some(JobStatus::Prioritized),
            "waiting-children" => Some(JobStatus::WaitingChildren),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully materialized job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub name: String,
    pub queue_name: String,
    pub data: Value,
    pub status: JobStatus,
    pub progress: Value,
    pub attempts_made: u32,
    pub attempts_limit: u32,
    pub failed_reason: Option<String>,
    pub stacktrace: Option<Vec<String>>,
    pub return_value: Option<Value>,
    pub timestamp: i64,
    pub processed_on: Option<i64>,
    pub finished_on: Option<i64>,
    pub delay: Option<i64>,
    pub priority: Option<i64>,
    pub parent_id: Option<String>,
    pub repeat_job_key: Option<String>,
}

/// Lightweight job record for list views
///
/// Heavy payload fields are replaced by presence and size hints.
/// `failed_reason` is kept for overview metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    pub name: String,
    pub queue_name: String,
    pub status: JobStatus,
    pub progress: Value,
    pub attempts_made: u32,
    pub attempts_limit: u32,
    pub timestamp: i64,
    pub processed_on: Option<i64>,
    pub finished_on: Option<i64>,
    pub delay: Option<i64>,
    pub priority: Option<i64>,
    pub parent_id: Option<String>,
    pub repeat_job_key: Option<String>,
    pub has_data: bool,
    pub data_size: Option<usize>,
    pub has_return_value: bool,
    pub has_stacktrace: bool,
    pub has_failed_reason: bool,
    pub failed_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub paused: u64,
    pub prioritized: u64,
    pub waiting_children: u64,
}

impl JobCounts {
    /// Jobs that have not started yet and are eligible to run eventually
    pub fn backlog(&self) -> u64 {
        self.waiting + self.delayed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueInfo {
    pub name: String,
    pub is_paused: bool,
    pub job_counts: JobCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCount {
    pub queue_name: String,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Timestamp,
    ProcessedOn,
    FinishedOn,
    Progress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSort {
    pub field: SortField,
    pub order: SortOrder,
}

/// Query options for job listings
///
/// The backend fetch honours `status`, `offset` and `limit`. Name filtering
/// and sorting happen in memory afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobQueryOptions {
    pub status: Option<Vec<JobStatus>>,
    pub name: Option<String>,
    pub sort: Option<JobSort>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for JobQueryOptions {
    fn default() -> Self {
        Self {
            status: None,
            name: None,
            sort: None,
            limit: jobs::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl JobQueryOptions {
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(vec![status]);
        self
    }

    pub fn with_statuses(mut self, statuses: Vec<JobStatus>) -> Self {
        self.status = Some(statuses);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn sorted_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort = Some(JobSort { field, order });
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}
