//! Conversion from raw job hashes into normalized [`Job`] records
//!
//! Both variants store a job as a Redis hash. Field names overlap almost
//! entirely; the few that differ (`atm` vs `attemptsMade`, `rjk` vs
//! `repeatJobKey`) are accepted in either spelling.

use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::types::{Job, JobQueryOptions, JobStatus, JobSummary, SortField, SortOrder};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Subset of the job options blob that the dashboard reads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobOpts {
    pub attempts: Option<u32>,
    pub delay: Option<i64>,
    pub priority: Option<i64>,
}

/// Job hash as read from the backend, before status resolution
#[derive(Debug, Clone, Default)]
pub struct RawJob {
    pub id: String,
    pub name: String,
    pub data: Option<String>,
    pub opts: JobOpts,
    pub progress: Option<String>,
    pub timestamp: i64,
    pub delay: Option<i64>,
    pub priority: Option<i64>,
    pub processed_on: Option<i64>,
    pub finished_on: Option<i64>,
    pub attempts_made: u32,
    pub failed_reason: Option<String>,
    pub stacktrace: Option<String>,
    pub return_value: Option<String>,
    pub parent_key: Option<String>,
    pub repeat_job_key: Option<String>,
}

fn int_field(hash: &HashMap<String, String>, field: &str) -> Option<i64> {
    hash.get(field).and_then(|v| v.parse::<i64>().ok())
}

fn text_field(hash: &HashMap<String, String>, field: &str) -> Option<String> {
    hash.get(field).filter(|v| !v.is_empty()).cloned()
}

impl RawJob {
    /// Build from an HGETALL reply. An empty hash means the job does not exist.
    pub fn from_hash(id: &str, hash: HashMap<String, String>) -> Option<Self> {
        if hash.is_empty() {
            return None;
        }

        let opts = hash
            .get("opts")
            .and_then(|raw| serde_json::from_str::<JobOpts>(raw).ok())
            .unwrap_or_default();

        let attempts_made = int_field(&hash, "atm")
            .or_else(|| int_field(&hash, "attemptsMade"))
            .unwrap_or(0)
            .max(0) as u32;

        Some(Self {
            id: id.to_string(),
            name: text_field(&hash, "name").unwrap_or_else(|| "__default__".to_string()),
            data: text_field(&hash, "data"),
            delay: int_field(&hash, "delay").or(opts.delay),
            priority: int_field(&hash, "priority").or(opts.priority),
            opts,
            progress: text_field(&hash, "progress"),
            timestamp: int_field(&hash, "timestamp").unwrap_or(0),
            processed_on: int_field(&hash, "processedOn"),
            finished_on: int_field(&hash, "finishedOn"),
            attempts_made,
            failed_reason: text_field(&hash, "failedReason"),
            stacktrace: text_field(&hash, "stacktrace"),
            return_value: text_field(&hash, "returnvalue"),
            parent_key: text_field(&hash, "parentKey"),
            repeat_job_key: text_field(&hash, "rjk").or_else(|| text_field(&hash, "repeatJobKey")),
        })
    }

    /// True while the job's configured delay has not elapsed yet
    pub fn is_delay_pending(&self, now_ms: i64) -> bool {
        match self.delay {
            Some(delay) if delay > 0 => self.timestamp + delay > now_ms,
            _ => false,
        }
    }

    /// Infer status from timestamps alone
    ///
    /// Order matters: a finished job with an error is failed even though it
    /// also has a start time.
    pub fn infer_status(&self, now_ms: i64) -> JobStatus {
        if self.finished_on.is_some() && self.failed_reason.is_some() {
            JobStatus::Failed
        } else if self.finished_on.is_some() {
            JobStatus::Completed
        } else if self.processed_on.is_some() {
            JobStatus::Active
        } else if self.is_delay_pending(now_ms) {
            JobStatus::Delayed
        } else {
            JobStatus::Waiting
        }
    }

    fn parent_id(&self) -> Option<String> {
        self.parent_key
            .as_deref()
            .and_then(|key| key.rsplit(':').next())
            .map(str::to_string)
    }

    fn stacktrace_lines(&self) -> Option<Vec<String>> {
        self.stacktrace
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
    }

    fn progress_value(&self) -> Value {
        match self.progress.as_deref() {
            Some(raw) => normalize_progress(parse_json_field(raw)),
            None => json!(0),
        }
    }

    pub fn into_job(self, queue_name: &str, status: JobStatus) -> Job {
        let progress = self.progress_value();
        let parent_id = self.parent_id();
        let stacktrace = self.stacktrace_lines();

        Job {
            data: self.data.as_deref().map(parse_json_field).unwrap_or(Value::Null),
            return_value: self
                .return_value
                .as_deref()
                .map(parse_json_field)
                .filter(|v| !v.is_null()),
            id: self.id,
            name: self.name,
            queue_name: queue_name.to_string(),
            status,
            progress,
            attempts_made: self.attempts_made,
            attempts_limit: self.opts.attempts.unwrap_or(1),
            failed_reason: self.failed_reason,
            stacktrace,
            timestamp: self.timestamp,
            processed_on: self.processed_on,
            finished_on: self.finished_on,
            delay: self.delay,
            priority: self.priority,
            parent_id,
            repeat_job_key: self.repeat_job_key,
        }
    }

    pub fn into_summary(self, queue_name: &str, status: JobStatus) -> JobSummary {
        let progress = self.progress_value();
        let parent_id = self.parent_id();
        let has_stacktrace = self
            .stacktrace_lines()
            .map(|lines| !lines.is_empty())
            .unwrap_or(false);
        let data = self.data.as_deref().map(parse_json_field);
        let has_data = data.as_ref().map(is_truthy).unwrap_or(false);
        let has_return_value = self
            .return_value
            .as_deref()
            .map(parse_json_field)
            .map(|v| !v.is_null())
            .unwrap_or(false);

        JobSummary {
            id: self.id,
            name: self.name,
            queue_name: queue_name.to_string(),
            status,
            progress,
            attempts_made: self.attempts_made,
            attempts_limit: self.opts.attempts.unwrap_or(1),
            timestamp: self.timestamp,
            processed_on: self.processed_on,
            finished_on: self.finished_on,
            delay: self.delay,
            priority: self.priority,
            parent_id,
            repeat_job_key: self.repeat_job_key,
            has_data,
            data_size: Some(if has_data {
                self.data.as_deref().map(str::len).unwrap_or(0)
            } else {
                0
            }),
            has_return_value,
            has_stacktrace,
            has_failed_reason: self.failed_reason.is_some(),
            failed_reason: self.failed_reason,
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Parse a JSON-encoded hash field, keeping unparseable text as a string
pub fn parse_json_field(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Normalize progress to either a number or an object
pub fn normalize_progress(progress: Value) -> Value {
    match progress {
        Value::Bool(done) => json!(if done { 100 } else { 0 }),
        Value::String(text) => match text.trim().parse::<f64>() {
            Ok(number) if number.fract() == 0.0 && number.abs() < i64::MAX as f64 => {
                json!(number as i64)
            }
            Ok(number) => serde_json::Number::from_f64(number)
                .map(Value::Number)
                .unwrap_or_else(|| json!({ "value": text })),
            Err(_) => json!({ "value": text }),
        },
        other => other,
    }
}

/// Fields shared by [`Job`] and [`JobSummary`] for in-memory filtering
pub trait JobRecord {
    fn job_name(&self) -> &str;
    fn sort_value(&self, field: SortField) -> f64;
}

fn sort_value(
    field: SortField,
    timestamp: i64,
    processed_on: Option<i64>,
    finished_on: Option<i64>,
    progress: &Value,
) -> f64 {
    match field {
        SortField::Timestamp => timestamp as f64,
        SortField::ProcessedOn => processed_on.unwrap_or(0) as f64,
        SortField::FinishedOn => finished_on.unwrap_or(0) as f64,
        SortField::Progress => progress.as_f64().unwrap_or(0.0),
    }
}

impl JobRecord for Job {
    fn job_name(&self) -> &str {
        &self.name
    }

    fn sort_value(&self, field: SortField) -> f64 {
        sort_value(field, self.timestamp, self.processed_on, self.finished_on, &self.progress)
    }
}

impl JobRecord for JobSummary {
    fn job_name(&self) -> &str {
        &self.name
    }

    fn sort_value(&self, field: SortField) -> f64 {
        sort_value(field, self.timestamp, self.processed_on, self.finished_on, &self.progress)
    }
}

/// Apply name filter, sort and limit to a fetched page
pub fn apply_query<T: JobRecord>(mut records: Vec<T>, options: &JobQueryOptions) -> Vec<T> {
    if let Some(name) = options.name.as_deref() {
        records.retain(|record| record.job_name() == name);
    }

    if let Some(sort) = options.sort {
        records.sort_by(|a, b| {
            let ordering = a
                .sort_value(sort.field)
                .partial_cmp(&b.sort_value(sort.field))
                .unwrap_or(Ordering::Equal);
            match sort.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
    }

    records.truncate(options.limit);
    records
}

/// Client name a worker registers for a queue: `<prefix>:<base64(queue)>`
pub fn worker_client_name(prefix: &str, queue: &str) -> String {
    format!(
        "{}:{}",
        prefix,
        base64::engine::general_purpose::STANDARD.encode(queue.as_bytes())
    )
}

/// Count `CLIENT LIST` entries registered as workers for a queue
pub fn count_workers(client_list: &str, prefix: &str, queue: &str) -> u32 {
    let expected = worker_client_name(prefix, queue);
    let scoped = format!("{}:", expected);

    client_list
        .lines()
        .filter_map(|line| {
            line.split_whitespace()
                .find_map(|pair| pair.strip_prefix("name="))
        })
        .filter(|name| *name == expected || name.starts_with(&scoped))
        .count() as u32
}
