//! `bullmq` layout
//!
//! Queues are marked by their `meta` hash, which also holds the `paused`
//! field. Status comes from the key a job id is stored in.

use std::sync::Arc;

use super::adapter::{JobSource, PausedMarker, QueueLayout, RedisQueueService};
use super::capabilities::ProviderType;
use super::mapping::RawJob;
use super::redis_link::RedisLink;
use super::types::JobStatus;

pub struct BullMqLayout;

const SOURCES: &[JobSource] = &[
    JobSource::list("wait", JobStatus::Waiting),
    JobSource::list("paused", JobStatus::Paused),
    JobSource::list("active", JobStatus::Active),
    JobSource::sorted_set("prioritized", JobStatus::Prioritized),
    JobSource::sorted_set("waiting-children", JobStatus::WaitingChildren),
    JobSource::sorted_set("delayed", JobStatus::Delayed),
    JobSource::sorted_set("completed", JobStatus::Completed),
    JobSource::sorted_set("failed", JobStatus::Failed),
];

impl QueueLayout for BullMqLayout {
    const PROVIDER: ProviderType = ProviderType::BullMq;
    const QUEUE_MARKER: &'static str = "meta";
    const PAUSED_MARKER: PausedMarker = PausedMarker::HashField {
        suffix: "meta",
        field: "paused",
    };

    fn sources() -> &'static [JobSource] {
        SOURCES
    }

    /// A waiting job whose delay has not elapsed is reported as delayed.
    /// Jobs found in no known key fall back to inference.
    fn resolve_status(raw: &RawJob, stored: Option<JobStatus>, now_ms: i64) -> JobStatus {
        match stored {
            Some(JobStatus::Waiting) if raw.is_delay_pending(now_ms) => JobStatus::Delayed,
            Some(status) => status,
            None => raw.infer_status(now_ms),
        }
    }
}

pub type BullMqQueueService = RedisQueueService<BullMqLayout>;

pub fn new_bullmq_service(link: Arc<RedisLink>) -> BullMqQueueService {
    RedisQueueService::new(link)
}
