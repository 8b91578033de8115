//! Legacy `bull` layout
//!
//! Queues are marked by their `id` counter. Paused queues keep waiting jobs
//! in the `paused` list and carry a `meta-paused` key. Status is always
//! inferred from job timestamps since the layout has no paused, prioritized
//! or flow states of its own.

use std::sync::Arc;

use super::adapter::{JobSource, PausedMarker, QueueLayout, RedisQueueService};
use super::capabilities::ProviderType;
use super::mapping::RawJob;
use super::redis_link::RedisLink;
use super::types::JobStatus;

pub struct BullLayout;

const SOURCES: &[JobSource] = &[
    JobSource::list("wait", JobStatus::Waiting),
    JobSource::list("paused", JobStatus::Waiting),
    JobSource::list("active", JobStatus::Active),
    JobSource::sorted_set("delayed", JobStatus::Delayed),
    JobSource::sorted_set("completed", JobStatus::Completed),
    JobSource::sorted_set("failed", JobStatus::Failed),
];

impl QueueLayout for BullLayout {
    const PROVIDER: ProviderType = ProviderType::Bull;
    const QUEUE_MARKER: &'static str = "id";
    const PAUSED_MARKER: PausedMarker = PausedMarker::Key("meta-paused");

    fn sources() -> &'static [JobSource] {
        SOURCES
    }

    fn resolve_status(raw: &RawJob, _stored: Option<JobStatus>, now_ms: i64) -> JobStatus {
        raw.infer_status(now_ms)
    }
}

pub type BullQueueService = RedisQueueService<BullLayout>;

pub fn new_bull_service(link: Arc<RedisLink>) -> BullQueueService {
    RedisQueueService::new(link)
}
