use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::JobStatus;

/// Job-queue protocol variant present on a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Bull,
    #[serde(rename = "bullmq")]
    BullMq,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Bull => "bull",
            ProviderType::BullMq => "bullmq",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueProviderCapabilities {
    pub provider_type: ProviderType,
    pub display_name: &'static str,
    pub supports_flows: bool,
    pub supported_statuses: &'static [JobStatus],
}

impl QueueProviderCapabilities {
    pub fn supports_status(&self, status: JobStatus) -> bool {
        self.supported_statuses.contains(&status)
    }
}

const BULL_STATUSES: &[JobStatus] = &[
    JobStatus::Waiting,
    JobStatus::Active,
    JobStatus::Completed,
    JobStatus::Failed,
    JobStatus::Delayed,
];

const BULLMQ_STATUSES: &[JobStatus] = &[
    JobStatus::Waiting,
    JobStatus::Active,
    JobStatus::Completed,
    JobStatus::Failed,
    JobStatus::Delayed,
    JobStatus::Paused,
    JobStatus::Prioritized,
    JobStatus::WaitingChildren,
];

pub fn get_provider_capabilities(provider_type: ProviderType) -> QueueProviderCapabilities {
    match provider_type {
        ProviderType::Bull => QueueProviderCapabilities {
            provider_type,
            display_name: "Bull",
            supports_flows: false,
            supported_statuses: BULL_STATUSES,
        },
        ProviderType::BullMq => QueueProviderCapabilities {
            provider_type,
            display_name: "BullMQ",
            supports_flows: true,
            supported_statuses: BULLMQ_STATUSES,
        },
    }
}
