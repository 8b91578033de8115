use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::capabilities::ProviderType;
use crate::errors::QueueResult;

/// Read-only view of a backend key namespace
#[async_trait]
pub trait KeyspaceScanner: Send + Sync {
    /// True when at least one key matches the glob `pattern`
    async fn has_keys(&self, pattern: &str) -> QueueResult<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionConfidence {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionSource {
    MetaKeys,
    IdKeys,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub provider_type: ProviderType,
    pub confidence: DetectionConfidence,
    pub detected_from: DetectionSource,
}

impl DetectionResult {
    fn fallback() -> Self {
        Self {
            provider_type: ProviderType::BullMq,
            confidence: DetectionConfidence::Low,
            detected_from: DetectionSource::Default,
        }
    }
}

/// Decide which queue variant owns the `prefix` namespace
///
/// `meta` hashes only exist in the newer layout and win over `id` counters.
/// An empty namespace or a failed scan yields the newer layout at low
/// confidence.
pub async fn detect_provider(keyspace: &dyn KeyspaceScanner, prefix: &str) -> DetectionResult {
    match scan_signatures(keyspace, prefix).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Provider detection failed for prefix '{}', defaulting to bullmq: {}", prefix, e);
            DetectionResult::fallback()
        }
    }
}

async fn scan_signatures(keyspace: &dyn KeyspaceScanner, prefix: &str) -> QueueResult<DetectionResult> {
    if keyspace.has_keys(&format!("{}:*:meta", prefix)).await? {
        return Ok(DetectionResult {
            provider_type: ProviderType::BullMq,
            confidence: DetectionConfidence::High,
            detected_from: DetectionSource::MetaKeys,
        });
    }

    if keyspace.has_keys(&format!("{}:*:id", prefix)).await? {
        return Ok(DetectionResult {
            provider_type: ProviderType::Bull,
            confidence: DetectionConfidence::High,
            detected_from: DetectionSource::IdKeys,
        });
    }

    Ok(DetectionResult::fallback())
}
