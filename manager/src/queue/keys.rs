//! Redis key layout shared by both queue variants
//!
//! Every queue lives under `<prefix>:<queue>:` with one key per job state
//! plus a hash per job at `<prefix>:<queue>:<job id>`.

use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct QueueKeys {
    base: String,
}

impl QueueKeys {
    pub fn new(prefix: &str, queue: &str) -> Self {
        Self {
            base: format!("{}:{}", prefix, queue),
        }
    }

    pub fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.base, suffix)
    }

    pub fn wait(&self) -> String {
        self.key("wait")
    }

    pub fn paused(&self) -> String {
        self.key("paused")
    }

    pub fn active(&self) -> String {
        self.key("active")
    }

    pub fn delayed(&self) -> String {
        self.key("delayed")
    }

    pub fn completed(&self) -> String {
        self.key("completed")
    }

    pub fn failed(&self) -> String {
        self.key("failed")
    }

    pub fn prioritized(&self) -> String {
        self.key("prioritized")
    }

    pub fn waiting_children(&self) -> String {
        self.key("waiting-children")
    }

    pub fn meta(&self) -> String {
        self.key("meta")
    }

    /// Paused marker used by the legacy layout
    pub fn meta_paused(&self) -> String {
        self.key("meta-paused")
    }

    pub fn id(&self) -> String {
        self.key("id")
    }

    pub fn job(&self, job_id: &str) -> String {
        self.key(job_id)
    }

    pub fn logs(&self, job_id: &str) -> String {
        format!("{}:{}:logs", self.base, job_id)
    }
}

/// Extract the queue name from a `<prefix>:<queue>:<suffix>` key
pub fn queue_name_from_key(prefix: &str, key: &str) -> Option<String> {
    let rest = key.strip_prefix(prefix)?.strip_prefix(':')?;
    let name = rest.split(':').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Deduplicated, sorted queue names discovered from a set of marker keys
pub fn discover_queue_names<I>(prefix: &str, keys: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    keys.into_iter()
        .filter_map(|key| queue_name_from_key(prefix, &key))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
