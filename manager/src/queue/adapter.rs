//! Redis-backed [`QueueService`] shared by both queue variants
//!
//! The variants differ only in where jobs of each status are stored, how
//! the paused flag is kept and how a job's status is resolved. Those
//! differences live in a [`QueueLayout`]; everything else is implemented
//! once here.

use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::capabilities::{get_provider_capabilities, ProviderType};
use super::keys::{discover_queue_names, QueueKeys};
use super::mapping::{apply_query, count_workers, now_ms, RawJob};
use super::redis_link::{scan_keys, RedisConnection, RedisLink};
use super::types::{
    Job, JobCounts, JobQueryOptions, JobStatus, JobSummary, QueueInfo, WorkerCount,
};
use super::QueueService;
use crate::errors::{QueueError, QueueResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    List,
    SortedSet,
}

/// One Redis key holding job ids of a given status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSource {
    pub suffix: &'static str,
    pub kind: StoreKind,
    pub status: JobStatus,
}

impl JobSource {
    pub const fn list(suffix: &'static str, status: JobStatus) -> Self {
        Self {
            suffix,
            kind: StoreKind::List,
            status,
        }
    }

    pub const fn sorted_set(suffix: &'static str, status: JobStatus) -> Self {
        Self {
            suffix,
            kind: StoreKind::SortedSet,
            status,
        }
    }

    fn kind_tag(&self) -> &'static str {
        match self.kind {
            StoreKind::List => "l",
            StoreKind::SortedSet => "z",
        }
    }
}

/// Where the paused flag of a queue lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PausedMarker {
    /// A standalone key whose existence means paused
    Key(&'static str),
    /// A field inside a hash
    HashField {
        suffix: &'static str,
        field: &'static str,
    },
}

impl PausedMarker {
    fn key(&self, keys: &QueueKeys) -> String {
        match self {
            PausedMarker::Key(suffix) => keys.key(suffix),
            PausedMarker::HashField { suffix, .. } => keys.key(suffix),
        }
    }

    /// Empty when the marker is a plain key
    fn field(&self) -> &'static str {
        match self {
            PausedMarker::Key(_) => "",
            PausedMarker::HashField { field, .. } => *field,
        }
    }
}

/// Variant-specific storage layout
pub trait QueueLayout: Send + Sync + 'static {
    const PROVIDER: ProviderType;

    /// Key suffix whose presence marks an existing queue
    const QUEUE_MARKER: &'static str;

    const PAUSED_MARKER: PausedMarker;

    /// Every key that can hold job ids, in lookup order
    fn sources() -> &'static [JobSource];

    /// Final status for a job given the source it was read from
    fn resolve_status(raw: &RawJob, stored: Option<JobStatus>, now_ms: i64) -> JobStatus;
}

/// Moves every id from KEYS[1] to KEYS[2] and sets (ARGV[2] = '1') or
/// clears the paused marker KEYS[3]. ARGV[1] is the marker hash field, empty
/// for a plain key.
const MOVE_WAITING_SCRIPT: &str = r#"
local waiting = redis.call('LRANGE', KEYS[1], 0, -1)
if #waiting > 0 then
  if redis.call('EXISTS', KEYS[2]) == 0 then
    redis.call('RENAME', KEYS[1], KEYS[2])
  else
    for i = #waiting, 1, -1 do
      redis.call('LPUSH', KEYS[2], waiting[i])
    end
    redis.call('DEL', KEYS[1])
  end
end
if ARGV[2] == '1' then
  if ARGV[1] == '' then
    redis.call('SET', KEYS[3], 1)
  else
    redis.call('HSET', KEYS[3], ARGV[1], 1)
  end
else
  if ARGV[1] == '' then
    redis.call('DEL', KEYS[3])
  else
    redis.call('HDEL', KEYS[3], ARGV[1])
  end
end
return #waiting
"#;

const RETRY_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -1
end
if redis.call('ZREM', KEYS[2], ARGV[1]) == 0 then
  return -2
end
redis.call('HDEL', KEYS[1], 'finishedOn', 'processedOn', 'failedReason', 'returnvalue')
local paused
if ARGV[2] == '' then
  paused = redis.call('EXISTS', KEYS[5]) == 1
else
  paused = redis.call('HEXISTS', KEYS[5], ARGV[2]) == 1
end
if paused then
  redis.call('LPUSH', KEYS[4], ARGV[1])
else
  redis.call('LPUSH', KEYS[3], ARGV[1])
end
return 1
"#;

const STATE_SCRIPT: &str = r#"
for i, key in ipairs(KEYS) do
  if ARGV[i + 1] == 'z' then
    if redis.call('ZSCORE', key, ARGV[1]) then
      return i
    end
  else
    local ok, pos = pcall(redis.call, 'LPOS', key, ARGV[1])
    if ok then
      if pos then
        return i
      end
    else
      for _, value in ipairs(redis.call('LRANGE', key, 0, -1)) do
        if value == ARGV[1] then
          return i
        end
      end
    end
  end
end
return 0
"#;

/// Inclusive LRANGE/ZREVRANGE bounds for a page, clamped to what Redis accepts
fn page_bounds(offset: usize, limit: usize) -> (isize, isize) {
    let last = offset.saturating_add(limit.saturating_sub(1));
    let clamp = |index: usize| isize::try_from(index).unwrap_or(isize::MAX);
    (clamp(offset), clamp(last))
}

pub struct RedisQueueService<L: QueueLayout> {
    link: Arc<RedisLink>,
    _layout: PhantomData<L>,
}

impl<L: QueueLayout> RedisQueueService<L> {
    pub fn new(link: Arc<RedisLink>) -> Self {
        Self {
            link,
            _layout: PhantomData,
        }
    }

    fn keys(&self, queue: &str) -> QueueKeys {
        QueueKeys::new(self.link.prefix(), queue)
    }

    fn sources_for(status: JobStatus) -> impl Iterator<Item = &'static JobSource> {
        L::sources().iter().filter(move |source| source.status == status)
    }

    async fn is_paused(&self, conn: &mut RedisConnection, keys: &QueueKeys) -> QueueResult<bool> {
        let paused: bool = match L::PAUSED_MARKER {
            PausedMarker::Key(suffix) => {
                redis::cmd("EXISTS").arg(keys.key(suffix)).query_async(conn).await?
            }
            PausedMarker::HashField { suffix, field } => {
                redis::cmd("HEXISTS")
                    .arg(keys.key(suffix))
                    .arg(field)
                    .query_async(conn)
                    .await?
            }
        };
        Ok(paused)
    }

    async fn counts(&self, conn: &mut RedisConnection, keys: &QueueKeys) -> QueueResult<JobCounts> {
        let sources = L::sources();
        let mut pipe = redis::pipe();
        for source in sources {
            match source.kind {
                StoreKind::List => pipe.cmd("LLEN").arg(keys.key(source.suffix)),
                StoreKind::SortedSet => pipe.cmd("ZCARD").arg(keys.key(source.suffix)),
            };
        }
        let lengths: Vec<u64> = pipe.query_async(conn).await?;

        let mut counts = JobCounts::default();
        for (source, length) in sources.iter().zip(lengths) {
            let slot = match source.status {
                JobStatus::Waiting => &mut counts.waiting,
                JobStatus::Active => &mut counts.active,
                JobStatus::Completed => &mut counts.completed,
                JobStatus::Failed => &mut counts.failed,
                JobStatus::Delayed => &mut counts.delayed,
                JobStatus::Paused => &mut counts.paused,
                JobStatus::Prioritized => &mut counts.prioritized,
                JobStatus::WaitingChildren => &mut counts.waiting_children,
            };
            *slot += length;
        }
        Ok(counts)
    }

    async fn queue_info(&self, name: String) -> QueueResult<QueueInfo> {
        let mut conn = self.link.conn().await?;
        let keys = self.keys(&name);
        let is_paused = self.is_paused(&mut conn, &keys).await?;
        let job_counts = self.counts(&mut conn, &keys).await?;
        Ok(QueueInfo {
            name,
            is_paused,
            job_counts,
        })
    }

    /// Ids per source for the requested statuses, paged by offset and limit
    async fn fetch_page(
        &self,
        conn: &mut RedisConnection,
        keys: &QueueKeys,
        options: &JobQueryOptions,
    ) -> QueueResult<Vec<(String, JobStatus)>> {
        let statuses: Vec<JobStatus> = match &options.status {
            Some(statuses) => statuses.clone(),
            None => get_provider_capabilities(L::PROVIDER).supported_statuses.to_vec(),
        };
        if options.limit == 0 {
            return Ok(Vec::new());
        }

        let (start, stop) = page_bounds(options.offset, options.limit);

        let mut seen = HashSet::new();
        let mut page = Vec::new();
        for status in statuses {
            for source in Self::sources_for(status) {
                let key = keys.key(source.suffix);
                let ids: Vec<String> = match source.kind {
                    StoreKind::List => {
                        redis::cmd("LRANGE")
                            .arg(&key)
                            .arg(start)
                            .arg(stop)
                            .query_async(conn)
                            .await?
                    }
                    StoreKind::SortedSet => {
                        redis::cmd("ZREVRANGE")
                            .arg(&key)
                            .arg(start)
                            .arg(stop)
                            .query_async(conn)
                            .await?
                    }
                };
                for id in ids {
                    if seen.insert(id.clone()) {
                        page.push((id, source.status));
                    }
                }
            }
        }
        Ok(page)
    }

    async fn load_raw(
        &self,
        conn: &mut RedisConnection,
        keys: &QueueKeys,
        ids: &[(String, JobStatus)],
    ) -> QueueResult<Vec<(RawJob, JobStatus)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for (id, _) in ids {
            pipe.cmd("HGETALL").arg(keys.job(id));
        }
        let hashes: Vec<HashMap<String, String>> = pipe.query_async(conn).await?;

        let now = now_ms();
        Ok(ids
            .iter()
            .zip(hashes)
            .filter_map(|((id, stored), hash)| {
                RawJob::from_hash(id, hash).map(|raw| {
                    let status = L::resolve_status(&raw, Some(*stored), now);
                    (raw, status)
                })
            })
            .collect())
    }

    async fn fetch_raw(
        &self,
        name: &str,
        options: &JobQueryOptions,
    ) -> QueueResult<Vec<(RawJob, JobStatus)>> {
        let mut conn = self.link.conn().await?;
        let keys = self.keys(name);
        let page = self.fetch_page(&mut conn, &keys, options).await?;
        self.load_raw(&mut conn, &keys, &page).await
    }

    async fn move_waiting(
        &self,
        keys: &QueueKeys,
        from: &str,
        to: &str,
        pause: bool,
    ) -> QueueResult<i64> {
        let mut conn = self.link.conn().await?;
        let moved: i64 = redis::Script::new(MOVE_WAITING_SCRIPT)
            .key(from)
            .key(to)
            .key(L::PAUSED_MARKER.key(keys))
            .arg(L::PAUSED_MARKER.field())
            .arg(if pause { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }

    /// Status a job is stored under, if any
    async fn stored_status(
        &self,
        conn: &mut RedisConnection,
        keys: &QueueKeys,
        job_id: &str,
    ) -> QueueResult<Option<JobStatus>> {
        let sources = L::sources();
        let script = redis::Script::new(STATE_SCRIPT);
        let mut invocation = script.prepare_invoke();
        for source in sources {
            invocation.key(keys.key(source.suffix));
        }
        invocation.arg(job_id);
        for source in sources {
            invocation.arg(source.kind_tag());
        }

        let index: i64 = invocation.invoke_async(conn).await?;
        if index <= 0 {
            return Ok(None);
        }
        Ok(sources.get(index as usize - 1).map(|source| source.status))
    }

    async fn load_job(
        &self,
        conn: &mut RedisConnection,
        keys: &QueueKeys,
        job_id: &str,
    ) -> QueueResult<Option<(RawJob, JobStatus)>> {
        let hash: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(keys.job(job_id))
            .query_async(conn)
            .await?;
        let Some(raw) = RawJob::from_hash(job_id, hash) else {
            return Ok(None);
        };
        let stored = self.stored_status(conn, keys, job_id).await?;
        let status = L::resolve_status(&raw, stored, now_ms());
        Ok(Some((raw, status)))
    }
}

#[async_trait]
impl<L: QueueLayout> QueueService for RedisQueueService<L> {
    fn provider_type(&self) -> ProviderType {
        L::PROVIDER
    }

    async fn connect(&self) -> QueueResult<()> {
        self.link.connect().await
    }

    async fn disconnect(&self) -> QueueResult<()> {
        self.link.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    #[instrument(skip(self), fields(provider = %L::PROVIDER))]
    async fn get_queues(&self) -> QueueResult<Vec<QueueInfo>> {
        let mut conn = self.link.conn().await?;
        let pattern = format!("{}:*:{}", self.link.prefix(), L::QUEUE_MARKER);
        let keys = scan_keys(&mut conn, &pattern).await?;
        let names = discover_queue_names(self.link.prefix(), keys);
        debug!("Discovered {} queues", names.len());

        try_join_all(names.into_iter().map(|name| self.queue_info(name))).await
    }

    async fn get_queue(&self, name: &str) -> QueueResult<Option<QueueInfo>> {
        let mut conn = self.link.conn().await?;
        let marker = self.keys(name).key(L::QUEUE_MARKER);
        let exists: bool = redis::cmd("EXISTS").arg(marker).query_async(&mut conn).await?;
        if !exists {
            return Ok(None);
        }
        self.queue_info(name.to_string()).await.map(Some)
    }

    #[instrument(skip(self), fields(provider = %L::PROVIDER))]
    async fn pause_queue(&self, name: &str) -> QueueResult<()> {
        let keys = self.keys(name);
        let moved = self.move_waiting(&keys, &keys.wait(), &keys.paused(), true).await?;
        info!("Paused queue '{}' ({} waiting jobs moved)", name, moved);
        Ok(())
    }

    #[instrument(skip(self), fields(provider = %L::PROVIDER))]
    async fn resume_queue(&self, name: &str) -> QueueResult<()> {
        let keys = self.keys(name);
        let moved = self.move_waiting(&keys, &keys.paused(), &keys.wait(), false).await?;
        info!("Resumed queue '{}' ({} jobs moved back to wait)", name, moved);
        Ok(())
    }

    async fn get_job_counts(&self, name: &str) -> QueueResult<JobCounts> {
        let mut conn = self.link.conn().await?;
        let keys = self.keys(name);
        self.counts(&mut conn, &keys).await
    }

    async fn get_jobs(&self, name: &str, options: &JobQueryOptions) -> QueueResult<Vec<Job>> {
        let jobs = self
            .fetch_raw(name, options)
            .await?
            .into_iter()
            .map(|(raw, status)| raw.into_job(name, status))
            .collect();
        Ok(apply_query(jobs, options))
    }

    async fn get_jobs_summary(
        &self,
        name: &str,
        options: &JobQueryOptions,
    ) -> QueueResult<Vec<JobSummary>> {
        let summaries = self
            .fetch_raw(name, options)
            .await?
            .into_iter()
            .map(|(raw, status)| raw.into_summary(name, status))
            .collect();
        Ok(apply_query(summaries, options))
    }

    async fn get_job(&self, name: &str, job_id: &str) -> QueueResult<Option<Job>> {
        let mut conn = self.link.conn().await?;
        let keys = self.keys(name);
        Ok(self
            .load_job(&mut conn, &keys, job_id)
            .await?
            .map(|(raw, status)| raw.into_job(name, status)))
    }

    #[instrument(skip(self), fields(provider = %L::PROVIDER))]
    async fn retry_job(&self, name: &str, job_id: &str) -> QueueResult<()> {
        let mut conn = self.link.conn().await?;
        let keys = self.keys(name);
        let outcome: i64 = redis::Script::new(RETRY_SCRIPT)
            .key(keys.job(job_id))
            .key(keys.failed())
            .key(keys.wait())
            .key(keys.paused())
            .key(L::PAUSED_MARKER.key(&keys))
            .arg(job_id)
            .arg(L::PAUSED_MARKER.field())
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            -1 => Err(QueueError::JobNotFound {
                queue: name.to_string(),
                job_id: job_id.to_string(),
            }),
            -2 => {
                let state = self
                    .load_job(&mut conn, &keys, job_id)
                    .await?
                    .map(|(_, status)| status.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                Err(QueueError::InvalidJobState {
                    queue: name.to_string(),
                    job_id: job_id.to_string(),
                    state,
                    expected: JobStatus::Failed.to_string(),
                })
            }
            _ => {
                info!("Retried job {} in queue '{}'", job_id, name);
                Ok(())
            }
        }
    }

    #[instrument(skip(self), fields(provider = %L::PROVIDER))]
    async fn remove_job(&self, name: &str, job_id: &str) -> QueueResult<()> {
        let mut conn = self.link.conn().await?;
        let keys = self.keys(name);

        let exists: bool = redis::cmd("EXISTS")
            .arg(keys.job(job_id))
            .query_async(&mut conn)
            .await?;
        if !exists {
            return Err(QueueError::JobNotFound {
                queue: name.to_string(),
                job_id: job_id.to_string(),
            });
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for source in L::sources() {
            match source.kind {
                StoreKind::List => pipe.cmd("LREM").arg(keys.key(source.suffix)).arg(0).arg(job_id),
                StoreKind::SortedSet => pipe.cmd("ZREM").arg(keys.key(source.suffix)).arg(job_id),
            }
            .ignore();
        }
        pipe.cmd("DEL").arg(keys.job(job_id)).arg(keys.logs(job_id)).ignore();
        let _: () = pipe.query_async(&mut conn).await?;

        info!("Removed job {} from queue '{}'", job_id, name);
        Ok(())
    }

    async fn get_worker_count(&self, name: &str) -> QueueResult<WorkerCount> {
        let mut conn = self.link.conn().await?;
        let clients: String = redis::cmd("CLIENT").arg("LIST").query_async(&mut conn).await?;
        Ok(WorkerCount {
            queue_name: name.to_string(),
            count: count_workers(&clients, self.link.prefix(), name),
        })
    }
}
