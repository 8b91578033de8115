use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, instrument, warn};

use super::engine::AlertEvaluationEngine;

/// Drives the alert engine on a fixed interval
///
/// Ticks never overlap: a tick that fires while the previous one is still
/// running is skipped.
pub struct AlertScheduler {
    engine: Arc<AlertEvaluationEngine>,
    interval: Duration,
    scheduler: JobScheduler,
    running: Arc<Mutex<()>>,
}

impl AlertScheduler {
    pub async fn new(engine: Arc<AlertEvaluationEngine>, interval: Duration) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;

        Ok(Self {
            engine,
            interval,
            scheduler,
            running: Arc::new(Mutex::new(())),
        })
    }

    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let engine = self.engine.clone();
        let running = self.running.clone();

        let job = Job::new_repeated_async(self.interval, move |_uuid, _scheduler| {
            let engine = engine.clone();
            let running = running.clone();

            Box::pin(async move {
                run_guarded(&engine, &running).await;
            })
        })
        .map_err(|e| anyhow!("Failed to create alert evaluation job: {}", e))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to add alert evaluation job to scheduler: {}", e))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start alert scheduler: {}", e))?;

        info!(
            "Alert scheduler started, evaluating every {}s",
            self.interval.as_secs()
        );
        Ok(())
    }

    /// Run one tick now, honouring the overlap guard
    pub async fn run_once(&self) -> bool {
        run_guarded(&self.engine, &self.running).await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| anyhow!("Failed to stop alert scheduler: {}", e))?;
        info!("Alert scheduler stopped");
        Ok(())
    }
}

/// Returns false when the tick was skipped because another is in flight
async fn run_guarded(engine: &AlertEvaluationEngine, running: &Mutex<()>) -> bool {
    let Ok(_guard) = running.try_lock() else {
        warn!("Previous alert tick still running, skipping this one");
        return false;
    };

    if let Err(e) = engine.tick().await {
        error!("Alert evaluation tick failed: {:#}", e);
    }
    true
}
