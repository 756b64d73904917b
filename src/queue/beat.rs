// Beat: turns due catalog entries into queued jobs

use super::jobs::Job;
use super::JobQueue;
use crate::schedule::ScheduleCatalog;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct Beat {
    catalog: Arc<dyn ScheduleCatalog>,
    queue: Arc<dyn JobQueue>,
    period: Duration,
}

impl Beat {
    pub fn new(catalog: Arc<dyn ScheduleCatalog>, queue: Arc<dyn JobQueue>, period: Duration) -> Self {
        Self {
            catalog,
            queue,
            period,
        }
    }

    /// Claim and enqueue every entry due at `now`. Returns how many fired.
    /// A failing entry is logged and skipped; only a failed listing aborts the tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let mut fired = 0;

        for entry in self.catalog.list().await? {
            let Some(due_at) = entry.next_run_at() else {
                continue;
            };
            if due_at > now {
                continue;
            }

            let job = match Job::from_scheduled(&entry) {
                Ok(job) => job,
                Err(e) => {
                    warn!("Skipping scheduled job {}: {}", entry.name, e);
                    continue;
                }
            };

            // Claim before enqueueing so concurrent beats dispatch each run once
            match self.catalog.record_run(&entry.name, entry.last_run_at, now).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Scheduled job {} already claimed", entry.name);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping scheduled job {}: {}", entry.name, e);
                    continue;
                }
            }

            debug!("Scheduled job {} due at {}", entry.name, due_at);
            if let Err(e) = self.queue.enqueue(job).await {
                error!("Failed to enqueue scheduled job {}: {:#}", entry.name, e);
                continue;
            }
            fired += 1;
        }

        Ok(fired)
    }

    pub async fn run(self) {
        info!("Beat started, checking schedules every {:?}", self.period);
        let mut interval = tokio::time::interval(self.period);
        loop {
            interval.tick().await;
            match self.tick(Utc::now()).await {
                Ok(0) => {}
                Ok(fired) => info!("Beat enqueued {} scheduled jobs", fired),
                Err(e) => error!("Beat tick failed: {:#}", e),
            }
        }
    }
}
