//! Background job queue
//!
//! Jobs are produced by request handlers and the beat runner, and consumed by
//! the [`Worker`]. Two transports exist: an in-process channel for a single
//! process deployment, and a Redis list shared between web and worker
//! processes.

pub mod beat;
pub mod jobs;
pub mod redis_queue;
pub mod workers;

pub use beat::Beat;
pub use jobs::{Job, JobError};
pub use redis_queue::RedisQueue;
pub use workers::Worker;

use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Short transport label for health reporting
    fn transport(&self) -> &'static str;

    async fn enqueue(&self, job: Job) -> anyhow::Result<()>;
}

/// In-process queue backed by an unbounded channel
#[derive(Clone)]
pub struct ChannelQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl ChannelQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl JobQueue for ChannelQueue {
    fn transport(&self) -> &'static str {
        "channel"
    }

    async fn enqueue(&self, job: Job) -> anyhow::Result<()> {
        self.sender
            .send(job)
            .map_err(|e| anyhow::anyhow!("Job queue closed, dropped {}", e.0.job_type()))
    }
}
