// Worker: executes queued jobs

use super::jobs::Job;
use super::redis_queue::RedisQueue;
use crate::db::TaskStore;
use crate::email::{EmailMessage, Mailer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

const REDIS_POP_TIMEOUT: Duration = Duration::from_secs(5);
const REDIS_ERROR_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct Worker {
    tasks: Arc<dyn TaskStore>,
    mailer: Arc<dyn Mailer>,
    from_address: String,
}

impl Worker {
    pub fn new(tasks: Arc<dyn TaskStore>, mailer: Arc<dyn Mailer>, from_address: impl Into<String>) -> Self {
        Self {
            tasks,
            mailer,
            from_address: from_address.into(),
        }
    }

    pub async fn process_job(&self, job: Job) -> anyhow::Result<()> {
        info!("Processing job: {}", job.job_type());

        match job {
            Job::DeleteCompletedTasks { user_id } => self.process_delete_completed_tasks(user_id).await?,
            Job::SendVerificationEmail {
                email,
                verification_link,
            } => self.process_verification_email(&email, &verification_link).await?,
            Job::SendNewPassword { email, new_password } => {
                self.process_new_password_email(&email, &new_password).await?
            }
        }

        Ok(())
    }

    async fn process_delete_completed_tasks(&self, user_id: Uuid) -> anyhow::Result<()> {
        let deleted = self.tasks.delete_completed_tasks(user_id).await?;
        info!(%user_id, deleted, "Deleted completed tasks");
        Ok(())
    }

    async fn process_verification_email(&self, email: &str, verification_link: &str) -> anyhow::Result<()> {
        let message = EmailMessage::verification(&self.from_address, email, verification_link);
        self.mailer.send(message).await
    }

    async fn process_new_password_email(&self, email: &str, new_password: &str) -> anyhow::Result<()> {
        let message = EmailMessage::new_password(&self.from_address, email, new_password);
        self.mailer.send(message).await
    }

    /// Consume the in-process queue until every sender is gone
    pub async fn run_channel(self, mut receiver: mpsc::UnboundedReceiver<Job>) {
        info!("Worker started on in-process queue");
        while let Some(job) = receiver.recv().await {
            let job_type = job.job_type();
            if let Err(e) = self.process_job(job).await {
                error!("Job {} failed: {:#}", job_type, e);
            }
        }
        info!("Job queue closed, worker stopping");
    }

    /// Consume the Redis queue forever
    pub async fn run_redis(self, queue: RedisQueue) {
        info!("Worker started on Redis queue");
        loop {
            match queue.pop(REDIS_POP_TIMEOUT).await {
                Ok(Some(job)) => {
                    let job_type = job.job_type();
                    if let Err(e) = self.process_job(job).await {
                        error!("Job {} failed: {:#}", job_type, e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to pop job from Redis: {:#}", e);
                    tokio::time::sleep(REDIS_ERROR_BACKOFF).await;
                }
            }
        }
    }
}
