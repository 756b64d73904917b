//! Redis list transport (`LPUSH` to produce, `BRPOP` to consume)
//!
//! A blocking pop holds its connection until it returns, so a process that
//! both consumes and produces keeps one `RedisQueue` for each.

use super::{Job, JobQueue};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

#[derive(Clone)]
pub struct RedisQueue {
    connection: ConnectionManager,
    key: String,
}

impl RedisQueue {
    pub async fn connect(url: &str, key: impl Into<String>) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            key: key.into(),
        })
    }

    /// Wait up to `timeout` for the next job
    pub async fn pop(&self, timeout: Duration) -> anyhow::Result<Option<Job>> {
        let mut connection = self.connection.clone();
        let popped: Option<(String, String)> = connection.brpop(&self.key, timeout.as_secs_f64()).await?;

        match popped {
            Some((_, raw)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    fn transport(&self) -> &'static str {
        "redis"
    }

    async fn enqueue(&self, job: Job) -> anyhow::Result<()> {
        let raw = serde_json::to_string(&job)?;
        let mut connection = self.connection.clone();
        let _: i64 = connection.lpush(&self.key, raw).await?;
        Ok(())
    }
}
