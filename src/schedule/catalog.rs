//! Schedule catalog
//!
//! The catalog is the registry of named periodic jobs. It is always passed
//! around as `Arc<dyn ScheduleCatalog>` so the Postgres-backed registry and
//! the in-memory one are interchangeable.

use super::spec::{JobName, ScheduleSpec};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::RwLock;

/// Opaque reference to the routine a scheduled job runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionRef(Cow<'static, str>);

impl ActionRef {
    pub const DELETE_COMPLETED_TASKS: ActionRef = ActionRef(Cow::Borrowed("tasks.delete_completed"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A job to be registered in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct NewScheduledJob {
    pub name: JobName,
    pub schedule: ScheduleSpec,
    pub action: ActionRef,
    pub payload: serde_json::Value,
}

/// A job as held by the catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledJob {
    pub name: JobName,
    pub schedule: ScheduleSpec,
    pub action: ActionRef,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ScheduledJob {
    /// When the job is next due, counted from its last run (or registration)
    pub fn next_run_at(&self) -> Option<DateTime<Utc>> {
        self.schedule
            .next_fire_after(self.last_run_at.unwrap_or(self.created_at))
    }
}

/// Returned by [`ScheduleCatalog::create`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub name: JobName,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("schedule catalog unavailable: {0}")]
    Unavailable(String),

    #[error("a scheduled job named {0} already exists")]
    DuplicateJobName(JobName),

    #[error("no scheduled job named {0}")]
    NotFound(JobName),
}

impl From<sqlx::Error> for CatalogError {
    fn from(error: sqlx::Error) -> Self {
        CatalogError::Unavailable(error.to_string())
    }
}

#[async_trait]
pub trait ScheduleCatalog: Send + Sync {
    /// Remove the job with that name. Returns `NotFound` when there is none.
    async fn remove_by_name(&self, name: &JobName) -> Result<(), CatalogError>;

    /// Register a job. Fails with `DuplicateJobName` if the name is taken.
    async fn create(&self, job: NewScheduledJob) -> Result<JobHandle, CatalogError>;

    async fn get(&self, name: &JobName) -> Result<Option<ScheduledJob>, CatalogError>;

    async fn list(&self) -> Result<Vec<ScheduledJob>, CatalogError>;

    /// Claim the run due after `previous` by setting `last_run_at` to `at`.
    /// Returns `false` when `last_run_at` no longer equals `previous`, i.e.
    /// another dispatcher already claimed it.
    async fn record_run(
        &self,
        name: &JobName,
        previous: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool, CatalogError>;
}

/// Process-local catalog
#[derive(Default)]
pub struct MemoryCatalog {
    jobs: RwLock<BTreeMap<JobName, ScheduledJob>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl ScheduleCatalog for MemoryCatalog {
    async fn remove_by_name(&self, name: &JobName) -> Result<(), CatalogError> {
        match self.jobs.write().await.remove(name) {
            Some(_) => Ok(()),
            None => Err(CatalogError::NotFound(name.clone())),
        }
    }

    async fn create(&self, job: NewScheduledJob) -> Result<JobHandle, CatalogError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.name) {
            return Err(CatalogError::DuplicateJobName(job.name));
        }

        let created_at = Utc::now();
        let handle = JobHandle {
            name: job.name.clone(),
            created_at,
        };
        jobs.insert(
            job.name.clone(),
            ScheduledJob {
                name: job.name,
                schedule: job.schedule,
                action: job.action,
                payload: job.payload,
                created_at,
                last_run_at: None,
            },
        );
        Ok(handle)
    }

    async fn get(&self, name: &JobName) -> Result<Option<ScheduledJob>, CatalogError> {
        Ok(self.jobs.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<ScheduledJob>, CatalogError> {
        Ok(self.jobs.read().await.values().cloned().collect())
    }

    async fn record_run(
        &self,
        name: &JobName,
        previous: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool, CatalogError> {
        match self.jobs.write().await.get_mut(name) {
            Some(job) if job.last_run_at == previous => {
                job.last_run_at = Some(at);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CatalogError::NotFound(name.clone())),
        }
    }
}
