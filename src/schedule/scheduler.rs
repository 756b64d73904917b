//! Per-user deletion scheduler
//!
//! Keeps at most one `delete_tasks_<username>` entry in the catalog, matching
//! the user's current [`DeletionFrequency`].

use super::catalog::{ActionRef, CatalogError, JobHandle, NewScheduledJob, ScheduleCatalog};
use super::policy::resolve;
use super::spec::{DeletionFrequency, JobName};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PerUserScheduler {
    catalog: Arc<dyn ScheduleCatalog>,
}

impl PerUserScheduler {
    pub fn new(catalog: Arc<dyn ScheduleCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<dyn ScheduleCatalog> {
        &self.catalog
    }

    /// Replace the user's deletion job with one matching `frequency`.
    ///
    /// The old entry is removed before the new one is created, never
    /// concurrently. A missing old entry is fine. Returns the handle of the
    /// new job, or `None` when the frequency is `Never`.
    pub async fn apply(
        &self,
        user_id: Uuid,
        username: &str,
        frequency: DeletionFrequency,
    ) -> Result<Option<JobHandle>, CatalogError> {
        let name = JobName::for_user(username);

        match self.catalog.remove_by_name(&name).await {
            Ok(()) => debug!(job = %name, "Removed existing deletion job"),
            Err(CatalogError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let Some(schedule) = resolve(frequency) else {
            info!(job = %name, "Task deletion disabled");
            return Ok(None);
        };

        let job = NewScheduledJob {
            name: name.clone(),
            schedule,
            action: ActionRef::DELETE_COMPLETED_TASKS,
            payload: serde_json::json!({ "user_id": user_id }),
        };

        match self.catalog.create(job).await {
            Ok(handle) => {
                info!(job = %name, %schedule, "Scheduled task deletion");
                Ok(Some(handle))
            }
            Err(e @ CatalogError::DuplicateJobName(_)) => {
                // Only reachable when two applies for the same user interleave
                error!(job = %name, "Deletion job registered concurrently: {}", e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Bring the catalog in line with `frequency`, writing only when the
    /// stored entry is missing or differs from what `apply` would create.
    pub async fn reconcile(
        &self,
        user_id: Uuid,
        username: &str,
        frequency: DeletionFrequency,
    ) -> Result<Option<JobHandle>, CatalogError> {
        let name = JobName::for_user(username);
        let existing = self.catalog.get(&name).await?;

        match (existing, resolve(frequency)) {
            (None, None) => Ok(None),
            (Some(job), Some(schedule))
                if job.schedule == schedule
                    && job.action == ActionRef::DELETE_COMPLETED_TASKS
                    && job.payload == serde_json::json!({ "user_id": user_id }) =>
            {
                Ok(Some(JobHandle {
                    name: job.name,
                    created_at: job.created_at,
                }))
            }
            _ => {
                warn!(job = %name, %frequency, "Deletion job out of sync, reapplying");
                self.apply(user_id, username, frequency).await
            }
        }
    }

    /// Hook for the profile-update path. An unchanged value only reconciles,
    /// so a job lost to an earlier failure is recreated on resubmission.
    pub async fn on_frequency_changed(
        &self,
        user_id: Uuid,
        username: &str,
        previous: DeletionFrequency,
        new: DeletionFrequency,
    ) -> Result<Option<JobHandle>, CatalogError> {
        if previous == new {
            return self.reconcile(user_id, username, new).await;
        }
        info!(%user_id, %previous, %new, "Deletion frequency changed");
        self.apply(user_id, username, new).await
    }
}
