// Job definitions

use crate::schedule::{ActionRef, ScheduledJob};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unit of background work. Serialized as `{"job_type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job_type", content = "payload", rename_all = "snake_case")]
pub enum Job {
    DeleteCompletedTasks { user_id: Uuid },
    SendVerificationEmail { email: String, verification_link: String },
    SendNewPassword { email: String, new_password: String },
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("unknown scheduled action {0}")]
    UnknownAction(ActionRef),

    #[error("bad payload for {action}: {source}")]
    BadPayload {
        action: ActionRef,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct UserArgs {
    user_id: Uuid,
}

impl Job {
    pub fn job_type(&self) -> &'static str {
        match self {
            Job::DeleteCompletedTasks { .. } => "delete_completed_tasks",
            Job::SendVerificationEmail { .. } => "send_verification_email",
            Job::SendNewPassword { .. } => "send_new_password",
        }
    }

    /// Build the job a catalog entry stands for
    pub fn from_scheduled(scheduled: &ScheduledJob) -> Result<Self, JobError> {
        if scheduled.action == ActionRef::DELETE_COMPLETED_TASKS {
            let args: UserArgs = serde_json::from_value(scheduled.payload.clone()).map_err(|source| {
                JobError::BadPayload {
                    action: scheduled.action.clone(),
                    source,
                }
            })?;
            Ok(Job::DeleteCompletedTasks { user_id: args.user_id })
        } else {
            Err(JobError::UnknownAction(scheduled.action.clone()))
        }
    }
}
