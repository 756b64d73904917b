//! Storage traits shared by the Postgres and in-memory backends

use crate::models::{NewTask, NewUser, Profile, Task, TaskFilter, TaskPatch, User};
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A unique field (`username` or `email`) is already in use
    #[error("{0} already taken")]
    Conflict(&'static str),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Short backend label for health reporting
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> StoreResult<()>;

    /// Create a user together with its default profile
    async fn create_user(&self, new_user: NewUser) -> StoreResult<User>;

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()>;

    async fn update_names(&self, user_id: Uuid, first_name: &str, last_name: &str) -> StoreResult<()>;

    /// Replace the email and mark it unverified
    async fn change_email(&self, user_id: Uuid, email: &str) -> StoreResult<()>;

    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>>;

    async fn save_profile(&self, profile: &Profile) -> StoreResult<()>;

    async fn create_email_verification(&self, user_id: Uuid) -> StoreResult<Uuid>;

    /// Consume a verification token and mark the owner's email verified.
    /// Returns the owner, or `None` for an unknown token.
    async fn consume_email_verification(&self, token: Uuid) -> StoreResult<Option<Uuid>>;

    async fn create_auth_token(&self, user_id: Uuid, token_hash: &str) -> StoreResult<()>;

    async fn find_user_by_token(&self, token_hash: &str) -> StoreResult<Option<User>>;

    async fn revoke_auth_token(&self, token_hash: &str) -> StoreResult<()>;

    async fn revoke_user_tokens(&self, user_id: Uuid) -> StoreResult<()>;
}

/// Task persistence. Every call is scoped to the owning user.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list_tasks(&self, user_id: Uuid, filter: TaskFilter) -> StoreResult<Vec<Task>>;

    async fn create_task(&self, user_id: Uuid, new_task: NewTask) -> StoreResult<Task>;

    async fn get_task(&self, user_id: Uuid, task_id: i64) -> StoreResult<Option<Task>>;

    async fn update_task(&self, user_id: Uuid, task_id: i64, patch: TaskPatch) -> StoreResult<Option<Task>>;

    async fn delete_task(&self, user_id: Uuid, task_id: i64) -> StoreResult<bool>;

    /// Delete every completed task of the user, returning how many went
    async fn delete_completed_tasks(&self, user_id: Uuid) -> StoreResult<u64>;
}
