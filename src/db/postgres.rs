//! Postgres storage
//!
//! One pool-backed store implements the user, task and schedule-catalog
//! traits. Queries are checked at runtime so the crate builds without a
//! database.

use super::store::{StoreError, StoreResult, TaskStore, UserStore};
use crate::models::{NewTask, NewUser, Profile, Task, TaskFilter, TaskPatch, User};
use crate::schedule::{
    ActionRef, CatalogError, JobHandle, JobName, NewScheduledJob, ScheduleCatalog, ScheduleSpec, ScheduledJob,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, password_hash, created_at";
const TASK_COLUMNS: &str = "id, user_id, name, description, created_at, complete";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Map a unique violation on `users` to the field that collided
fn user_conflict(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some(constraint) if constraint.contains("email") => StoreError::Conflict("email"),
                _ => StoreError::Conflict("username"),
            };
        }
    }
    StoreError::Database(error)
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: Uuid,
    bio: String,
    agreement_accepted: bool,
    email_verified: bool,
    cookies_accepted: bool,
    delete_frequency: String,
    avatar: Option<String>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let delete_frequency = row
            .delete_frequency
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("profile {}: {}", row.user_id, e)))?;
        Ok(Profile {
            user_id: row.user_id,
            bio: row.bio,
            agreement_accepted: row.agreement_accepted,
            email_verified: row.email_verified,
            cookies_accepted: row.cookies_accepted,
            delete_frequency,
            avatar: row.avatar,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ScheduledJobRow {
    name: String,
    schedule: Json<ScheduleSpec>,
    action: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    last_run_at: Option<DateTime<Utc>>,
}

impl From<ScheduledJobRow> for ScheduledJob {
    fn from(row: ScheduledJobRow) -> Self {
        ScheduledJob {
            name: JobName::from_stored(row.name),
            schedule: row.schedule.0,
            action: ActionRef::new(row.action),
            payload: row.payload,
            created_at: row.created_at,
            last_run_at: row.last_run_at,
        }
    }
}

#[async_trait]
impl UserStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, email, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(user_conflict)?;

        sqlx::query("INSERT INTO profiles (user_id, agreement_accepted) VALUES ($1, $2)")
            .bind(user.id)
            .bind(new_user.agreement_accepted)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_names(&self, user_id: Uuid, first_name: &str, last_name: &str) -> StoreResult<()> {
        sqlx::query("UPDATE users SET first_name = $2, last_name = $3 WHERE id = $1")
            .bind(user_id)
            .bind(first_name)
            .bind(last_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn change_email(&self, user_id: Uuid, email: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET email = $2 WHERE id = $1")
            .bind(user_id)
            .bind(email)
            .execute(&mut *tx)
            .await
            .map_err(user_conflict)?;

        sqlx::query("UPDATE profiles SET email_verified = FALSE WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT user_id, bio, agreement_accepted, email_verified, cookies_accepted, delete_frequency, avatar
            FROM profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Profile::try_from).transpose()
    }

    async fn save_profile(&self, profile: &Profile) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE profiles
            SET bio = $2, agreement_accepted = $3, email_verified = $4,
                cookies_accepted = $5, delete_frequency = $6, avatar = $7
            WHERE user_id = $1
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.bio)
        .bind(profile.agreement_accepted)
        .bind(profile.email_verified)
        .bind(profile.cookies_accepted)
        .bind(profile.delete_frequency.as_str())
        .bind(&profile.avatar)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_email_verification(&self, user_id: Uuid) -> StoreResult<Uuid> {
        let token = Uuid::new_v4();
        sqlx::query("INSERT INTO email_verifications (token, user_id) VALUES ($1, $2)")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(token)
    }

    async fn consume_email_verification(&self, token: Uuid) -> StoreResult<Option<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<Uuid> =
            sqlx::query_scalar("DELETE FROM email_verifications WHERE token = $1 RETURNING user_id")
                .bind(token)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some(user_id) = user_id {
            sqlx::query("UPDATE profiles SET email_verified = TRUE WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(user_id)
    }

    async fn create_auth_token(&self, user_id: Uuid, token_hash: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO auth_tokens (token_hash, user_id) VALUES ($1, $2)")
            .bind(token_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_user_by_token(&self, token_hash: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.password_hash, u.created_at
            FROM auth_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn revoke_auth_token(&self, token_hash: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM auth_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_user_tokens(&self, user_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM auth_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn list_tasks(&self, user_id: Uuid, filter: TaskFilter) -> StoreResult<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE user_id = $1 AND ($2::BOOLEAN IS NULL OR complete = $2)
            ORDER BY id ASC
            "#
        ))
        .bind(user_id)
        .bind(filter.complete)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    async fn create_task(&self, user_id: Uuid, new_task: NewTask) -> StoreResult<Task> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (user_id, name, description)
            VALUES ($1, $2, $3)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&new_task.name)
        .bind(&new_task.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    async fn get_task(&self, user_id: Uuid, task_id: i64) -> StoreResult<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND user_id = $2"
        ))
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn update_task(&self, user_id: Uuid, task_id: i64, patch: TaskPatch) -> StoreResult<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                complete = COALESCE($5, complete)
            WHERE id = $1 AND user_id = $2
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task_id)
        .bind(user_id)
        .bind(patch.name)
        .bind(patch.description)
        .bind(patch.complete)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn delete_task(&self, user_id: Uuid, task_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(task_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_completed_tasks(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM tasks WHERE user_id = $1 AND complete")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ScheduleCatalog for PgStore {
    async fn remove_by_name(&self, name: &JobName) -> Result<(), CatalogError> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE name = $1")
            .bind(name.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(name.clone()));
        }
        Ok(())
    }

    async fn create(&self, job: NewScheduledJob) -> Result<JobHandle, CatalogError> {
        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO scheduled_jobs (name, schedule, action, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING created_at
            "#,
        )
        .bind(job.name.as_str())
        .bind(Json(job.schedule))
        .bind(job.action.as_str())
        .bind(&job.payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CatalogError::DuplicateJobName(job.name.clone())
            } else {
                CatalogError::from(e)
            }
        })?;

        Ok(JobHandle {
            name: job.name,
            created_at,
        })
    }

    async fn get(&self, name: &JobName) -> Result<Option<ScheduledJob>, CatalogError> {
        let row = sqlx::query_as::<_, ScheduledJobRow>(
            r#"
            SELECT name, schedule, action, payload, created_at, last_run_at
            FROM scheduled_jobs
            WHERE name = $1
            "#,
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ScheduledJob::from))
    }

    async fn list(&self) -> Result<Vec<ScheduledJob>, CatalogError> {
        let rows = sqlx::query_as::<_, ScheduledJobRow>(
            r#"
            SELECT name, schedule, action, payload, created_at, last_run_at
            FROM scheduled_jobs
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ScheduledJob::from).collect())
    }

    async fn record_run(
        &self,
        name: &JobName,
        previous: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool, CatalogError> {
        let claimed: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE scheduled_jobs SET last_run_at = $3
            WHERE name = $1 AND last_run_at IS NOT DISTINCT FROM $2
            RETURNING name
            "#,
        )
        .bind(name.as_str())
        .bind(previous)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_some() {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM scheduled_jobs WHERE name = $1)")
            .bind(name.as_str())
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(false)
        } else {
            Err(CatalogError::NotFound(name.clone()))
        }
    }
}
