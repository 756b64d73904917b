use crate::config::Config;
use crate::db::{TaskStore, UserStore};
use crate::queue::JobQueue;
use crate::schedule::{DeletionFrequency, PerUserScheduler};
use crate::storage::MediaStorage;
use std::sync::Arc;
use validator::{Validate, ValidationError};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub scheduler: PerUserScheduler,
    pub queue: Arc<dyn JobQueue>,
    pub media: Arc<dyn MediaStorage>,
}

// Core models
// Note: FromRow is needed for runtime query_as (without DATABASE_URL at compile time)

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct User {
    pub id: uuid::Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Per-user settings, created alongside the user
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Profile {
    pub user_id: uuid::Uuid,
    pub bio: String,
    pub agreement_accepted: bool,
    pub email_verified: bool,
    pub cookies_accepted: bool,
    pub delete_frequency: DeletionFrequency,
    /// Media key of the uploaded avatar
    pub avatar: Option<String>,
}

impl Profile {
    pub fn new(user_id: uuid::Uuid, agreement_accepted: bool) -> Self {
        Self {
            user_id,
            bio: String::new(),
            agreement_accepted,
            email_verified: false,
            cookies_accepted: false,
            delete_frequency: DeletionFrequency::Never,
            avatar: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: i64,
    pub user_id: uuid::Uuid,
    pub name: String,
    pub description: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub agreement_accepted: bool,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub description: String,
}

/// Query filter for task listings
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct TaskFilter {
    pub complete: Option<bool>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.complete.map_or(true, |complete| task.complete == complete)
    }
}

/// Partial update of a task; absent fields are left alone
#[derive(Debug, Clone, Default, serde::Deserialize, Validate)]
pub struct TaskPatch {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub complete: Option<bool>,
}

// API Request/Response types

fn validate_username(username: &str) -> Result<(), ValidationError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_');
    if username.chars().all(allowed) {
        Ok(())
    } else {
        Err(ValidationError::new("username_chars")
            .with_message("Username may only contain letters, digits and @/./+/-/_".into()))
    }
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        length(min = 1, max = 150, message = "Username must be between 1 and 150 characters"),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub last_name: String,
    #[serde(default)]
    pub agreement_accepted: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub user_id: uuid::Uuid,
}

#[derive(Debug, serde::Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, serde::Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: uuid::Uuid,
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct ChangeEmailRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 30, message = "First name must be at most 30 characters"))]
    pub first_name: Option<String>,
    #[validate(length(max = 30, message = "Last name must be at most 30 characters"))]
    pub last_name: Option<String>,
    #[validate(length(max = 500, message = "Bio must be at most 500 characters"))]
    pub bio: Option<String>,
    pub cookies_accepted: Option<bool>,
    /// Parsed by hand so an unknown value is reported as an invalid frequency
    pub delete_frequency: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct ProfileResponse {
    pub user_id: uuid::Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub agreement_accepted: bool,
    pub email_verified: bool,
    pub cookies_accepted: bool,
    pub delete_frequency: DeletionFrequency,
    pub avatar_url: Option<String>,
}

impl ProfileResponse {
    /// `public_url` prefixes the avatar's `/media` path
    pub fn new(user: &User, profile: &Profile, public_url: &str) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            bio: profile.bio.clone(),
            agreement_accepted: profile.agreement_accepted,
            email_verified: profile.email_verified,
            cookies_accepted: profile.cookies_accepted,
            delete_frequency: profile.delete_frequency,
            avatar_url: profile
                .avatar
                .as_ref()
                .map(|key| format!("{public_url}/media/{key}")),
        }
    }
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required (at most 100 characters)"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, serde::Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: String,
    pub queue: String,
}
