//! HTTP integration tests against the in-memory app.
//!
//! Run with: `cargo test --test api_test`

mod helpers;

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use chrono::{DateTime, Utc};
use helpers::TestApp;
use serde_json::json;

use todo_app::queue::Job;
use todo_app::schedule::{
    CatalogError, IntervalUnit, JobHandle, JobName, MemoryCatalog, NewScheduledJob, ScheduleCatalog,
    ScheduleSpec, ScheduledJob,
};

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["queue"], "channel");
}

#[tokio::test]
async fn test_register_verify_login() {
    let app = TestApp::new();
    let link = app.register("alice").await;

    let (status, _) = app.send(Method::GET, &link, None, None).await;
    assert_eq!(status, StatusCode::OK);

    // Links are single use
    let (status, body) = app.send(Method::GET, &link, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let token = app.login("alice").await;
    let (status, body) = app.send(Method::GET, "/api/v1/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email_verified"], true);
    assert_eq!(body["delete_frequency"], "never");
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_bad_input() {
    let app = TestApp::new();
    app.register("alice").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/register",
            None,
            Some(json!({
                "username": "alice",
                "email": "other@example.com",
                "password": "correct horse battery",
                "confirm_password": "correct horse battery",
                "agreement_accepted": true,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "A user with this username already exists.");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/register",
            None,
            Some(json!({
                "username": "bob",
                "email": "not-an-email",
                "password": "short",
                "confirm_password": "short",
                "agreement_accepted": true,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/register",
            None,
            Some(json!({
                "username": "bob",
                "email": "bob@example.com",
                "password": "correct horse battery",
                "confirm_password": "correct horse battery",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "agreement must be accepted");
}

#[tokio::test]
async fn test_register_requires_matching_confirmation() {
    let app = TestApp::new();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/register",
            None,
            Some(json!({
                "username": "bob",
                "email": "bob@example.com",
                "password": "correct horse battery",
                "confirm_password": "correct horse stapler",
                "agreement_accepted": true,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request: Passwords do not match");
    assert!(app.next_job().await.is_none(), "no verification email for a rejected signup");

    // The username is still free
    app.register("bob").await;
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let app = TestApp::new();
    app.register("alice").await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let app = TestApp::new();
    let token = app.verified_user("alice").await;

    let (status, _) = app.send(Method::POST, "/api/v1/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send(Method::GET, "/api/v1/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_password_reset_sends_new_password() {
    let app = TestApp::new();
    let old_token = app.verified_user("alice").await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/password-reset",
            None,
            Some(json!({ "email": "alice@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let new_password = match app.next_job().await {
        Some(Job::SendNewPassword { email, new_password }) => {
            assert_eq!(email, "alice@example.com");
            new_password
        }
        other => panic!("expected a new password email, got {other:?}"),
    };

    let (status, _) = app.send(Method::GET, "/api/v1/profile", Some(&old_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/login",
            None,
            Some(json!({ "username": "alice", "password": new_password })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/password-reset",
            None,
            Some(json!({ "email": "nobody@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_change_password_requires_matching_confirmation() {
    let app = TestApp::new();
    let token = app.verified_user("alice").await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/change-password",
            Some(&token),
            Some(json!({ "new_password": "another long one", "confirm_password": "different" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/change-password",
            Some(&token),
            Some(json!({ "new_password": "another long one", "confirm_password": "another long one" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_email_requires_reverification() {
    let app = TestApp::new();
    let token = app.verified_user("alice").await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/change-email",
            Some(&token),
            Some(json!({ "email": "alice@new.example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(matches!(
        app.next_job().await,
        Some(Job::SendVerificationEmail { email, .. }) if email == "alice@new.example.com"
    ));

    let (_, body) = app.send(Method::GET, "/api/v1/profile", Some(&token), None).await;
    assert_eq!(body["email"], "alice@new.example.com");
    assert_eq!(body["email_verified"], false);

    let (status, _) = app.send(Method::GET, "/api/v1/tasks", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Tasks
// ============================================================================

#[tokio::test]
async fn test_tasks_require_verified_user() {
    let app = TestApp::new();

    let (status, _) = app.send(Method::GET, "/api/v1/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.register("bob").await;
    let token = app.login("bob").await;
    let (status, body) = app.send(Method::GET, "/api/v1/tasks", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_task_crud_and_filter() {
    let app = TestApp::new();
    let token = app.verified_user("alice").await;

    let (status, first) = app
        .send(
            Method::POST,
            "/api/v1/tasks",
            Some(&token),
            Some(json!({ "name": "Buy milk", "description": "2 liters" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["complete"], false);
    let first_id = first["id"].as_i64().unwrap();

    let (status, _) = app
        .send(Method::POST, "/api/v1/tasks", Some(&token), Some(json!({ "name": "Walk dog" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .send(Method::POST, "/api/v1/tasks", Some(&token), Some(json!({ "name": "" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/v1/tasks/{first_id}");
    let (status, updated) = app
        .send(Method::PATCH, &uri, Some(&token), Some(json!({ "complete": true })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["complete"], true);
    assert_eq!(updated["name"], "Buy milk");

    let (_, done) = app
        .send(Method::GET, "/api/v1/tasks?complete=true", Some(&token), None)
        .await;
    assert_eq!(done.as_array().unwrap().len(), 1);
    let (_, all) = app.send(Method::GET, "/api/v1/tasks", Some(&token), None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (status, _) = app.send(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tasks_of_other_users_are_not_found() {
    let app = TestApp::new();
    let alice = app.verified_user("alice").await;
    let bob = app.verified_user("bob").await;

    let (_, task) = app
        .send(Method::POST, "/api/v1/tasks", Some(&alice), Some(json!({ "name": "Private" })))
        .await;
    let uri = format!("/api/v1/tasks/{}", task["id"]);

    let (status, _) = app.send(Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send(Method::PATCH, &uri, Some(&bob), Some(json!({ "complete": true })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(Method::DELETE, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, bobs) = app.send(Method::GET, "/api/v1/tasks", Some(&bob), None).await;
    assert!(bobs.as_array().unwrap().is_empty());
}

// ============================================================================
// Deletion schedule
// ============================================================================

#[tokio::test]
async fn test_frequency_change_updates_catalog() {
    let app = TestApp::new();
    let token = app.verified_user("alice").await;
    let name = JobName::for_user("alice");

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/v1/profile",
            Some(&token),
            Some(json!({ "delete_frequency": "hour", "bio": "hi" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delete_frequency"], "hour");
    assert_eq!(body["bio"], "hi");

    let job = app.catalog.get(&name).await.unwrap().expect("job registered");
    assert_eq!(
        job.schedule,
        ScheduleSpec::Interval {
            every: NonZeroU32::MIN,
            unit: IntervalUnit::Hours,
        }
    );
    assert_eq!(job.payload["user_id"], body["user_id"]);

    let (status, _) = app
        .send(
            Method::PATCH,
            "/api/v1/profile",
            Some(&token),
            Some(json!({ "delete_frequency": "never" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.catalog.get(&name).await.unwrap().is_none());
    assert!(app.catalog.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_frequency_is_rejected() {
    let app = TestApp::new();
    let token = app.verified_user("alice").await;

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/v1/profile",
            Some(&token),
            Some(json!({ "delete_frequency": "fortnight" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (_, profile) = app.send(Method::GET, "/api/v1/profile", Some(&token), None).await;
    assert_eq!(profile["delete_frequency"], "never");
    assert!(app.catalog.list().await.unwrap().is_empty());
}

/// Catalog whose writes always fail as if the backing store were down
struct UnavailableCatalog;

#[async_trait]
impl ScheduleCatalog for UnavailableCatalog {
    async fn remove_by_name(&self, name: &JobName) -> Result<(), CatalogError> {
        Err(CatalogError::NotFound(name.clone()))
    }

    async fn create(&self, _job: NewScheduledJob) -> Result<JobHandle, CatalogError> {
        Err(CatalogError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _name: &JobName) -> Result<Option<ScheduledJob>, CatalogError> {
        Ok(None)
    }

    async fn list(&self) -> Result<Vec<ScheduledJob>, CatalogError> {
        Ok(Vec::new())
    }

    async fn record_run(
        &self,
        _name: &JobName,
        _previous: Option<DateTime<Utc>>,
        _at: DateTime<Utc>,
    ) -> Result<bool, CatalogError> {
        Ok(true)
    }
}

#[tokio::test]
async fn test_scheduling_failure_rolls_back_frequency() {
    let app = TestApp::with_catalog(Arc::new(UnavailableCatalog));
    let token = app.verified_user("alice").await;

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/v1/profile",
            Some(&token),
            Some(json!({ "delete_frequency": "day" })),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);

    let (_, profile) = app.send(Method::GET, "/api/v1/profile", Some(&token), None).await;
    assert_eq!(profile["delete_frequency"], "never");
}

/// Memory catalog whose `create` can be switched off
#[derive(Default)]
struct FlakyCatalog {
    inner: MemoryCatalog,
    down: AtomicBool,
}

#[async_trait]
impl ScheduleCatalog for FlakyCatalog {
    async fn remove_by_name(&self, name: &JobName) -> Result<(), CatalogError> {
        self.inner.remove_by_name(name).await
    }

    async fn create(&self, job: NewScheduledJob) -> Result<JobHandle, CatalogError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("connection refused".to_string()));
        }
        self.inner.create(job).await
    }

    async fn get(&self, name: &JobName) -> Result<Option<ScheduledJob>, CatalogError> {
        self.inner.get(name).await
    }

    async fn list(&self) -> Result<Vec<ScheduledJob>, CatalogError> {
        self.inner.list().await
    }

    async fn record_run(
        &self,
        name: &JobName,
        previous: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool, CatalogError> {
        self.inner.record_run(name, previous, at).await
    }
}

#[tokio::test]
async fn test_resubmitting_frequency_recreates_lost_job() {
    let catalog = Arc::new(FlakyCatalog::default());
    let app = TestApp::with_catalog(catalog.clone());
    let token = app.verified_user("alice").await;
    let day = json!({ "delete_frequency": "day" });

    let (status, _) = app
        .send(Method::PATCH, "/api/v1/profile", Some(&token), Some(day.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);

    // The daily job is removed before the hourly one fails, and restoring it fails too
    catalog.down.store(true, Ordering::SeqCst);
    let (status, _) = app
        .send(
            Method::PATCH,
            "/api/v1/profile",
            Some(&token),
            Some(json!({ "delete_frequency": "hour" })),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (_, profile) = app.send(Method::GET, "/api/v1/profile", Some(&token), None).await;
    assert_eq!(profile["delete_frequency"], "day");
    assert!(app.catalog.list().await.unwrap().is_empty());

    // Other profile edits leave the schedule alone
    catalog.down.store(false, Ordering::SeqCst);
    let (status, _) = app
        .send(Method::PATCH, "/api/v1/profile", Some(&token), Some(json!({ "bio": "still here" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.catalog.list().await.unwrap().is_empty());

    let (status, body) = app
        .send(Method::PATCH, "/api/v1/profile", Some(&token), Some(day))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delete_frequency"], "day");

    let jobs = app.catalog.list().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].name, JobName::for_user("alice"));
    assert_eq!(
        jobs[0].schedule,
        ScheduleSpec::Interval {
            every: NonZeroU32::MIN,
            unit: IntervalUnit::Days,
        }
    );
    assert_eq!(jobs[0].payload["user_id"], body["user_id"]);
}

// ============================================================================
// Profile details and avatar
// ============================================================================

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R'];

#[tokio::test]
async fn test_update_names() {
    let app = TestApp::new();
    let token = app.verified_user("alice").await;

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/v1/profile",
            Some(&token),
            Some(json!({ "first_name": "Alice", "last_name": "Liddell" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Alice");
    assert_eq!(body["last_name"], "Liddell");

    let (status, _) = app
        .send(
            Method::PATCH,
            "/api/v1/profile",
            Some(&token),
            Some(json!({ "last_name": "x".repeat(31) })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, profile) = app.send(Method::GET, "/api/v1/profile", Some(&token), None).await;
    assert_eq!(profile["first_name"], "Alice");
    assert_eq!(profile["last_name"], "Liddell");
    assert!(app.catalog.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_avatar_upload_and_reset() {
    let app = TestApp::new();
    let token = app.verified_user("alice").await;

    let (status, body) = app
        .upload("/api/v1/profile/avatar", &token, "avatar", "me (1).png", "image/png", PNG)
        .await;
    assert_eq!(status, StatusCode::OK, "upload failed: {body}");

    let url = body["avatar_url"].as_str().unwrap().to_string();
    let prefix = format!("{}/media/", app.config.server.public_url);
    let key = url.strip_prefix(&prefix).unwrap();
    assert!(key.starts_with(&format!("profile_{}/", body["user_id"].as_str().unwrap())));
    assert!(key.ends_with("_me__1_.png"), "unsafe characters replaced: {key}");

    let path = app.media_root.join(key);
    assert_eq!(std::fs::read(&path).unwrap(), PNG);

    let (_, profile) = app.send(Method::GET, "/api/v1/profile", Some(&token), None).await;
    assert_eq!(profile["avatar_url"], url.as_str());

    let (status, body) = app.send(Method::POST, "/api/v1/reset-avatar", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["avatar_url"].is_null());
    assert!(!path.exists());

    // Nothing to reset
    let (status, _) = app.send(Method::POST, "/api/v1/reset-avatar", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_avatar_rejects_non_images() {
    let app = TestApp::new();
    let token = app.verified_user("alice").await;

    let (status, _) = app
        .upload("/api/v1/profile/avatar", &token, "avatar", "notes.txt", "text/plain", b"hello")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .upload(
            "/api/v1/profile/avatar",
            &token,
            "avatar",
            "logo.svg",
            "image/svg+xml",
            b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Claims to be a PNG but is not
    let (status, _) = app
        .upload("/api/v1/profile/avatar", &token, "avatar", "fake.png", "image/png", b"hello there")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .upload("/api/v1/profile/avatar", &token, "picture", "me.png", "image/png", PNG)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "file must be sent as the avatar field");

    let (_, profile) = app.send(Method::GET, "/api/v1/profile", Some(&token), None).await;
    assert!(profile["avatar_url"].is_null());
}
