//! Shared setup for HTTP tests: an in-memory app driven through `oneshot`.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;

use todo_app::db::MemoryStore;
use todo_app::queue::{ChannelQueue, Job};
use todo_app::schedule::{MemoryCatalog, PerUserScheduler, ScheduleCatalog};
use todo_app::storage::LocalStorage;
use todo_app::{create_router, AppState, Config};

pub struct TestApp {
    pub router: Router,
    pub config: Config,
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<dyn ScheduleCatalog>,
    pub media_root: PathBuf,
    jobs: Mutex<mpsc::UnboundedReceiver<Job>>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_catalog(Arc::new(MemoryCatalog::new()))
    }

    pub fn with_catalog(catalog: Arc<dyn ScheduleCatalog>) -> Self {
        let mut config = Config::default();
        let media_root = std::env::temp_dir().join(format!("todo-app-test-media-{}", uuid::Uuid::new_v4()));
        config.media.directory = media_root.clone();
        let store = Arc::new(MemoryStore::new());
        let (queue, receiver) = ChannelQueue::new();

        let state = AppState {
            config: config.clone(),
            users: store.clone(),
            tasks: store.clone(),
            scheduler: PerUserScheduler::new(catalog.clone()),
            queue: Arc::new(queue),
            media: Arc::new(LocalStorage::new(media_root.clone())),
        };

        Self {
            router: create_router(state),
            config,
            store,
            catalog,
            media_root,
            jobs: Mutex::new(receiver),
        }
    }

    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_string(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, body_to_json(response).await)
    }

    /// POST a single-file multipart form
    pub async fn upload(
        &self,
        uri: &str,
        token: &str,
        field: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> (StatusCode, Value) {
        let boundary = "----todo-app-test-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        (status, body_to_json(response).await)
    }

    /// Next job the handlers queued, if any
    pub async fn next_job(&self) -> Option<Job> {
        self.jobs.lock().await.try_recv().ok()
    }

    /// Register a user and return the path of the verification link sent to them
    pub async fn register(&self, username: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/v1/register",
                None,
                Some(serde_json::json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "correct horse battery",
                    "confirm_password": "correct horse battery",
                    "agreement_accepted": true,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

        match self.next_job().await {
            Some(Job::SendVerificationEmail { verification_link, .. }) => verification_link
                .strip_prefix(&self.config.server.public_url)
                .unwrap()
                .to_string(),
            other => panic!("expected a verification email, got {other:?}"),
        }
    }

    pub async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/v1/login",
                None,
                Some(serde_json::json!({
                    "username": username,
                    "password": "correct horse battery",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    /// Registered, verified and logged in; returns the bearer token
    pub async fn verified_user(&self, username: &str) -> String {
        let link = self.register(username).await;
        let (status, _) = self.send(Method::GET, &link, None, None).await;
        assert_eq!(status, StatusCode::OK);
        self.login(username).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.media_root);
    }
}

pub async fn body_to_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
