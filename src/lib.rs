// toDo app - multi-tenant task service with per-user scheduled purging of completed tasks

pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod middleware;
pub mod models;
pub mod queue;
pub mod routes;
pub mod schedule;
pub mod storage;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
