//! API Routes
//!
//! - `/api/v1/register`, `/login`, `/logout`, ... - Accounts
//! - `/api/v1/profile`, `/api/v1/change-email` - Profile and deletion schedule
//! - `/api/v1/profile/avatar`, `/api/v1/reset-avatar` - Avatar upload
//! - `/media` - Uploaded files
//! - `/api/v1/tasks` - Task CRUD (verified users only)
//! - `/api/health` - Health checks

pub mod accounts;
pub mod health;
pub mod profile;
pub mod tasks;

use crate::middleware::cors_layer;
use crate::models::AppState;
use axum::Router;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let cors = cors_layer(&state.config.server.cors_allowed_origins);
    let media = ServeDir::new(&state.config.media.directory);

    Router::new()
        .merge(accounts::router(state.clone()))
        .merge(profile::router(state.clone()))
        .merge(tasks::router(state.clone()))
        .merge(health::router(state))
        .nest_service("/media", media)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
