// Request extractors and layers shared by the routes

pub mod auth;
pub mod cors;

pub use auth::{AuthUser, VerifiedUser};
pub use cors::cors_layer;
