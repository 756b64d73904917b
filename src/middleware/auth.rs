// Bearer token authentication extractors

use crate::auth::hash_token;
use crate::models::{AppState, Profile, User};
use crate::types::AppError;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

/// The user behind the request's `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    /// Hash of the presented token, so logout can revoke exactly this one
    pub token_hash: String,
}

/// An authenticated user whose email address has been verified.
#[derive(Debug, Clone)]
pub struct VerifiedUser {
    pub user: User,
    pub profile: Profile,
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Auth("Missing Authorization header".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Auth("Invalid Authorization header".to_string()))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token_hash = hash_token(bearer_token(parts)?);

        let user = state
            .users
            .find_user_by_token(&token_hash)
            .await?
            .ok_or_else(|| AppError::Auth("Invalid or expired token".to_string()))?;

        Ok(AuthUser { user, token_hash })
    }
}

impl FromRequestParts<AppState> for VerifiedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser { user, .. } = AuthUser::from_request_parts(parts, state).await?;

        let profile = state
            .users
            .get_profile(user.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

        if !profile.email_verified {
            return Err(AppError::Forbidden("Email address is not verified".to_string()));
        }

        Ok(VerifiedUser { user, profile })
    }
}
