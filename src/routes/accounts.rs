// Registration, email verification, login and password endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{generate_password, generate_token, hash_password, hash_token, verify_password};
use crate::middleware::AuthUser;
use crate::models::{
    AppState, ChangePasswordRequest, LoginRequest, LoginResponse, NewUser, PasswordResetRequest,
    RegisterRequest, RegisterResponse, SuccessResponse, User,
};
use crate::queue::Job;
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/register", post(register))
        .route("/api/v1/verify-email/{token}", get(verify_email))
        .route("/api/v1/resend-verification", post(resend_verification))
        .route("/api/v1/login", post(login))
        .route("/api/v1/logout", post(logout))
        .route("/api/v1/password-reset", post(password_reset))
        .route("/api/v1/change-password", post(change_password))
        .with_state(state)
}

/// Create a fresh verification token for the user and queue the email carrying it
pub(crate) async fn send_verification(state: &AppState, user: &User) -> AppResult<()> {
    let token = state.users.create_email_verification(user.id).await?;
    let verification_link = format!("{}/api/v1/verify-email/{}", state.config.server.public_url, token);

    state
        .queue
        .enqueue(Job::SendVerificationEmail {
            email: user.email.clone(),
            verification_link,
        })
        .await?;
    Ok(())
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    request.validate()?;
    if !request.agreement_accepted {
        return Err(AppError::InvalidRequest(
            "The user agreement must be accepted".to_string(),
        ));
    }
    if request.password != request.confirm_password {
        return Err(AppError::InvalidRequest("Passwords do not match".to_string()));
    }

    let password_hash = hash_password(&request.password)?;
    let user = state
        .users
        .create_user(NewUser {
            username: request.username,
            email: request.email,
            first_name: request.first_name,
            last_name: request.last_name,
            password_hash,
            agreement_accepted: request.agreement_accepted,
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, "User registered");
    send_verification(&state, &user).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            user_id: user.id,
        }),
    ))
}

async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
) -> AppResult<Json<SuccessResponse>> {
    let user_id = state
        .users
        .consume_email_verification(token)
        .await?
        .ok_or_else(|| AppError::NotFound("Verification link is invalid or already used".to_string()))?;

    info!(%user_id, "Email address verified");
    Ok(Json(SuccessResponse::ok()))
}

async fn resend_verification(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<SuccessResponse>> {
    let profile = state
        .users
        .get_profile(auth.user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    if profile.email_verified {
        return Err(AppError::InvalidRequest("Email address is already verified".to_string()));
    }

    send_verification(&state, &auth.user).await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let invalid = || AppError::Auth("Invalid username or password".to_string());

    let user = state
        .users
        .find_user_by_username(&request.username)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&request.password, &user.password_hash)? {
        return Err(invalid());
    }

    let token = generate_token();
    state.users.create_auth_token(user.id, &hash_token(&token)).await?;

    info!(user_id = %user.id, "User logged in");
    Ok(Json(LoginResponse { token, user_id: user.id }))
}

async fn logout(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<SuccessResponse>> {
    state.users.revoke_auth_token(&auth.token_hash).await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> AppResult<Json<SuccessResponse>> {
    request.validate()?;

    let user = state
        .users
        .find_user_by_email(&request.email)
        .await?
        .ok_or_else(|| AppError::NotFound("No user with this email address".to_string()))?;

    let new_password = generate_password();
    state
        .users
        .set_password_hash(user.id, &hash_password(&new_password)?)
        .await?;
    state.users.revoke_user_tokens(user.id).await?;

    state
        .queue
        .enqueue(Job::SendNewPassword {
            email: user.email.clone(),
            new_password,
        })
        .await?;

    info!(user_id = %user.id, "Password reset");
    Ok(Json(SuccessResponse::ok()))
}

async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<ChangePasswordRequest>,
) -> AppResult<Json<SuccessResponse>> {
    request.validate()?;
    if request.new_password != request.confirm_password {
        return Err(AppError::InvalidRequest("Passwords do not match".to_string()));
    }

    state
        .users
        .set_password_hash(auth.user.id, &hash_password(&request.new_password)?)
        .await?;

    info!(user_id = %auth.user.id, "Password changed");
    Ok(Json(SuccessResponse::ok()))
}
