// Profile endpoints, including the task deletion schedule and avatar

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tracing::{info, warn};
use validator::Validate;

use crate::middleware::AuthUser;
use crate::models::{AppState, ChangeEmailRequest, Profile, ProfileResponse, SuccessResponse, UpdateProfileRequest};
use crate::routes::accounts::send_verification;
use crate::schedule::DeletionFrequency;
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    // Room for the multipart framing around the file itself
    let upload_limit = state.config.media.max_avatar_bytes + 64 * 1024;

    Router::new()
        .route("/api/v1/profile", get(get_profile).patch(update_profile))
        .route(
            "/api/v1/profile/avatar",
            post(upload_avatar).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/v1/reset-avatar", post(reset_avatar))
        .route("/api/v1/change-email", post(change_email))
        .with_state(state)
}

async fn load_profile(state: &AppState, user_id: uuid::Uuid) -> AppResult<Profile> {
    state
        .users
        .get_profile(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))
}

async fn get_profile(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<ProfileResponse>> {
    let profile = load_profile(&state, auth.user.id).await?;
    Ok(Json(ProfileResponse::new(&auth.user, &profile, &state.config.server.public_url)))
}

async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> AppResult<Json<ProfileResponse>> {
    request.validate()?;
    let frequency = request
        .delete_frequency
        .as_deref()
        .map(str::parse::<DeletionFrequency>)
        .transpose()?;

    let mut user = auth.user;
    let mut profile = load_profile(&state, user.id).await?;
    let previous = profile.delete_frequency;

    if let Some(bio) = request.bio {
        profile.bio = bio;
    }
    if let Some(cookies_accepted) = request.cookies_accepted {
        profile.cookies_accepted = cookies_accepted;
    }
    if let Some(frequency) = frequency {
        profile.delete_frequency = frequency;
    }
    state.users.save_profile(&profile).await?;

    // Only a submitted frequency touches the schedule; resubmitting the same value repairs it
    if let Some(frequency) = frequency {
        if let Err(e) = state
            .scheduler
            .on_frequency_changed(user.id, &user.username, previous, frequency)
            .await
        {
            warn!(
                user_id = %user.id,
                "Failed to schedule task deletion, restoring frequency {}: {}",
                previous, e
            );
            profile.delete_frequency = previous;
            state.users.save_profile(&profile).await?;
            // The old job may already be gone
            if let Err(restore) = state.scheduler.apply(user.id, &user.username, previous).await {
                warn!(user_id = %user.id, "Failed to restore previous deletion job: {}", restore);
            }
            return Err(e.into());
        }
    }

    if request.first_name.is_some() || request.last_name.is_some() {
        if let Some(first_name) = request.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = request.last_name {
            user.last_name = last_name;
        }
        state
            .users
            .update_names(user.id, &user.first_name, &user.last_name)
            .await?;
    }

    info!(user_id = %user.id, "Profile updated");
    Ok(Json(ProfileResponse::new(&user, &profile, &state.config.server.public_url)))
}

/// Only raster formats a browser renders without scripting
fn check_avatar(data: &[u8], content_type: &str, max_bytes: usize) -> AppResult<()> {
    if data.is_empty() {
        return Err(AppError::InvalidRequest("Avatar file is empty".to_string()));
    }
    if data.len() > max_bytes {
        return Err(AppError::InvalidRequest(format!(
            "Avatar file too large, the limit is {max_bytes} bytes"
        )));
    }
    if !content_type.starts_with("image/") {
        return Err(AppError::InvalidRequest("File must be an image".to_string()));
    }
    if content_type.contains("svg") {
        return Err(AppError::InvalidRequest("SVG files are not allowed for avatars".to_string()));
    }

    let format = image::guess_format(data)
        .map_err(|_| AppError::InvalidRequest("Unable to detect image format".to_string()))?;
    match format {
        image::ImageFormat::Png | image::ImageFormat::Jpeg | image::ImageFormat::Gif | image::ImageFormat::WebP => {
            Ok(())
        }
        other => Err(AppError::InvalidRequest(format!(
            "Unsupported image format {other:?}, only PNG, JPEG, GIF and WebP are allowed"
        ))),
    }
}

async fn upload_avatar(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> AppResult<Json<ProfileResponse>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("Invalid upload: {e}")))?
    {
        if field.name() == Some("avatar") {
            let filename = field.file_name().map(ToString::to_string);
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::InvalidRequest(format!("Invalid upload: {e}")))?;
            upload = Some((filename, content_type, data));
            break;
        }
    }

    let (filename, content_type, data) =
        upload.ok_or_else(|| AppError::InvalidRequest("No avatar file provided".to_string()))?;
    check_avatar(&data, &content_type, state.config.media.max_avatar_bytes)?;

    let safe_name = filename
        .unwrap_or_else(|| "avatar".to_string())
        .replace(|c: char| !c.is_alphanumeric() && c != '.', "_");
    let key = format!("profile_{}/{}_{}", auth.user.id, Utc::now().timestamp(), safe_name);
    state.media.put(&key, &data).await?;

    let mut profile = load_profile(&state, auth.user.id).await?;
    let replaced = profile.avatar.replace(key);
    state.users.save_profile(&profile).await?;

    if let Some(old) = replaced.filter(|old| Some(old) != profile.avatar.as_ref()) {
        if let Err(e) = state.media.delete(&old).await {
            warn!(user_id = %auth.user.id, "Failed to delete replaced avatar {}: {:#}", old, e);
        }
    }

    info!(user_id = %auth.user.id, bytes = data.len(), "Avatar uploaded");
    Ok(Json(ProfileResponse::new(&auth.user, &profile, &state.config.server.public_url)))
}

async fn reset_avatar(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<ProfileResponse>> {
    let mut profile = load_profile(&state, auth.user.id).await?;

    if let Some(old) = profile.avatar.take() {
        state.users.save_profile(&profile).await?;
        if let Err(e) = state.media.delete(&old).await {
            warn!(user_id = %auth.user.id, "Failed to delete avatar {}: {:#}", old, e);
        }
        info!(user_id = %auth.user.id, "Avatar reset");
    }

    Ok(Json(ProfileResponse::new(&auth.user, &profile, &state.config.server.public_url)))
}

async fn change_email(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<ChangeEmailRequest>,
) -> AppResult<Json<SuccessResponse>> {
    request.validate()?;

    state.users.change_email(auth.user.id, &request.email).await?;

    let mut user = auth.user;
    user.email = request.email;
    send_verification(&state, &user).await?;

    info!(user_id = %user.id, "Email address changed, verification sent");
    Ok(Json(SuccessResponse::ok()))
}
