// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{ImageRef, ProfileUpdateForm, Role, User};
use crate::services::{ProfileView, UploadFile};
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Multipart field holding the avatar file.
const IMAGE_FIELD: &str = "file";

/// Headroom for multipart boundaries and part headers on top of the file.
const MULTIPART_OVERHEAD_BYTES: usize = 16 * 1024;

/// API routes (require a session).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes(config: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/profile", get(get_profile).put(update_profile))
        .route(
            "/api/profile/image",
            get(refresh_image)
                .post(upload_image)
                .delete(remove_image)
                .layer(DefaultBodyLimit::max(
                    config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
                )),
        )
}

// ─── Session ─────────────────────────────────────────────────

/// Signed-in user, as shown in the dashboard greeting.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub image: Option<String>,
}

impl From<&User> for SessionResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            role: user.role,
            image: user.image.as_ref().map(|i| i.url.clone()),
        }
    }
}

/// Get the session user.
async fn get_session(Extension(user): Extension<AuthUser>) -> Json<SessionResponse> {
    Json(SessionResponse {
        id: user.user_id,
        name: user.name,
        role: user.role,
        image: user.image,
    })
}

// ─── Profile ─────────────────────────────────────────────────

/// Load the profile form.
async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ProfileView>> {
    Ok(Json(state.profile_service.load(&user.user_id).await?))
}

/// Submit the profile form.
async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(form): Json<ProfileUpdateForm>,
) -> Result<Json<ProfileView>> {
    Ok(Json(state.profile_service.submit(&user.user_id, form).await?))
}

// ─── Profile image ───────────────────────────────────────────

/// Read the `file` part of a multipart upload.
async fn read_image_field(mut multipart: Multipart, limit: usize) -> Result<UploadFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or("upload")
            .to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(AppError::BadRequest(format!(
                "Unsupported content type: {}",
                content_type
            )));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Empty file".into()));
        }
        if bytes.len() > limit {
            return Err(AppError::BadRequest(format!(
                "File exceeds {} bytes",
                limit
            )));
        }

        return Ok(UploadFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    Err(AppError::BadRequest(format!(
        "Missing multipart field '{}'",
        IMAGE_FIELD
    )))
}

/// Upload a new avatar, replacing the current one.
async fn upload_image(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Json<ImageRef>> {
    let file = read_image_field(multipart, state.config.max_upload_bytes).await?;
    tracing::debug!(
        user_id = %user.user_id,
        file_name = %file.file_name,
        size = file.bytes.len(),
        "Avatar upload received"
    );
    let image = state
        .profile_service
        .replace_image(&user.user_id, file)
        .await?;
    Ok(Json(image))
}

/// Fresh signed URL for the current avatar.
async fn refresh_image(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ImageRef>> {
    Ok(Json(
        state.profile_service.refresh_image_url(&user.user_id).await?,
    ))
}

/// Remove the current avatar.
async fn remove_image(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<StatusCode> {
    state.profile_service.remove_image(&user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
