//! Avatar and file uploads
//!
//! Both routes take a single multipart field. Type is checked from the part
//! headers and size while streaming, so a rejected upload writes nothing and
//! never reaches the registry or the log.

use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::{Error, Result, ValidationError};
use crate::core::models::FileShared;
use crate::core::uploads::{avatar_url, check_size, upload_url};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub success: bool,
    pub avatar_url: String,
}

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub success: bool,
    pub file: FileShared,
}

struct UploadedPart {
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

fn multipart_error(err: MultipartError) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ValidationError::BodyTooLarge.into()
    } else {
        ValidationError::Malformed(err.body_text()).into()
    }
}

/// Read the part named `field`, enforcing type up front and `max` while streaming.
async fn read_part<F>(
    multipart: &mut Multipart,
    field: &'static str,
    max: usize,
    check_type: F,
) -> Result<UploadedPart>
where
    F: Fn(Option<&str>) -> std::result::Result<(), ValidationError>,
{
    while let Some(mut part) = multipart.next_field().await.map_err(multipart_error)? {
        if part.name() != Some(field) {
            continue;
        }

        let file_name = part.file_name().map(str::to_string);
        let content_type = part.content_type().map(str::to_string);
        check_type(content_type.as_deref())?;

        let mut data = Vec::new();
        while let Some(chunk) = part.chunk().await.map_err(multipart_error)? {
            check_size(data.len() + chunk.len(), max)?;
            data.extend_from_slice(&chunk);
        }

        return Ok(UploadedPart {
            file_name,
            content_type,
            data,
        });
    }

    Err(ValidationError::MissingField(field).into())
}

/// POST /upload_avatar
pub async fn upload_avatar(
    State(state): State<AppState>,
    ctx: Ctx,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>> {
    let identity = ctx.identity();
    info!("POST /upload_avatar - {}", identity);

    let uploads = &state.uploads;
    let part = read_part(&mut multipart, "avatar", uploads.max_avatar_bytes(), |mime| {
        uploads.check_avatar_type(mime)
    })
    .await?;

    // Unknown users get nothing written.
    state.auth.user_avatar(identity).await?;

    let file_name = uploads
        .store_avatar(identity, &part.data, part.content_type.as_deref())
        .await?;
    state.auth.set_avatar(identity, &file_name).await?;

    let url = avatar_url(&file_name);
    state.gateway.announce_avatar(identity, &url);

    Ok(Json(AvatarResponse {
        success: true,
        avatar_url: url,
    }))
}

/// POST /upload_file
pub async fn upload_file(
    State(state): State<AppState>,
    ctx: Ctx,
    mut multipart: Multipart,
) -> Result<Json<FileResponse>> {
    let identity = ctx.identity();
    info!("POST /upload_file - {}", identity);

    let uploads = &state.uploads;
    let part = read_part(&mut multipart, "file", uploads.max_file_bytes(), |mime| {
        uploads.check_file_type(mime)
    })
    .await?;

    let original_name = part
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("upload")
        .to_string();

    let stored = uploads
        .store_file(&original_name, &part.data, part.content_type.as_deref())
        .await?;

    let file = FileShared {
        original_name,
        file_url: upload_url(&stored),
        filename: stored,
        uploader: identity.to_string(),
        timestamp: Utc::now(),
    };

    if let Err(e) = state.gateway.share_file(file.clone()).await {
        warn!("Discarding {} after failed log append", file.filename);
        uploads.discard_file(&file.filename).await;
        return Err(e);
    }

    Ok(Json(FileResponse {
        success: true,
        file,
    }))
}
