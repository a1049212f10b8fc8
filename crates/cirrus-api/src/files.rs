use axum::extract::{Extension, Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use cirrus_core::CoreError;
use cirrus_types::api::{
    ApiResponse, FileCreateRequest, FileCreateResponse, FileDetailsResponse, FileEntry,
    FileListResponse, FileTransferRequest, FileTransferResponse,
};

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentAccount;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub page: u32,
}

/// POST /api/v1/files/upload — phase one: metadata only.
pub async fn upload(
    State(state): State<AppState>,
    Extension(account): Extension<CurrentAccount>,
    Json(req): Json<FileCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let file = state.ledger.create_metadata(
        &account.id,
        &req.file_name,
        req.size_bytes,
        &req.content_type,
    )?;

    debug!("Metadata {} created for {}", file.id, account.username);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(FileCreateResponse {
            file_id: file.id,
            file_name: file.file_name,
        })),
    ))
}

/// POST /api/v1/files/upload/content/{file_id} — phase two: the encrypted
/// bytes plus the holder's wrapped key material, as one multipart form.
pub async fn upload_content(
    State(state): State<AppState>,
    Extension(account): Extension<CurrentAccount>,
    Path(file_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let mut content: Option<Bytes> = None;
    let mut wrapped_key: Option<String> = None;
    let mut content_iv: Option<String> = None;
    let mut content_tag: Option<String> = None;
    let mut key_iv: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| CoreError::validation("Malformed upload form"))?
    {
        match field.name() {
            Some("encryptedContent") => {
                content = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|_| CoreError::validation("Malformed upload form"))?,
                );
            }
            Some("encryptedKey") => wrapped_key = Some(field_text(field).await?),
            Some("iv") => content_iv = Some(field_text(field).await?),
            Some("tag") => content_tag = Some(field_text(field).await?),
            Some("keyIv") => key_iv = Some(field_text(field).await?),
            _ => {}
        }
    }

    let content = content.ok_or_else(|| CoreError::validation("encryptedContent is required"))?;
    let wrapped_key = wrapped_key.ok_or_else(|| CoreError::validation("encryptedKey is required"))?;
    let content_iv = content_iv.ok_or_else(|| CoreError::validation("iv is required"))?;
    let content_tag = content_tag.ok_or_else(|| CoreError::validation("tag is required"))?;
    let key_iv = key_iv.ok_or_else(|| CoreError::validation("keyIv is required"))?;

    state
        .ledger
        .attach_content(
            &file_id,
            &account.id,
            &content,
            &wrapped_key,
            &content_iv,
            &content_tag,
            &key_iv,
        )
        .await?;

    Ok(Json(ApiResponse::ok_message("File content uploaded")))
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|_| ApiError(CoreError::validation("Malformed upload form")))
}

/// GET /api/v1/files?page=N
pub async fn list(
    State(state): State<AppState>,
    Extension(account): Extension<CurrentAccount>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<FileListResponse>>, ApiError> {
    let listing = state.ledger.list_for_account(&account.id, params.page)?;
    Ok(Json(ApiResponse::ok(FileListResponse {
        files: listing
            .files
            .into_iter()
            .map(|f| FileEntry {
                id: f.id,
                file_name: f.file_name,
                size_bytes: f.size_bytes as u64,
                content_type: f.content_type,
                created_at: f.created_at,
                owner: f.owner,
            })
            .collect(),
        has_more: listing.has_more,
        page: listing.page,
        total: listing.total as u64,
    })))
}

/// GET /api/v1/files/{file_id} — key material and metadata for a download.
pub async fn details(
    State(state): State<AppState>,
    Extension(account): Extension<CurrentAccount>,
    Path(file_id): Path<String>,
) -> Result<Json<ApiResponse<FileDetailsResponse>>, ApiError> {
    let details = state.ledger.details_for_download(&file_id, &account.id)?;
    Ok(Json(ApiResponse::ok(FileDetailsResponse {
        file_name: details.file_name,
        size_bytes: details.size_bytes as u64,
        content_type: details.content_type,
        wrapped_key: details.wrapped_key,
        content_iv: details.content_iv,
        content_tag: details.content_tag,
        key_iv: details.key_iv,
        sender_public_key: details.sender_public_key,
    })))
}

/// GET /api/v1/files/{file_id}/content — the raw ciphertext.
pub async fn download(
    State(state): State<AppState>,
    Extension(account): Extension<CurrentAccount>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let content = state.ledger.download(&file_id, &account.id).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        content.bytes,
    ))
}

/// DELETE /api/v1/files/{file_id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(account): Extension<CurrentAccount>,
    Path(file_id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.ledger.delete_file(&file_id, &account.id).await?;
    Ok(Json(ApiResponse::ok_message("File deleted")))
}

/// POST /api/v1/files/transfer
pub async fn transfer(
    State(state): State<AppState>,
    Extension(account): Extension<CurrentAccount>,
    Json(req): Json<FileTransferRequest>,
) -> Result<Json<ApiResponse<FileTransferResponse>>, ApiError> {
    let copy_id = state.ledger.transfer(
        &req.file_id,
        &account.id,
        &req.recipient_email,
        &req.wrapped_key,
        &req.key_iv,
    )?;
    Ok(Json(ApiResponse::ok(FileTransferResponse {
        file_id: copy_id,
    })))
}
