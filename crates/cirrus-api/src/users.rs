use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{Cookie, CookieJar};

use cirrus_types::api::{ApiResponse, ProfileResponse, PublicKeyResponse};

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::{CurrentAccount, SESSION_COOKIE};

/// GET /api/v1/users/profile
pub async fn profile(
    State(state): State<AppState>,
    Extension(account): Extension<CurrentAccount>,
) -> Result<Json<ApiResponse<ProfileResponse>>, ApiError> {
    let row = state.auth.profile(&account.id)?;
    Ok(Json(ApiResponse::ok(ProfileResponse {
        username: row.username,
        name: row.name,
        surname: row.surname,
        email: row.email,
        registered_at: row.registered_at,
        used_space_bytes: row.used_space_bytes.max(0) as u64,
        limit_space_bytes: row.limit_space_bytes.max(0) as u64,
    })))
}

/// GET /api/v1/users/public-key/email/{email} — recipient key lookup before
/// a transfer.
pub async fn public_key_by_email(
    State(state): State<AppState>,
    Extension(_account): Extension<CurrentAccount>,
    Path(email): Path<String>,
) -> Result<Json<ApiResponse<PublicKeyResponse>>, ApiError> {
    let public_key = state.auth.public_key_by_email(&email)?;
    Ok(Json(ApiResponse::ok(PublicKeyResponse { public_key })))
}

/// GET /api/v1/users/public-key/name/{name} — "You" resolves to the caller.
pub async fn public_key_by_name(
    State(state): State<AppState>,
    Extension(account): Extension<CurrentAccount>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<PublicKeyResponse>>, ApiError> {
    let public_key = if name == "You" {
        state.auth.public_key_for_account(&account.id)?
    } else {
        state.auth.public_key_by_name(&name)?
    };
    Ok(Json(ApiResponse::ok(PublicKeyResponse { public_key })))
}

/// POST /api/v1/users/delete-files
pub async fn delete_files(
    State(state): State<AppState>,
    Extension(account): Extension<CurrentAccount>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.ledger.delete_all_for_account(&account.id).await?;
    Ok(Json(ApiResponse::ok_message("All files deleted")))
}

/// POST /api/v1/users/delete-account — files first (reference-counted
/// ciphertext cleanup), then the auth-side rows.
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(account): Extension<CurrentAccount>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    state.ledger.delete_all_for_account(&account.id).await?;
    state.auth.delete_account(&account.id)?;

    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    Ok((jar, Json(ApiResponse::<()>::ok_message("Account deleted"))))
}
