use serde::{Deserialize, Serialize};

// -- Response envelope --

/// Uniform JSON envelope for every endpoint. `data` is present on success,
/// `message` carries the user-visible text on failure.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn ok_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

// -- Auth --

/// Everything the client derives locally at signup. The server stores the
/// salts and wrapped keys verbatim and never derives anything from them.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub surname: String,
    pub username: String,
    pub email: String,
    pub password_salt: String,
    pub auth_salt: String,
    pub enc_salt: String,
    pub master_key_salt: String,
    pub auth_hash: String,
    pub wrapped_master_key: String,
    pub master_key_iv: String,
    pub public_key: String,
    pub wrapped_private_key: String,
    pub private_key_iv: String,
    pub private_key_salt: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginInitRequest {
    pub email: String,
}

/// Salts for the client-side derivation step. Identical in shape whether or
/// not the account exists.
#[derive(Debug, Serialize)]
pub struct LoginInitResponse {
    pub password_salt: String,
    pub auth_salt: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub auth_hash: String,
}

/// Wrapped key material returned on successful login. The session token
/// itself travels only in the HTTP-only cookie.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub wrapped_master_key: String,
    pub master_key_iv: String,
    pub master_key_salt: String,
    pub enc_salt: String,
    pub wrapped_private_key: String,
    pub private_key_iv: String,
    pub private_key_salt: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPasswordResponse {
    pub wrapped_master_key: String,
    pub master_key_iv: String,
    pub master_key_salt: String,
    pub enc_salt: String,
}

#[derive(Debug, Serialize)]
pub struct SessionCheckResponse {
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PasswordUpdateRequest {
    pub email: String,
    pub current_auth_hash: String,
    pub password_salt: String,
    pub auth_salt: String,
    pub enc_salt: String,
    pub master_key_salt: String,
    pub auth_hash: String,
    pub wrapped_master_key: String,
    pub master_key_iv: String,
}

// -- Files --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileCreateRequest {
    pub file_name: String,
    pub size_bytes: u64,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct FileCreateResponse {
    pub file_id: String,
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub id: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub created_at: String,
    /// "You" when the caller is the lineage owner, else the owner's name.
    pub owner: String,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileEntry>,
    pub has_more: bool,
    pub page: u32,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct FileDetailsResponse {
    pub file_name: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub wrapped_key: String,
    pub content_iv: String,
    pub content_tag: String,
    pub key_iv: String,
    /// Present only for shared copies: the lineage owner's public key, so the
    /// client can authenticate the sender's wrap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileTransferRequest {
    pub file_id: String,
    pub recipient_email: String,
    pub wrapped_key: String,
    pub key_iv: String,
}

#[derive(Debug, Serialize)]
pub struct FileTransferResponse {
    pub file_id: String,
}

// -- Users --

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub registered_at: String,
    pub used_space_bytes: u64,
    pub limit_space_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
}
