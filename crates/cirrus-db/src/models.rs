/// Database row types — these map directly to SQLite rows.
/// Distinct from the cirrus-types API DTOs to keep the DB layer independent.

pub struct AccountRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub registered_at: String,
    pub last_login_at: Option<String>,
    pub signup_ip: Option<String>,
    pub last_login_ip: Option<String>,
    pub verified: bool,
    pub used_space_bytes: i64,
    pub limit_space_bytes: i64,
}

/// Opaque client-derived material. The server compares `auth_hash` for
/// equality and stores everything else verbatim.
pub struct CredentialRow {
    pub account_id: String,
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

pub struct VerificationRow {
    pub account_id: String,
    pub code: Option<String>,
    pub expires_at: Option<String>,
    pub verified: bool,
}

pub struct AttemptRow {
    pub id: i64,
    pub ip: String,
    pub email: Option<String>,
    pub attempted_at: String,
    pub blocked: bool,
    pub block_expires_at: Option<String>,
}

pub struct SessionRow {
    pub id: String,
    pub account_id: String,
    pub token: String,
    pub created_at: String,
    pub expires_at: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug)]
pub struct FileRow {
    pub id: String,
    pub holder_id: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub created_at: String,
    pub storage_key: String,
}

pub struct HolderKeyRow {
    pub file_id: String,
    pub holder_id: String,
    pub wrapped_key: String,
    pub content_iv: String,
    pub content_tag: String,
    pub key_iv: String,
    pub created_at: String,
}

pub struct OwnerRow {
    pub file_id: String,
    pub owner_id: String,
}

/// Sentinel storage key for metadata rows whose content has not been
/// uploaded yet.
pub const STORAGE_KEY_NONE: &str = "none";
