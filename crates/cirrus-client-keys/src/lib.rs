/// Client-side cryptography for the zero-knowledge protocol.
///
/// Everything here runs on the client: the server only ever sees the salts,
/// the authentication hash and wrapped ciphertexts this crate produces.
///
/// Derivation pipeline:
/// - password key   = Argon2id(password, password salt)
/// - auth key       = HKDF-SHA256(password key, auth salt, "authentication")
/// - encryption key = HKDF-SHA256(password key, enc salt, "encryption")
/// - auth hash      = Argon2id(hex(auth key), auth salt)  — the login proof
///
/// File content is AES-256-GCM under a random content key; the content key is
/// wrapped (AES-256-GCM again) under the encryption key, or under a
/// recipient-specific key when a file is transferred.

pub mod derive;
pub mod wrap;

pub use derive::{derive_auth_key, derive_encryption_key, derive_password_key, login_auth_hash};
pub use wrap::{
    decrypt_content, encrypt_content, generate_content_key, unwrap_key, wrap_key,
};
