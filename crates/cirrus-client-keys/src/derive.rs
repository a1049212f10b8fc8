use anyhow::{Result, anyhow};
use argon2::Argon2;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const KEY_LEN: usize = 32;

/// Argon2id over the password with the account's password salt. Root of the
/// whole derivation tree; never leaves the client.
pub fn derive_password_key(password: &str, password_salt: &str) -> Result<[u8; KEY_LEN]> {
    argon2id(password.as_bytes(), password_salt.as_bytes())
}

/// Key used to prove password knowledge, separated from the encryption key
/// by HKDF info strings.
pub fn derive_auth_key(password_key: &[u8; KEY_LEN], auth_salt: &str) -> [u8; KEY_LEN] {
    hkdf_sha256(password_key, auth_salt.as_bytes(), b"authentication")
}

/// Key-encryption key for wrapping the master key.
pub fn derive_encryption_key(password_key: &[u8; KEY_LEN], enc_salt: &str) -> [u8; KEY_LEN] {
    hkdf_sha256(password_key, enc_salt.as_bytes(), b"encryption")
}

/// The opaque token sent to the server at login. A second Argon2id pass over
/// the hex-encoded auth key, so the server can verify equality without ever
/// holding anything a dictionary attack could start from cheaply.
pub fn login_auth_hash(auth_key: &[u8; KEY_LEN], auth_salt: &str) -> Result<String> {
    let hashed = argon2id(hex::encode(auth_key).as_bytes(), auth_salt.as_bytes())?;
    Ok(hex::encode(hashed))
}

fn argon2id(input: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    let mut out = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(input, salt, &mut out)
        .map_err(|e| anyhow!("Argon2 derivation failed: {}", e))?;
    Ok(out)
}

/// HKDF-SHA256 (RFC 5869) extract-then-expand, fixed to one 32-byte block.
fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8]) -> [u8; KEY_LEN] {
    // Extract
    let mut mac = <HmacSha256 as Mac>::new_from_slice(salt).expect("HMAC accepts any key length");
    mac.update(ikm);
    let prk = mac.finalize().into_bytes();

    // Expand: T(1) = HMAC(PRK, info || 0x01) already covers 32 bytes.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(&prk).expect("HMAC accepts any key length");
    mac.update(info);
    mac.update(&[1u8]);
    let okm = mac.finalize().into_bytes();

    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&okm);
    out
}
