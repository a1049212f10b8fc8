use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use anyhow::{Result, anyhow};

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Random 256-bit content key, one per file.
pub fn generate_content_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt file content with AES-256-GCM.
/// Returns (ciphertext, iv, tag) with the tag split off the sealed output,
/// matching what the server stores as three separate fields.
pub fn encrypt_content(key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let iv = generate_iv();

    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let tag = sealed.split_off(sealed.len() - TAG_LEN);
    Ok((sealed, iv.to_vec(), tag))
}

/// Decrypt file content from the (ciphertext, iv, tag) triple.
pub fn decrypt_content(key: &[u8; 32], ciphertext: &[u8], iv: &[u8], tag: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut sealed = Vec::with_capacity(ciphertext.len() + tag.len());
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    cipher
        .decrypt(Nonce::from_slice(iv), sealed.as_slice())
        .map_err(|e| anyhow!("Decryption failed: {}", e))
}

/// Wrap a content key under a key-encryption key. Returns (wrapped, key iv);
/// the GCM tag stays inside the wrapped blob here.
pub fn wrap_key(kek: &[u8; 32], content_key: &[u8; 32]) -> Result<(Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(kek));
    let iv = generate_iv();

    let wrapped = cipher
        .encrypt(Nonce::from_slice(&iv), content_key.as_slice())
        .map_err(|e| anyhow!("Key wrap failed: {}", e))?;

    Ok((wrapped, iv.to_vec()))
}

/// Unwrap a content key. Fails on a wrong key or tampered blob.
pub fn unwrap_key(kek: &[u8; 32], wrapped: &[u8], key_iv: &[u8]) -> Result<[u8; 32]> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(kek));

    let bytes = cipher
        .decrypt(Nonce::from_slice(key_iv), wrapped)
        .map_err(|e| anyhow!("Key unwrap failed: {}", e))?;

    bytes
        .try_into()
        .map_err(|_| anyhow!("Unwrapped key has the wrong length"))
}
