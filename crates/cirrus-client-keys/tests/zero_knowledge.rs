//! Full zero-knowledge round trip: a simulated client derives its keys,
//! registers, logs in, uploads an encrypted file and gets everything back —
//! while the rows the server holds never contain a usable secret.

use std::sync::Arc;

use cirrus_client_keys::{
    decrypt_content, derive_auth_key, derive_encryption_key, derive_password_key, encrypt_content,
    generate_content_key, login_auth_hash, unwrap_key, wrap_key,
};
use cirrus_core::auth::{AuthService, NewCredentials, SignupRequest};
use cirrus_core::blobstore::FsBlobStore;
use cirrus_core::ledger::FileLedger;
use cirrus_core::mailer::LogMailer;
use cirrus_db::Database;

struct Client {
    email: String,
    password: String,
    password_salt: String,
    auth_salt: String,
    enc_salt: String,
    master_key: [u8; 32],
}

impl Client {
    fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            password_salt: hex::encode([0x11u8; 16]),
            auth_salt: hex::encode([0x22u8; 16]),
            enc_salt: hex::encode([0x33u8; 16]),
            master_key: generate_content_key(),
        }
    }

    fn auth_hash(&self, password_salt: &str, auth_salt: &str) -> String {
        let password_key = derive_password_key(&self.password, password_salt).unwrap();
        let auth_key = derive_auth_key(&password_key, auth_salt);
        login_auth_hash(&auth_key, auth_salt).unwrap()
    }

    fn registration(&self, username: &str) -> SignupRequest {
        let password_key = derive_password_key(&self.password, &self.password_salt).unwrap();
        let kek = derive_encryption_key(&password_key, &self.enc_salt);
        let (wrapped_master_key, master_key_iv) = wrap_key(&kek, &self.master_key).unwrap();

        SignupRequest {
            name: "Alice".into(),
            surname: "Keys".into(),
            username: username.into(),
            email: self.email.clone(),
            signup_ip: None,
            credentials: NewCredentials {
                password_salt: self.password_salt.clone(),
                auth_salt: self.auth_salt.clone(),
                enc_salt: self.enc_salt.clone(),
                master_key_salt: hex::encode([0x44u8; 16]),
                auth_hash: self.auth_hash(&self.password_salt, &self.auth_salt),
                wrapped_master_key: hex::encode(wrapped_master_key),
                master_key_iv: hex::encode(master_key_iv),
                public_key: hex::encode([0x55u8; 32]),
                wrapped_private_key: hex::encode([0x66u8; 48]),
                private_key_iv: hex::encode([0x77u8; 12]),
                private_key_salt: hex::encode([0x88u8; 16]),
            },
        }
    }
}

#[tokio::test]
async fn derive_register_login_upload_download() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open_in_memory().unwrap());
    let store = Arc::new(FsBlobStore::new(dir.path().to_path_buf()).await.unwrap());
    let auth = AuthService::new(
        db.clone(),
        Arc::new(LogMailer),
        "http://localhost:8080".into(),
    );
    let ledger = FileLedger::new(db.clone(), store);

    let client = Client::new("alice@example.com", "correct horse battery staple");

    // Register with locally derived material, then verify the email.
    auth.signup(client.registration("alice")).await.unwrap();
    let account = db.get_account_by_email(&client.email).unwrap().unwrap();
    let code = db
        .get_verification(&account.id)
        .unwrap()
        .unwrap()
        .code
        .unwrap();
    auth.verify_email_for(&client.email, &code).unwrap();

    // The server-side rows hold neither the password nor any derived key.
    let stored = db.get_credentials(&account.id).unwrap().unwrap();
    assert!(!stored.auth_hash.contains("correct horse"));
    assert_ne!(stored.wrapped_master_key, hex::encode(client.master_key));

    // Two-phase login, re-deriving everything from the returned salts.
    let init = auth.initialize_login(&client.email, "10.9.0.1").unwrap();
    let auth_hash = client.auth_hash(&init.password_salt, &init.auth_salt);
    let success = auth
        .authenticate(&client.email, &auth_hash, "10.9.0.1", None)
        .unwrap();

    // Unwrap the master key from the login response.
    let password_key = derive_password_key(&client.password, &init.password_salt).unwrap();
    let kek = derive_encryption_key(&password_key, &success.material.enc_salt);
    let master_key = unwrap_key(
        &kek,
        &hex::decode(&success.material.wrapped_master_key).unwrap(),
        &hex::decode(&success.material.master_key_iv).unwrap(),
    )
    .unwrap();
    assert_eq!(master_key, client.master_key);

    // Encrypt a file client-side and upload ciphertext + wrapped key only.
    let content_key = generate_content_key();
    let plaintext = b"meet me at the usual place".to_vec();
    let (ciphertext, iv, tag) = encrypt_content(&content_key, &plaintext).unwrap();
    let (wrapped_content_key, key_iv) = wrap_key(&master_key, &content_key).unwrap();

    let file = ledger
        .create_metadata(&account.id, "note.txt", plaintext.len() as u64, "text/plain")
        .unwrap();
    ledger
        .attach_content(
            &file.id,
            &account.id,
            &ciphertext,
            &hex::encode(&wrapped_content_key),
            &hex::encode(&iv),
            &hex::encode(&tag),
            &hex::encode(&key_iv),
        )
        .await
        .unwrap();

    // Download: key material from the ledger, ciphertext from the store,
    // decryption strictly client-side.
    let details = ledger.details_for_download(&file.id, &account.id).unwrap();
    let fetched = ledger.download(&file.id, &account.id).await.unwrap();
    assert_eq!(fetched.bytes, ciphertext);

    let recovered_key = unwrap_key(
        &master_key,
        &hex::decode(&details.wrapped_key).unwrap(),
        &hex::decode(&details.key_iv).unwrap(),
    )
    .unwrap();
    let recovered = decrypt_content(
        &recovered_key,
        &fetched.bytes,
        &hex::decode(&details.content_iv).unwrap(),
        &hex::decode(&details.content_tag).unwrap(),
    )
    .unwrap();
    assert_eq!(recovered, plaintext);
}

#[tokio::test]
async fn password_change_rewraps_the_master_key() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let auth = AuthService::new(
        db.clone(),
        Arc::new(LogMailer),
        "http://localhost:8080".into(),
    );

    let client = Client::new("alice@example.com", "old password 123");
    auth.signup(client.registration("alice")).await.unwrap();
    let account = db.get_account_by_email(&client.email).unwrap().unwrap();
    let code = db
        .get_verification(&account.id)
        .unwrap()
        .unwrap()
        .code
        .unwrap();
    auth.verify_email_for(&client.email, &code).unwrap();

    let login = auth
        .authenticate(
            &client.email,
            &client.auth_hash(&client.password_salt, &client.auth_salt),
            "10.9.0.2",
            None,
        )
        .unwrap();

    // Client picks a new password and new salts, re-wraps the same master
    // key, and swaps the credential record.
    let new_password = "brand new passphrase";
    let new_password_salt = hex::encode([0xa1u8; 16]);
    let new_auth_salt = hex::encode([0xa2u8; 16]);
    let new_enc_salt = hex::encode([0xa3u8; 16]);

    let new_password_key = derive_password_key(new_password, &new_password_salt).unwrap();
    let new_kek = derive_encryption_key(&new_password_key, &new_enc_salt);
    let (rewrapped, rewrap_iv) = wrap_key(&new_kek, &client.master_key).unwrap();

    auth.update_password(
        cirrus_core::auth::PasswordRotation {
            email: client.email.clone(),
            current_auth_hash: client.auth_hash(&client.password_salt, &client.auth_salt),
            password_salt: new_password_salt.clone(),
            auth_salt: new_auth_salt.clone(),
            enc_salt: new_enc_salt.clone(),
            master_key_salt: hex::encode([0xa4u8; 16]),
            auth_hash: {
                let key = derive_auth_key(&new_password_key, &new_auth_salt);
                login_auth_hash(&key, &new_auth_salt).unwrap()
            },
            wrapped_master_key: hex::encode(&rewrapped),
            master_key_iv: hex::encode(&rewrap_iv),
        },
        &login.session_token,
        "10.9.0.2",
    )
    .unwrap();

    // Log in with the new password and recover the same master key.
    let init = auth.initialize_login(&client.email, "10.9.0.2").unwrap();
    assert_eq!(init.password_salt, new_password_salt);

    let password_key = derive_password_key(new_password, &init.password_salt).unwrap();
    let auth_key = derive_auth_key(&password_key, &init.auth_salt);
    let success = auth
        .authenticate(
            &client.email,
            &login_auth_hash(&auth_key, &init.auth_salt).unwrap(),
            "10.9.0.2",
            None,
        )
        .unwrap();

    let kek = derive_encryption_key(&password_key, &success.material.enc_salt);
    let master_key = unwrap_key(
        &kek,
        &hex::decode(&success.material.wrapped_master_key).unwrap(),
        &hex::decode(&success.material.master_key_iv).unwrap(),
    )
    .unwrap();
    assert_eq!(master_key, client.master_key);
}
