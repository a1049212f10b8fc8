use std::sync::Arc;

use chrono::{Duration, Utc};
use cirrus_db::models::{AccountRow, CredentialRow};
use cirrus_db::queries::CredentialRotation;
use cirrus_db::{Database, timestamp};
use rand::RngCore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::mailer::Mailer;
use crate::session::{SessionManager, secure_token};
use crate::throttle::AttemptLedger;

pub const VERIFICATION_TTL_SECS: i64 = 86_400;
pub const DEFAULT_SPACE_LIMIT_BYTES: i64 = 100 * 1024 * 1024;

/// Width of the anti-enumeration salts. Matches the hex salts real clients
/// generate, so a fabricated response is indistinguishable from a real one.
const SALT_HEX_LEN: usize = 32;

/// Client-derived material supplied at signup. Stored verbatim; the server
/// never derives or inspects any of it beyond equality on `auth_hash`.
pub struct NewCredentials {
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

pub struct SignupRequest {
    pub name: String,
    pub surname: String,
    pub username: String,
    pub email: String,
    pub signup_ip: Option<String>,
    pub credentials: NewCredentials,
}

/// Salts handed out by login initialization — real or fabricated, the caller
/// cannot tell which.
#[derive(Debug)]
pub struct LoginInit {
    pub password_salt: String,
    pub auth_salt: String,
}

/// Wrapped key material returned once the authentication hash checks out.
#[derive(Debug)]
pub struct KeyMaterial {
    pub wrapped_master_key: String,
    pub master_key_iv: String,
    pub master_key_salt: String,
    pub enc_salt: String,
    pub wrapped_private_key: String,
    pub private_key_iv: String,
    pub private_key_salt: String,
}

/// Master-key subset used by the password-change pre-flight.
pub struct MasterKeyMaterial {
    pub wrapped_master_key: String,
    pub master_key_iv: String,
    pub master_key_salt: String,
    pub enc_salt: String,
}

#[derive(Debug)]
pub struct AuthSuccess {
    pub session_token: String,
    pub material: KeyMaterial,
}

/// Rotated fields for a password change. The key pair survives rotation; the
/// master key arrives re-wrapped under the new password-derived key.
pub struct PasswordRotation {
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

/// Orchestrates signup, email verification, the two-phase login, password
/// rotation and logout over the attempt ledger and session manager.
pub struct AuthService {
    db: Arc<Database>,
    throttle: AttemptLedger,
    sessions: SessionManager,
    mailer: Arc<dyn Mailer>,
    verify_base_url: String,
}

impl AuthService {
    pub fn new(db: Arc<Database>, mailer: Arc<dyn Mailer>, verify_base_url: String) -> Self {
        Self {
            throttle: AttemptLedger::new(db.clone()),
            sessions: SessionManager::new(db.clone()),
            db,
            mailer,
            verify_base_url,
        }
    }

    // -- Signup & verification --

    pub async fn signup(&self, req: SignupRequest) -> Result<()> {
        validate_signup(&req)?;

        if self.db.get_account_by_email(&req.email)?.is_some() {
            return Err(CoreError::Conflict("Email is already in use"));
        }
        if self.db.get_account_by_username(&req.username)?.is_some() {
            return Err(CoreError::Conflict("Username is already in use"));
        }

        let account_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let account = AccountRow {
            id: account_id.clone(),
            username: req.username,
            email: req.email.clone(),
            name: req.name,
            surname: req.surname,
            registered_at: timestamp(now),
            last_login_at: None,
            signup_ip: req.signup_ip,
            last_login_ip: None,
            verified: false,
            used_space_bytes: 0,
            limit_space_bytes: DEFAULT_SPACE_LIMIT_BYTES,
        };
        let c = req.credentials;
        let credentials = CredentialRow {
            account_id: account_id.clone(),
            password_salt: c.password_salt,
            auth_salt: c.auth_salt,
            enc_salt: c.enc_salt,
            master_key_salt: c.master_key_salt,
            auth_hash: c.auth_hash,
            wrapped_master_key: c.wrapped_master_key,
            master_key_iv: c.master_key_iv,
            public_key: c.public_key,
            wrapped_private_key: c.wrapped_private_key,
            private_key_iv: c.private_key_iv,
            private_key_salt: c.private_key_salt,
        };

        let code = secure_token();
        let expires_at = timestamp(now + Duration::seconds(VERIFICATION_TTL_SECS));
        self.db
            .create_account_with_credentials(&account, &credentials, &code, &expires_at)?;

        info!("Account {} registered", account_id);
        self.send_verification_mail(&req.email, &code).await;
        Ok(())
    }

    /// Consume a verification code on its own. Unknown, expired and spent
    /// codes all fail the same way.
    pub fn verify_email(&self, code: &str) -> Result<()> {
        let Some(verification) = self.db.find_verification_by_code(code)? else {
            return Err(invalid_code());
        };
        self.consume(verification.account_id.as_str(), verification.expires_at.as_deref())
    }

    /// Consume a verification code presented together with the email.
    pub fn verify_email_for(&self, email: &str, code: &str) -> Result<()> {
        let Some(account) = self.db.get_account_by_email(email)? else {
            return Err(invalid_code());
        };
        let Some(verification) = self.db.get_verification(&account.id)? else {
            return Err(invalid_code());
        };
        if verification.code.as_deref() != Some(code) {
            return Err(invalid_code());
        }
        self.consume(&account.id, verification.expires_at.as_deref())
    }

    fn consume(&self, account_id: &str, expires_at: Option<&str>) -> Result<()> {
        match expires_at {
            Some(expiry) if expiry > cirrus_db::now().as_str() => {
                self.db.consume_verification(account_id)?;
                info!("Account {} verified", account_id);
                Ok(())
            }
            _ => Err(invalid_code()),
        }
    }

    pub async fn resend_verification(&self, email: &str) -> Result<()> {
        let Some(account) = self.db.get_account_by_email(email)? else {
            return Err(CoreError::NotFound("Account"));
        };
        let Some(verification) = self.db.get_verification(&account.id)? else {
            return Err(CoreError::NotFound("Verification record"));
        };
        if verification.verified {
            return Err(CoreError::Conflict("Account is already verified"));
        }

        let code = secure_token();
        let expires_at = timestamp(Utc::now() + Duration::seconds(VERIFICATION_TTL_SECS));
        self.db.reset_verification(&account.id, &code, &expires_at)?;

        self.send_verification_mail(email, &code).await;
        Ok(())
    }

    async fn send_verification_mail(&self, email: &str, code: &str) {
        let link = format!("{}/api/v1/auth/confirm/{}", self.verify_base_url, code);
        if let Err(e) = self.mailer.send_verification(email, &link).await {
            warn!("Failed to send verification email: {:#}", e);
        }
    }

    // -- Two-phase login --

    /// Init phase. The response has the same shape and success status whether
    /// or not the account exists; unknown emails get fresh random salts.
    pub fn initialize_login(&self, email: &str, ip: &str) -> Result<LoginInit> {
        if self.throttle.is_blocked(Some(email), ip)? {
            return Err(CoreError::Throttled);
        }

        let Some(account) = self.db.get_account_by_email(email)? else {
            self.throttle.record_failed_attempt(Some(email), ip)?;
            return Ok(fake_login_init());
        };

        let Some(credentials) = self.db.get_credentials(&account.id)? else {
            return Ok(fake_login_init());
        };

        Ok(LoginInit {
            password_salt: credentials.password_salt,
            auth_salt: credentials.auth_salt,
        })
    }

    /// Authenticate phase: equality on the stored authentication hash, then
    /// session issuance and release of the wrapped key material.
    pub fn authenticate(
        &self,
        email: &str,
        auth_hash: &str,
        ip: &str,
        user_agent: Option<&str>,
    ) -> Result<AuthSuccess> {
        let credentials = self.check_auth_hash(email, auth_hash, ip)?;

        let session_token = self
            .sessions
            .issue(&credentials.account_id, Some(ip), user_agent)?;
        self.db
            .touch_last_login(&credentials.account_id, Some(ip), &cirrus_db::now())?;

        debug!("Account {} authenticated", credentials.account_id);
        Ok(AuthSuccess {
            session_token,
            material: KeyMaterial {
                wrapped_master_key: credentials.wrapped_master_key,
                master_key_iv: credentials.master_key_iv,
                master_key_salt: credentials.master_key_salt,
                enc_salt: credentials.enc_salt,
                wrapped_private_key: credentials.wrapped_private_key,
                private_key_iv: credentials.private_key_iv,
                private_key_salt: credentials.private_key_salt,
            },
        })
    }

    /// Pre-flight for a password change: same proof as `authenticate` but no
    /// session is minted.
    pub fn verify_password(
        &self,
        email: &str,
        auth_hash: &str,
        ip: &str,
    ) -> Result<MasterKeyMaterial> {
        let credentials = self.check_auth_hash(email, auth_hash, ip)?;
        Ok(MasterKeyMaterial {
            wrapped_master_key: credentials.wrapped_master_key,
            master_key_iv: credentials.master_key_iv,
            master_key_salt: credentials.master_key_salt,
            enc_salt: credentials.enc_salt,
        })
    }

    fn check_auth_hash(&self, email: &str, auth_hash: &str, ip: &str) -> Result<CredentialRow> {
        if self.throttle.is_blocked(Some(email), ip)? {
            return Err(CoreError::Throttled);
        }

        let Some(account) = self.db.get_account_by_email(email)? else {
            self.throttle.record_failed_attempt(Some(email), ip)?;
            return Err(CoreError::InvalidCredentials);
        };

        if !account.verified {
            return Err(CoreError::Unverified);
        }

        let Some(credentials) = self.db.get_credentials(&account.id)? else {
            return Err(CoreError::NotFound("Account security data"));
        };

        if credentials.auth_hash != auth_hash {
            self.throttle.record_failed_attempt(Some(email), ip)?;
            return Err(CoreError::InvalidCredentials);
        }

        Ok(credentials)
    }

    // -- Password rotation --

    /// Whole-record credential swap. Requires a live session bound to the
    /// same account plus re-proof of the current hash; the presenting session
    /// dies with the old password.
    pub fn update_password(
        &self,
        rotation: PasswordRotation,
        session_token: &str,
        ip: &str,
    ) -> Result<()> {
        let Some(session_account_id) = self.sessions.account_for(session_token)? else {
            return Err(CoreError::Unauthorized);
        };

        let Some(account) = self.db.get_account_by_email(&rotation.email)? else {
            return Err(CoreError::NotFound("Account"));
        };
        if session_account_id != account.id {
            return Err(CoreError::Unauthorized);
        }

        let Some(credentials) = self.db.get_credentials(&account.id)? else {
            return Err(CoreError::NotFound("Account security data"));
        };

        if credentials.auth_hash != rotation.current_auth_hash {
            self.throttle
                .record_failed_attempt(Some(&rotation.email), ip)?;
            return Err(CoreError::InvalidCredentials);
        }

        let fields = [
            ("password_salt", &rotation.password_salt),
            ("auth_salt", &rotation.auth_salt),
            ("enc_salt", &rotation.enc_salt),
            ("master_key_salt", &rotation.master_key_salt),
            ("auth_hash", &rotation.auth_hash),
            ("wrapped_master_key", &rotation.wrapped_master_key),
            ("master_key_iv", &rotation.master_key_iv),
        ];
        for (field, value) in fields {
            if value.is_empty() {
                return Err(CoreError::Validation(format!("{} is required", field)));
            }
        }

        self.db.rotate_credentials(
            &account.id,
            &CredentialRotation {
                password_salt: rotation.password_salt,
                auth_salt: rotation.auth_salt,
                enc_salt: rotation.enc_salt,
                master_key_salt: rotation.master_key_salt,
                auth_hash: rotation.auth_hash,
                wrapped_master_key: rotation.wrapped_master_key,
                master_key_iv: rotation.master_key_iv,
            },
            session_token,
            &cirrus_db::now(),
        )?;

        info!("Credentials rotated for account {}", account.id);
        Ok(())
    }

    // -- Sessions --

    pub fn logout(&self, token: &str) -> Result<()> {
        self.sessions.invalidate(token)
    }

    pub fn verify_session(&self, token: &str) -> Result<bool> {
        self.sessions.verify(token)
    }

    /// Full account behind a valid session token, for request middleware.
    pub fn account_for_session(&self, token: &str) -> Result<Option<AccountRow>> {
        let Some(account_id) = self.sessions.account_for(token)? else {
            return Ok(None);
        };
        Ok(self.db.get_account_by_id(&account_id)?)
    }

    // -- Account operations --

    pub fn profile(&self, account_id: &str) -> Result<AccountRow> {
        self.db
            .get_account_by_id(account_id)?
            .ok_or(CoreError::NotFound("Account"))
    }

    pub fn public_key_by_email(&self, email: &str) -> Result<String> {
        let Some(account) = self.db.get_account_by_email(email)? else {
            return Err(CoreError::NotFound("Account"));
        };
        self.public_key_for_account(&account.id)
    }

    pub fn public_key_by_name(&self, username: &str) -> Result<String> {
        let Some(account) = self.db.get_account_by_username(username)? else {
            return Err(CoreError::NotFound("Account"));
        };
        self.public_key_for_account(&account.id)
    }

    pub fn public_key_for_account(&self, account_id: &str) -> Result<String> {
        self.db
            .get_public_key(account_id)?
            .ok_or(CoreError::NotFound("Public key"))
    }

    /// Remove the account and its auth-side dependents. The caller must have
    /// emptied the file ledger for this account first.
    pub fn delete_account(&self, account_id: &str) -> Result<()> {
        if self.db.get_account_by_id(account_id)?.is_none() {
            return Err(CoreError::NotFound("Account"));
        }
        self.db.delete_account_rows(account_id)?;
        info!("Account {} deleted", account_id);
        Ok(())
    }
}

fn invalid_code() -> CoreError {
    CoreError::validation("Invalid or expired verification code")
}

fn fake_login_init() -> LoginInit {
    LoginInit {
        password_salt: random_hex(SALT_HEX_LEN),
        auth_salt: random_hex(SALT_HEX_LEN),
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len / 2];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn validate_signup(req: &SignupRequest) -> Result<()> {
    check_len("Name", &req.name, 2, 50)?;
    check_len("Surname", &req.surname, 2, 50)?;
    check_len("Username", &req.username, 3, 30)?;

    if !is_valid_email(&req.email) {
        return Err(CoreError::validation("A valid email address is required"));
    }

    let c = &req.credentials;
    let required = [
        ("Password salt", &c.password_salt),
        ("Auth salt", &c.auth_salt),
        ("Encryption salt", &c.enc_salt),
        ("Master key salt", &c.master_key_salt),
        ("Authentication hash", &c.auth_hash),
        ("Wrapped master key", &c.wrapped_master_key),
        ("Master key IV", &c.master_key_iv),
        ("Public key", &c.public_key),
        ("Wrapped private key", &c.wrapped_private_key),
        ("Private key IV", &c.private_key_iv),
        ("Private key salt", &c.private_key_salt),
    ];
    for (field, value) in required {
        if value.is_empty() {
            return Err(CoreError::Validation(format!("{} is required", field)));
        }
    }
    Ok(())
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(CoreError::Validation(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::LogMailer;

    fn test_credentials() -> NewCredentials {
        NewCredentials {
            password_salt: random_hex(SALT_HEX_LEN),
            auth_salt: random_hex(SALT_HEX_LEN),
            enc_salt: random_hex(SALT_HEX_LEN),
            master_key_salt: random_hex(SALT_HEX_LEN),
            auth_hash: random_hex(64),
            wrapped_master_key: "wrapped-mk".into(),
            master_key_iv: random_hex(24),
            public_key: "pubkey-hex".into(),
            wrapped_private_key: "wrapped-pk".into(),
            private_key_iv: random_hex(24),
            private_key_salt: random_hex(SALT_HEX_LEN),
        }
    }

    fn signup_request(username: &str, email: &str) -> SignupRequest {
        SignupRequest {
            name: "Ada".into(),
            surname: "Lovelace".into(),
            username: username.into(),
            email: email.into(),
            signup_ip: Some("10.0.0.1".into()),
            credentials: test_credentials(),
        }
    }

    fn service() -> (Arc<Database>, AuthService) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let auth = AuthService::new(
            db.clone(),
            Arc::new(LogMailer),
            "http://localhost:8080".into(),
        );
        (db, auth)
    }

    #[tokio::test]
    async fn signup_rejects_short_username() {
        let (_db, auth) = service();
        let mut req = signup_request("ab", "ada@example.com");
        req.username = "ab".into();
        let err = auth.signup(req).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILURE");
    }

    #[tokio::test]
    async fn signup_rejects_duplicate_email() {
        let (_db, auth) = service();
        auth.signup(signup_request("ada", "ada@example.com"))
            .await
            .unwrap();
        let err = auth
            .signup(signup_request("grace", "ada@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn signup_rejects_duplicate_username() {
        let (_db, auth) = service();
        auth.signup(signup_request("ada", "ada@example.com"))
            .await
            .unwrap();
        let err = auth
            .signup(signup_request("ada", "other@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn init_for_unknown_email_matches_real_salt_shape() {
        let (_db, auth) = service();
        auth.signup(signup_request("ada", "ada@example.com"))
            .await
            .unwrap();

        let fake = auth
            .initialize_login("ghost@example.com", "10.0.0.2")
            .unwrap();
        let real = auth.initialize_login("ada@example.com", "10.0.0.2").unwrap();

        assert_eq!(fake.password_salt.len(), real.password_salt.len());
        assert_eq!(fake.auth_salt.len(), real.auth_salt.len());
        assert!(fake.password_salt.chars().all(|c| c.is_ascii_hexdigit()));

        // Fabricated salts are fresh every time.
        let fake2 = auth
            .initialize_login("ghost@example.com", "10.0.0.2")
            .unwrap();
        assert_ne!(fake.password_salt, fake2.password_salt);
    }

    #[tokio::test]
    async fn unverified_account_cannot_authenticate() {
        let (db, auth) = service();
        let req = signup_request("ada", "ada@example.com");
        let auth_hash = req.credentials.auth_hash.clone();
        auth.signup(req).await.unwrap();

        let err = auth
            .authenticate("ada@example.com", &auth_hash, "10.0.0.2", None)
            .unwrap_err();
        assert_eq!(err.code(), "UNVERIFIED");

        // No attempt is recorded for the unverified path.
        assert!(db.get_attempts_for_ip("10.0.0.2").unwrap().is_empty());
    }

    #[tokio::test]
    async fn verification_code_is_single_use() {
        let (db, auth) = service();
        auth.signup(signup_request("ada", "ada@example.com"))
            .await
            .unwrap();

        let account = db.get_account_by_email("ada@example.com").unwrap().unwrap();
        let code = db
            .get_verification(&account.id)
            .unwrap()
            .unwrap()
            .code
            .unwrap();

        auth.verify_email_for("ada@example.com", &code).unwrap();
        let err = auth
            .verify_email_for("ada@example.com", &code)
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILURE");
    }

    #[tokio::test]
    async fn expired_verification_code_fails() {
        let (db, auth) = service();
        auth.signup(signup_request("ada", "ada@example.com"))
            .await
            .unwrap();

        let account = db.get_account_by_email("ada@example.com").unwrap().unwrap();
        let code = db
            .get_verification(&account.id)
            .unwrap()
            .unwrap()
            .code
            .unwrap();

        // Backdate the expiry.
        let past = timestamp(Utc::now() - Duration::seconds(10));
        db.reset_verification(&account.id, &code, &past).unwrap();

        let err = auth.verify_email(&code).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILURE");
        assert!(!db.get_account_by_email("ada@example.com").unwrap().unwrap().verified);
    }

    #[tokio::test]
    async fn resend_replaces_the_code() {
        let (db, auth) = service();
        auth.signup(signup_request("ada", "ada@example.com"))
            .await
            .unwrap();

        let account = db.get_account_by_email("ada@example.com").unwrap().unwrap();
        let first = db
            .get_verification(&account.id)
            .unwrap()
            .unwrap()
            .code
            .unwrap();

        auth.resend_verification("ada@example.com").await.unwrap();
        let second = db
            .get_verification(&account.id)
            .unwrap()
            .unwrap()
            .code
            .unwrap();

        assert_ne!(first, second);
        assert!(auth.verify_email(&first).is_err());
        auth.verify_email(&second).unwrap();
    }
}
