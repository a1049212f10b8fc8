use std::sync::Arc;

use anyhow::anyhow;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use cirrus_db::models::SessionRow;
use cirrus_db::{Database, timestamp};
use rand::RngCore;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoreError, Result};

pub const SESSION_TTL_SECS: i64 = 86_400;

/// 128 bits, URL-safe base64 without padding — 22 characters.
const TOKEN_BYTES: usize = 16;
const TOKEN_INSERT_RETRIES: usize = 3;

/// Opaque bearer-token sessions. Tokens are unguessable random strings
/// checked against the sessions table; invalidation forces the expiry to
/// "now" and keeps the row for audit.
#[derive(Clone)]
pub struct SessionManager {
    db: Arc<Database>,
}

impl SessionManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn issue(
        &self,
        account_id: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<String> {
        let now = Utc::now();

        // Token uniqueness is a hard invariant; the UNIQUE index enforces it
        // and a collision simply draws a fresh token.
        for _ in 0..TOKEN_INSERT_RETRIES {
            let token = secure_token();
            let session = SessionRow {
                id: Uuid::new_v4().to_string(),
                account_id: account_id.to_string(),
                token: token.clone(),
                created_at: timestamp(now),
                expires_at: timestamp(now + Duration::seconds(SESSION_TTL_SECS)),
                ip: ip.map(str::to_string),
                user_agent: user_agent.map(str::to_string),
            };
            match self.db.insert_session(&session) {
                Ok(()) => {
                    debug!("Issued session for account {}", account_id);
                    return Ok(token);
                }
                Err(e) if cirrus_db::is_unique_violation(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoreError::Persistence(anyhow!(
            "could not allocate a unique session token"
        )))
    }

    /// Missing, unknown and expired tokens are indistinguishable: all are
    /// simply "not authenticated".
    pub fn verify(&self, token: &str) -> Result<bool> {
        Ok(self.account_for(token)?.is_some())
    }

    /// Account id behind a token, when the session is valid.
    pub fn account_for(&self, token: &str) -> Result<Option<String>> {
        if token.is_empty() {
            return Ok(None);
        }
        let now = cirrus_db::now();
        let session = self.db.get_session_by_token(token)?;
        Ok(session
            .filter(|s| s.expires_at > now)
            .map(|s| s.account_id))
    }

    /// Idempotent: invalidating an unknown or already-invalid token is fine.
    pub fn invalidate(&self, token: &str) -> Result<()> {
        self.db.expire_session(token, &cirrus_db::now())?;
        Ok(())
    }
}

/// Cryptographically random URL-safe token, also used for verification codes.
pub(crate) fn secure_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_db::models::AccountRow;
    use cirrus_db::models::CredentialRow;

    fn test_account(db: &Database, id: &str) {
        let account = AccountRow {
            id: id.to_string(),
            username: format!("user-{}", id),
            email: format!("{}@example.com", id),
            name: "Test".into(),
            surname: "Person".into(),
            registered_at: cirrus_db::now(),
            last_login_at: None,
            signup_ip: None,
            last_login_ip: None,
            verified: true,
            used_space_bytes: 0,
            limit_space_bytes: 1024,
        };
        let credentials = CredentialRow {
            account_id: id.to_string(),
            password_salt: "ps".into(),
            auth_salt: "as".into(),
            enc_salt: "es".into(),
            master_key_salt: "ms".into(),
            auth_hash: "ah".into(),
            wrapped_master_key: "wmk".into(),
            master_key_iv: "iv".into(),
            public_key: "pk".into(),
            wrapped_private_key: "wpk".into(),
            private_key_iv: "piv".into(),
            private_key_salt: "psalt".into(),
        };
        db.create_account_with_credentials(&account, &credentials, "code", &cirrus_db::now())
            .unwrap();
    }

    #[test]
    fn tokens_are_fixed_length_and_distinct() {
        let a = secure_token();
        let b = secure_token();
        assert_eq!(a.len(), 22);
        assert_eq!(b.len(), 22);
        assert_ne!(a, b);
    }

    #[test]
    fn issue_then_verify_then_invalidate() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        test_account(&db, "acct-1");
        let sessions = SessionManager::new(db.clone());

        let token = sessions.issue("acct-1", Some("10.0.0.1"), None).unwrap();
        assert!(sessions.verify(&token).unwrap());
        assert_eq!(
            sessions.account_for(&token).unwrap().as_deref(),
            Some("acct-1")
        );

        sessions.invalidate(&token).unwrap();
        assert!(!sessions.verify(&token).unwrap());

        // Idempotent on unknown and already-invalid tokens.
        sessions.invalidate(&token).unwrap();
        sessions.invalidate("no-such-token").unwrap();
    }

    #[test]
    fn expired_session_is_invalid() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        test_account(&db, "acct-2");
        let sessions = SessionManager::new(db.clone());

        let token = sessions.issue("acct-2", None, None).unwrap();

        // Force the expiry into the past through the db layer.
        let past = timestamp(Utc::now() - Duration::seconds(1));
        db.expire_session(&token, &past).unwrap();

        assert!(!sessions.verify(&token).unwrap());
    }

    #[test]
    fn empty_token_is_invalid() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let sessions = SessionManager::new(db);
        assert!(!sessions.verify("").unwrap());
    }
}
