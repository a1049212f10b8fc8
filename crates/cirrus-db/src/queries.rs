use crate::models::{AccountRow, AttemptRow, CredentialRow, SessionRow, VerificationRow};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::{Connection, params};

/// Rotated credential fields for a password change. The key-pair fields
/// (public key, wrapped private key) are carried over unchanged.
pub struct CredentialRotation {
    pub password_salt: String,
    pub auth_salt: String,
    pub enc_salt: String,
    pub master_key_salt: String,
    pub auth_hash: String,
    pub wrapped_master_key: String,
    pub master_key_iv: String,
}

impl Database {
    // -- Accounts --

    /// Insert account, credential and verification rows as one unit, so a
    /// half-registered account can never be observed.
    pub fn create_account_with_credentials(
        &self,
        account: &AccountRow,
        credentials: &CredentialRow,
        verification_code: &str,
        verification_expires_at: &str,
    ) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO accounts (id, username, email, name, surname, registered_at,
                                       signup_ip, verified, used_space_bytes, limit_space_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, ?8)",
                params![
                    account.id,
                    account.username,
                    account.email,
                    account.name,
                    account.surname,
                    account.registered_at,
                    account.signup_ip,
                    account.limit_space_bytes,
                ],
            )?;
            tx.execute(
                "INSERT INTO credentials (account_id, password_salt, auth_salt, enc_salt,
                                          master_key_salt, auth_hash, wrapped_master_key,
                                          master_key_iv, public_key, wrapped_private_key,
                                          private_key_iv, private_key_salt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    credentials.account_id,
                    credentials.password_salt,
                    credentials.auth_salt,
                    credentials.enc_salt,
                    credentials.master_key_salt,
                    credentials.auth_hash,
                    credentials.wrapped_master_key,
                    credentials.master_key_iv,
                    credentials.public_key,
                    credentials.wrapped_private_key,
                    credentials.private_key_iv,
                    credentials.private_key_salt,
                ],
            )?;
            tx.execute(
                "INSERT INTO verification (account_id, code, expires_at, verified)
                 VALUES (?1, ?2, ?3, 0)",
                params![account.id, verification_code, verification_expires_at],
            )?;
            Ok(())
        })
    }

    pub fn get_account_by_email(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "email", email))
    }

    pub fn get_account_by_username(&self, username: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "username", username))
    }

    pub fn get_account_by_id(&self, id: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "id", id))
    }

    pub fn account_name(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT name FROM accounts WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    pub fn touch_last_login(&self, id: &str, ip: Option<&str>, at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE accounts SET last_login_at = ?1, last_login_ip = ?2 WHERE id = ?3",
                params![at, ip, id],
            )?;
            Ok(())
        })
    }

    /// Remove an account and its 1:1 / 1:N dependents. File rows are the
    /// ledger's responsibility and must already be gone.
    pub fn delete_account_rows(&self, id: &str) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute("DELETE FROM sessions WHERE account_id = ?1", [id])?;
            tx.execute("DELETE FROM verification WHERE account_id = ?1", [id])?;
            tx.execute("DELETE FROM credentials WHERE account_id = ?1", [id])?;
            tx.execute("DELETE FROM accounts WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Credentials --

    pub fn get_credentials(&self, account_id: &str) -> Result<Option<CredentialRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT account_id, password_salt, auth_salt, enc_salt, master_key_salt,
                        auth_hash, wrapped_master_key, master_key_iv, public_key,
                        wrapped_private_key, private_key_iv, private_key_salt
                 FROM credentials WHERE account_id = ?1",
                [account_id],
                |row| {
                    Ok(CredentialRow {
                        account_id: row.get(0)?,
                        password_salt: row.get(1)?,
                        auth_salt: row.get(2)?,
                        enc_salt: row.get(3)?,
                        master_key_salt: row.get(4)?,
                        auth_hash: row.get(5)?,
                        wrapped_master_key: row.get(6)?,
                        master_key_iv: row.get(7)?,
                        public_key: row.get(8)?,
                        wrapped_private_key: row.get(9)?,
                        private_key_iv: row.get(10)?,
                        private_key_salt: row.get(11)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn get_public_key(&self, account_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT public_key FROM credentials WHERE account_id = ?1",
                [account_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Whole-record credential swap plus invalidation of the presenting
    /// session, in one transaction.
    pub fn rotate_credentials(
        &self,
        account_id: &str,
        rotation: &CredentialRotation,
        session_token: &str,
        now: &str,
    ) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE credentials
                 SET password_salt = ?1, auth_salt = ?2, enc_salt = ?3, master_key_salt = ?4,
                     auth_hash = ?5, wrapped_master_key = ?6, master_key_iv = ?7
                 WHERE account_id = ?8",
                params![
                    rotation.password_salt,
                    rotation.auth_salt,
                    rotation.enc_salt,
                    rotation.master_key_salt,
                    rotation.auth_hash,
                    rotation.wrapped_master_key,
                    rotation.master_key_iv,
                    account_id,
                ],
            )?;
            tx.execute(
                "UPDATE sessions SET expires_at = ?1 WHERE token = ?2",
                params![now, session_token],
            )?;
            Ok(())
        })
    }

    // -- Verification --

    pub fn get_verification(&self, account_id: &str) -> Result<Option<VerificationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT account_id, code, expires_at, verified FROM verification WHERE account_id = ?1",
                [account_id],
                map_verification,
            )
            .optional()
        })
    }

    pub fn find_verification_by_code(&self, code: &str) -> Result<Option<VerificationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT account_id, code, expires_at, verified FROM verification WHERE code = ?1",
                [code],
                map_verification,
            )
            .optional()
        })
    }

    /// Single-use consumption: clears the code and expiry and flips both
    /// verified flags.
    pub fn consume_verification(&self, account_id: &str) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE verification SET code = NULL, expires_at = NULL, verified = 1
                 WHERE account_id = ?1",
                [account_id],
            )?;
            tx.execute(
                "UPDATE accounts SET verified = 1 WHERE id = ?1",
                [account_id],
            )?;
            Ok(())
        })
    }

    pub fn reset_verification(
        &self,
        account_id: &str,
        code: &str,
        expires_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE verification SET code = ?1, expires_at = ?2 WHERE account_id = ?3",
                params![code, expires_at, account_id],
            )?;
            Ok(())
        })
    }

    // -- Login attempts --

    pub fn insert_attempt(
        &self,
        ip: &str,
        email: Option<&str>,
        attempted_at: &str,
        blocked: bool,
        block_expires_at: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO login_attempts (ip, email, attempted_at, blocked, block_expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![ip, email, attempted_at, blocked, block_expires_at],
            )?;
            Ok(())
        })
    }

    pub fn count_recent_attempts_by_ip(&self, ip: &str, since: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM login_attempts WHERE ip = ?1 AND attempted_at >= ?2",
                params![ip, since],
                |row| row.get(0),
            )
            .map_err(Into::into)
        })
    }

    pub fn count_recent_attempts_by_email(&self, email: &str, since: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM login_attempts WHERE email = ?1 AND attempted_at >= ?2",
                params![email, since],
                |row| row.get(0),
            )
            .map_err(Into::into)
        })
    }

    pub fn has_active_block_for_ip(&self, ip: &str, now: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM login_attempts
                 WHERE ip = ?1 AND blocked = 1 AND block_expires_at > ?2",
                params![ip, now],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn has_active_block_for_email(&self, email: &str, now: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM login_attempts
                 WHERE email = ?1 AND blocked = 1 AND block_expires_at > ?2",
                params![email, now],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn get_attempts_for_ip(&self, ip: &str) -> Result<Vec<AttemptRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, ip, email, attempted_at, blocked, block_expires_at
                 FROM login_attempts WHERE ip = ?1 ORDER BY attempted_at",
            )?;
            let rows = stmt
                .query_map([ip], |row| {
                    Ok(AttemptRow {
                        id: row.get(0)?,
                        ip: row.get(1)?,
                        email: row.get(2)?,
                        attempted_at: row.get(3)?,
                        blocked: row.get(4)?,
                        block_expires_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Sessions --

    pub fn insert_session(&self, session: &SessionRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, account_id, token, created_at, expires_at, ip, user_agent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session.id,
                    session.account_id,
                    session.token,
                    session.created_at,
                    session.expires_at,
                    session.ip,
                    session.user_agent,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_session_by_token(&self, token: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, account_id, token, created_at, expires_at, ip, user_agent
                 FROM sessions WHERE token = ?1",
                [token],
                |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        account_id: row.get(1)?,
                        token: row.get(2)?,
                        created_at: row.get(3)?,
                        expires_at: row.get(4)?,
                        ip: row.get(5)?,
                        user_agent: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Idempotent: expiring an unknown or already-expired token is not an
    /// error. The row is kept for audit.
    pub fn expire_session(&self, token: &str, now: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET expires_at = ?1 WHERE token = ?2 AND expires_at > ?1",
                params![now, token],
            )?;
            Ok(())
        })
    }

}

fn query_account(conn: &Connection, column: &str, value: &str) -> Result<Option<AccountRow>> {
    // `column` is a compile-time constant chosen by the callers above.
    let sql = format!(
        "SELECT id, username, email, name, surname, registered_at, last_login_at,
                signup_ip, last_login_ip, verified, used_space_bytes, limit_space_bytes
         FROM accounts WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row([value], |row| {
            Ok(AccountRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                name: row.get(3)?,
                surname: row.get(4)?,
                registered_at: row.get(5)?,
                last_login_at: row.get(6)?,
                signup_ip: row.get(7)?,
                last_login_ip: row.get(8)?,
                verified: row.get(9)?,
                used_space_bytes: row.get(10)?,
                limit_space_bytes: row.get(11)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn map_verification(row: &rusqlite::Row<'_>) -> rusqlite::Result<VerificationRow> {
    Ok(VerificationRow {
        account_id: row.get(0)?,
        code: row.get(1)?,
        expires_at: row.get(2)?,
        verified: row.get(3)?,
    })
}
