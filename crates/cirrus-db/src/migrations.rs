use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE accounts (
                id                  TEXT PRIMARY KEY,
                username            TEXT NOT NULL UNIQUE,
                email               TEXT NOT NULL UNIQUE,
                name                TEXT NOT NULL,
                surname             TEXT NOT NULL,
                registered_at       TEXT NOT NULL,
                last_login_at       TEXT,
                signup_ip           TEXT,
                last_login_ip       TEXT,
                verified            INTEGER NOT NULL DEFAULT 0,
                used_space_bytes    INTEGER NOT NULL DEFAULT 0,
                limit_space_bytes   INTEGER NOT NULL
            );

            CREATE TABLE credentials (
                account_id          TEXT PRIMARY KEY REFERENCES accounts(id),
                password_salt       TEXT NOT NULL,
                auth_salt           TEXT NOT NULL,
                enc_salt            TEXT NOT NULL,
                master_key_salt     TEXT NOT NULL,
                auth_hash           TEXT NOT NULL,
                wrapped_master_key  TEXT NOT NULL,
                master_key_iv       TEXT NOT NULL,
                public_key          TEXT NOT NULL,
                wrapped_private_key TEXT NOT NULL,
                private_key_iv      TEXT NOT NULL,
                private_key_salt    TEXT NOT NULL
            );

            CREATE TABLE verification (
                account_id  TEXT PRIMARY KEY REFERENCES accounts(id),
                code        TEXT,
                expires_at  TEXT,
                verified    INTEGER NOT NULL DEFAULT 0
            );

            -- Append-only: blocks are rows too, never in-place updates.
            CREATE TABLE login_attempts (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                ip               TEXT NOT NULL,
                email            TEXT,
                attempted_at     TEXT NOT NULL,
                blocked          INTEGER NOT NULL DEFAULT 0,
                block_expires_at TEXT
            );

            CREATE INDEX idx_attempts_ip ON login_attempts(ip, attempted_at);
            CREATE INDEX idx_attempts_email ON login_attempts(email, attempted_at);

            CREATE TABLE sessions (
                id          TEXT PRIMARY KEY,
                account_id  TEXT NOT NULL REFERENCES accounts(id),
                token       TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL,
                expires_at  TEXT NOT NULL,
                ip          TEXT,
                user_agent  TEXT
            );

            CREATE INDEX idx_sessions_account ON sessions(account_id);

            -- storage_key is 'none' until content is attached (two-phase
            -- creation); transferred copies share the same storage_key.
            CREATE TABLE file_metadata (
                id           TEXT PRIMARY KEY,
                holder_id    TEXT NOT NULL REFERENCES accounts(id),
                file_name    TEXT NOT NULL,
                size_bytes   INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                storage_key  TEXT NOT NULL DEFAULT 'none'
            );

            CREATE INDEX idx_files_holder ON file_metadata(holder_id, created_at);
            CREATE INDEX idx_files_storage_key ON file_metadata(storage_key);

            CREATE TABLE holder_keys (
                file_id     TEXT PRIMARY KEY REFERENCES file_metadata(id),
                holder_id   TEXT NOT NULL REFERENCES accounts(id),
                wrapped_key TEXT NOT NULL,
                content_iv  TEXT NOT NULL,
                content_tag TEXT NOT NULL,
                key_iv      TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE file_owners (
                file_id  TEXT PRIMARY KEY REFERENCES file_metadata(id),
                owner_id TEXT NOT NULL REFERENCES accounts(id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
