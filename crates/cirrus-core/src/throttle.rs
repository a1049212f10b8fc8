use std::sync::Arc;

use chrono::{Duration, Utc};
use cirrus_db::{Database, timestamp};
use tracing::info;

use crate::error::Result;

pub const MAX_ATTEMPTS: i64 = 15;
pub const ATTEMPT_WINDOW_SECS: i64 = 3600;
pub const BLOCK_DURATION_SECS: i64 = 1800;

/// Append-only attempt ledger. Block state is derived from the log at query
/// time — a block is itself a row with a future expiry, never an in-place
/// update, so concurrent writers cannot corrupt a count.
#[derive(Clone)]
pub struct AttemptLedger {
    db: Arc<Database>,
}

impl AttemptLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a failed attempt; derive block rows for any dimension that has
    /// reached the threshold inside the rolling window.
    pub fn record_failed_attempt(&self, email: Option<&str>, ip: &str) -> Result<()> {
        let now = Utc::now();
        let now_s = timestamp(now);
        let email = non_empty(email);

        self.db.insert_attempt(ip, email, &now_s, false, None)?;

        let window_start = timestamp(now - Duration::seconds(ATTEMPT_WINDOW_SECS));
        let block_expires = timestamp(now + Duration::seconds(BLOCK_DURATION_SECS));

        if self.db.count_recent_attempts_by_ip(ip, &window_start)? >= MAX_ATTEMPTS {
            info!("Blocking ip {} after repeated failed login attempts", ip);
            self.db
                .insert_attempt(ip, email, &now_s, true, Some(&block_expires))?;
        }

        if let Some(email) = email {
            if self.db.count_recent_attempts_by_email(email, &window_start)? >= MAX_ATTEMPTS {
                info!("Blocking email dimension after repeated failed login attempts");
                self.db
                    .insert_attempt(ip, Some(email), &now_s, true, Some(&block_expires))?;
            }
        }

        Ok(())
    }

    /// True iff an unexpired block row exists for the IP or, when an email is
    /// given, for that email. An absent email skips only the email lookup.
    pub fn is_blocked(&self, email: Option<&str>, ip: &str) -> Result<bool> {
        let now = cirrus_db::now();

        if self.db.has_active_block_for_ip(ip, &now)? {
            return Ok(true);
        }

        if let Some(email) = non_empty(email) {
            return Ok(self.db.has_active_block_for_email(email, &now)?);
        }

        Ok(false)
    }
}

fn non_empty(email: Option<&str>) -> Option<&str> {
    email.filter(|e| !e.is_empty())
}
