use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Outbound mail collaborator. Fire-and-forget: callers log failures and
/// never retry here.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, email: &str, link: &str) -> Result<()>;
}

/// Default delivery: write the verification link to the log. Deployments
/// with a real mail gateway plug in their own `Mailer`.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, email: &str, link: &str) -> Result<()> {
        info!("Verification mail for {}: {}", email, link);
        Ok(())
    }
}
