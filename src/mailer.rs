// src/mailer.rs
use async_trait::async_trait;

/// Delivers account e-mails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, email: &str, name: &str, link: &str) -> Result<(), String>;
}

/// Writes verification links to the log instead of sending them.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, email: &str, name: &str, link: &str) -> Result<(), String> {
        tracing::info!(
            recipient = %email,
            "📧 Verification e-mail for {}: {}",
            name,
            link
        );
        Ok(())
    }
}

/// Link the user follows to verify their address.
pub fn verification_link(public_base_url: &str, token: &str) -> String {
    format!(
        "{}/api/auth/verify-email?token={}",
        public_base_url.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}
