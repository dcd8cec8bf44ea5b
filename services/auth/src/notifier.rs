//! Outbound notification port
//!
//! The OTP component hands messages to an explicit notifier instead of
//! sending mail as a side effect of request handling. Delivery is
//! fire-and-forget: callers log failures and the request proceeds.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// Outbound notification port. No delivery guarantee.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message to the given address.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Mail gateway configuration
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// HTTP endpoint of the mail gateway
    pub api_url: String,
    /// Sender address stamped on outgoing messages
    pub sender: String,
}

impl MailerConfig {
    /// Create a new MailerConfig from environment variables
    ///
    /// # Environment Variables
    /// - `MAIL_API_URL`: Mail gateway endpoint; when unset, mail is logged only
    /// - `MAIL_SENDER`: Sender address (default: "no-reply@civicgrid.local")
    pub fn from_env() -> Option<Self> {
        let api_url = std::env::var("MAIL_API_URL").ok()?;
        let sender = std::env::var("MAIL_SENDER")
            .unwrap_or_else(|_| "no-reply@civicgrid.local".to_string());

        Some(Self { api_url, sender })
    }
}

#[derive(Serialize)]
struct OutboundMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Notifier that posts messages to an HTTP mail gateway
pub struct HttpMailer {
    client: reqwest::Client,
    config: MailerConfig,
}

impl HttpMailer {
    pub fn new(config: MailerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let mail = OutboundMail {
            from: &self.config.sender,
            to,
            subject,
            text: body,
        };

        let resp = self
            .client
            .post(&self.config.api_url)
            .json(&mail)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Mail gateway returned {}: {}", status, body);
        }

        Ok(())
    }
}

/// Notifier that only logs, for environments without a mail gateway
pub struct LogMailer;

#[async_trait]
impl Notifier for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!("Mail for {} ({}): {}", to, subject, body);
        Ok(())
    }
}
