//! Outbound email delivery.
//!
//! The service only needs `send(to, subject, body) -> success | failure`; the
//! trait keeps the provider swappable. `MailgunSender` delivers through the
//! Mailgun messages API, `LogEmailSender` is the local-dev stand-in. Delivery
//! runs strictly after the OTP record is committed, so a failure here never
//! corrupts store state.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, info};

const MAILGUN_API_BASE: &str = "https://api.mailgun.net/v3";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    /// Carries the raw passcode; keep it out of info-level logs.
    pub body: String,
}

/// Email delivery abstraction used by the issuance flow.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error for the caller to surface.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs instead of sending real email.
///
/// The body (and with it the passcode) only appears at debug verbosity.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to,
            subject = %message.subject,
            "email delivery stub"
        );
        debug!(body = %message.body, "stub message body");
        Ok(())
    }
}

/// Sender backed by the Mailgun HTTP API.
pub struct MailgunSender {
    client: Client,
    domain: String,
    api_key: SecretString,
    from: String,
}

impl MailgunSender {
    /// Build a sender for `domain` authenticated with `api_key`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(domain: String, api_key: SecretString, from: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(SEND_TIMEOUT)
            .build()
            .context("failed to build email delivery client")?;
        let from = from.unwrap_or_else(|| format!("Konfirmo <no-reply@{domain}>"));
        Ok(Self {
            client,
            domain,
            api_key,
            from,
        })
    }

    #[must_use]
    pub fn from_address(&self) -> &str {
        &self.from
    }
}

#[async_trait]
impl EmailSender for MailgunSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let params = [
            ("from", self.from.as_str()),
            ("to", message.to.as_str()),
            ("subject", message.subject.as_str()),
            ("text", message.body.as_str()),
        ];

        let response = self
            .client
            .post(format!("{MAILGUN_API_BASE}/{}/messages", self.domain))
            .basic_auth("api", Some(self.api_key.expose_secret()))
            .form(&params)
            .send()
            .await
            .context("mailgun request failed")?;

        let status = response.status();
        if !status.is_success() {
            // Surface the status only; the response body is provider detail
            // and the request body holds the passcode.
            bail!("mailgun API returned {status}");
        }

        info!(to_email = %message.to, "verification email dispatched");
        Ok(())
    }
}
