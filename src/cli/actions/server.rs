use crate::api::{self, email::{EmailSender, LogEmailSender, MailgunSender}};
use crate::otp::rate_limit::RateLimitConfig;
use crate::otp::OtpPolicy;
use anyhow::Result;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub frontend_origin: Option<String>,
    pub otp_ttl_seconds: u64,
    pub otp_max_attempts: u32,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_seconds: u64,
    pub mailgun_domain: Option<String>,
    pub mailgun_api_key: Option<SecretString>,
    pub email_from: Option<String>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the delivery client cannot be built or the server
/// fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let policy = OtpPolicy::new()
        .with_ttl(Duration::from_secs(args.otp_ttl_seconds))
        .with_max_attempts(args.otp_max_attempts);

    let rate_config = RateLimitConfig::new()
        .with_max_requests(args.rate_limit_max_requests)
        .with_window(Duration::from_secs(args.rate_limit_window_seconds));

    let sender: Arc<dyn EmailSender> = match (args.mailgun_domain, args.mailgun_api_key) {
        (Some(domain), Some(api_key)) => {
            Arc::new(MailgunSender::new(domain, api_key, args.email_from)?)
        }
        _ => {
            info!("No Mailgun credentials provided; using the log-only email sender");
            Arc::new(LogEmailSender)
        }
    };

    api::new(
        args.port,
        args.dsn,
        policy,
        rate_config,
        sender,
        args.frontend_origin,
    )
    .await
}
