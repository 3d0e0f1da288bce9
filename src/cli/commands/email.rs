//! Outbound delivery arguments. Without Mailgun credentials the server runs
//! with the local-dev log sender.

use anyhow::Result;
use clap::{Arg, Command};
use secrecy::SecretString;

pub const ARG_MAILGUN_DOMAIN: &str = "mailgun-domain";
pub const ARG_MAILGUN_API_KEY: &str = "mailgun-api-key";
pub const ARG_EMAIL_FROM: &str = "email-from";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAILGUN_DOMAIN)
                .long(ARG_MAILGUN_DOMAIN)
                .help("Mailgun sending domain")
                .env("KONFIRMO_MAILGUN_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_MAILGUN_API_KEY)
                .long(ARG_MAILGUN_API_KEY)
                .help("Mailgun API key")
                .env("KONFIRMO_MAILGUN_API_KEY")
                .requires(ARG_MAILGUN_DOMAIN),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("From address for outbound mail, e.g. 'Konfirmo <no-reply@example.com>'")
                .env("KONFIRMO_EMAIL_FROM"),
        )
}

#[derive(Debug, Clone)]
pub struct Options {
    pub mailgun_domain: Option<String>,
    pub mailgun_api_key: Option<SecretString>,
    pub email_from: Option<String>,
}

impl Options {
    /// Read the delivery arguments back out of parsed matches.
    ///
    /// # Errors
    /// Does not error today; kept fallible for parity with sibling option
    /// parsers so dispatch composes uniformly.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            mailgun_domain: matches.get_one::<String>(ARG_MAILGUN_DOMAIN).cloned(),
            mailgun_api_key: matches
                .get_one::<String>(ARG_MAILGUN_API_KEY)
                .map(|key| SecretString::from(key.clone())),
            email_from: matches.get_one::<String>(ARG_EMAIL_FROM).cloned(),
        })
    }
}
