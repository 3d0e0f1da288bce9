//! Command-line argument dispatch and server initialization.
//!
//! This module maps validated CLI arguments to the appropriate action, such
//! as starting the API server with its full configuration state.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{email, otp, ARG_DSN, ARG_FRONTEND_ORIGIN, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if option parsing fails.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches.get_one::<String>(ARG_DSN).cloned();
    let frontend_origin = matches.get_one::<String>(ARG_FRONTEND_ORIGIN).cloned();

    let otp_opts = otp::Options::parse(matches)?;
    let email_opts = email::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_origin,
        otp_ttl_seconds: otp_opts.ttl_seconds,
        otp_max_attempts: otp_opts.max_attempts,
        rate_limit_max_requests: otp_opts.rate_limit_max_requests,
        rate_limit_window_seconds: otp_opts.rate_limit_window_seconds,
        mailgun_domain: email_opts.mailgun_domain,
        mailgun_api_key: email_opts.mailgun_api_key,
        email_from: email_opts.email_from,
    }))
}
