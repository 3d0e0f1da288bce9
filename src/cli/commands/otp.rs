//! Passcode policy and issuance rate-limit arguments.

use anyhow::Result;
use clap::{Arg, Command};

pub const ARG_OTP_TTL: &str = "otp-ttl";
pub const ARG_OTP_MAX_ATTEMPTS: &str = "otp-max-attempts";
pub const ARG_RATE_LIMIT_MAX_REQUESTS: &str = "rate-limit-max-requests";
pub const ARG_RATE_LIMIT_WINDOW: &str = "rate-limit-window";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_TTL)
                .long(ARG_OTP_TTL)
                .help("Seconds an issued passcode stays valid")
                .default_value("60")
                .env("KONFIRMO_OTP_TTL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_OTP_MAX_ATTEMPTS)
                .long(ARG_OTP_MAX_ATTEMPTS)
                .help("Failed verification attempts before a passcode is invalidated")
                .default_value("4")
                .env("KONFIRMO_OTP_MAX_ATTEMPTS")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_MAX_REQUESTS)
                .long(ARG_RATE_LIMIT_MAX_REQUESTS)
                .help("Issuance requests allowed per identity within the window")
                .default_value("3")
                .env("KONFIRMO_RATE_LIMIT_MAX_REQUESTS")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW)
                .long(ARG_RATE_LIMIT_WINDOW)
                .help("Seconds per issuance rate-limit window")
                .default_value("600")
                .env("KONFIRMO_RATE_LIMIT_WINDOW")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub ttl_seconds: u64,
    pub max_attempts: u32,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_seconds: u64,
}

impl Options {
    /// Read the policy arguments back out of parsed matches.
    ///
    /// # Errors
    /// Does not error today; kept fallible for parity with sibling option
    /// parsers so dispatch composes uniformly.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            ttl_seconds: matches.get_one::<u64>(ARG_OTP_TTL).copied().unwrap_or(60),
            max_attempts: matches
                .get_one::<u32>(ARG_OTP_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(4),
            rate_limit_max_requests: matches
                .get_one::<u32>(ARG_RATE_LIMIT_MAX_REQUESTS)
                .copied()
                .unwrap_or(3),
            rate_limit_window_seconds: matches
                .get_one::<u64>(ARG_RATE_LIMIT_WINDOW)
                .copied()
                .unwrap_or(600),
        })
    }
}
