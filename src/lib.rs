//! # Konfirmo (Email OTP Verification Service)
//!
//! `konfirmo` issues and verifies one-time passcodes for email-based identity
//! confirmation. A client requests a passcode for an address; the service
//! generates a six-digit code from a CSPRNG, stores only its SHA-256 digest
//! together with a TTL and an attempt counter, dispatches the code through an
//! outbound email provider, and later checks a submitted code against the
//! stored digest.
//!
//! ## Lifecycle
//!
//! - **Issuance:** syntactic email validation → per-identity fixed-window
//!   rate limit → code generation → hashed store write → delivery. A delivery
//!   failure is reported distinctly; the committed record stays in place and
//!   the next issuance overwrites it.
//! - **Verification:** store lookup (expired records read as absent) →
//!   attempt-budget check → digest comparison. A match clears the record; a
//!   mismatch advances the counter, and the exhausting attempt clears the
//!   record so only re-issuance can continue.
//!
//! ## Backends
//!
//! OTP state and rate-limit windows live behind traits with two backends:
//! in-process maps for a single instance, or Postgres tables shared across
//! instances (`db/sql/01_konfirmo.sql`). The service's responsibility ends at
//! "verified: yes/no"; it issues no sessions or tokens.

pub mod api;
pub mod cli;
pub mod otp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
