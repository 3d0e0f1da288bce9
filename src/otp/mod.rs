//! One-time passcode lifecycle: generation, hashed storage with TTL,
//! issuance rate limiting, and bounded-attempt verification.
//!
//! State lives behind the [`store::OtpStore`] and [`rate_limit::RateLimiter`]
//! traits so the same orchestration runs against the in-process backends or a
//! shared Postgres deployment. [`service::OtpService`] owns the flow; nothing
//! outside this module mutates OTP state directly.

pub mod code;
pub mod error;
pub mod hash;
pub mod rate_limit;
pub mod service;
pub mod store;

pub use error::{IssueError, VerifyOutcome};
pub use service::{OtpPolicy, OtpService};
