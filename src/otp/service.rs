//! Issuance orchestration and the verification engine.

use anyhow::Result;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::email::{EmailMessage, EmailSender};

use super::code;
use super::error::{IssueError, VerifyOutcome};
use super::hash;
use super::rate_limit::{RateLimitDecision, RateLimiter};
use super::store::OtpStore;

const DEFAULT_TTL: Duration = Duration::from_secs(60);
const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Normalize an email for keying and comparison.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Permissive syntactic check (`local@domain.tld`), not address-validity
/// confirmation; delivery is the real test.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

#[derive(Clone, Copy, Debug)]
pub struct OtpPolicy {
    ttl: Duration,
    max_attempts: u32,
}

impl OtpPolicy {
    /// Default policy: 60-second TTL, 4 verification attempts per code.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// The OTP lifecycle state machine over injected store, limiter, and sender.
pub struct OtpService {
    store: Arc<dyn OtpStore>,
    limiter: Arc<dyn RateLimiter>,
    sender: Arc<dyn EmailSender>,
    policy: OtpPolicy,
}

impl OtpService {
    #[must_use]
    pub fn new(
        store: Arc<dyn OtpStore>,
        limiter: Arc<dyn RateLimiter>,
        sender: Arc<dyn EmailSender>,
        policy: OtpPolicy,
    ) -> Self {
        Self {
            store,
            limiter,
            sender,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// Issue a fresh passcode for `email` and dispatch it.
    ///
    /// The record is committed before delivery; on delivery failure it stays
    /// in place (unusable by the recipient, overwritten by the next issue).
    ///
    /// # Errors
    /// `InvalidEmail` and `RateLimited` report policy refusals with no state
    /// change. `Storage` covers limiter/store backend failures (fail closed).
    /// `Delivery` means the code was stored but could not be sent.
    pub async fn issue(&self, email: &str) -> Result<(), IssueError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(IssueError::InvalidEmail);
        }

        match self.limiter.check(&email).await {
            Ok(RateLimitDecision::Allowed) => {}
            Ok(RateLimitDecision::Limited) => {
                warn!(email = %email, "issuance rate limited");
                return Err(IssueError::RateLimited);
            }
            Err(err) => return Err(IssueError::Storage(err)),
        }

        let code = code::generate();
        let code_hash = hash::hash_code(code);
        self.store
            .put(&email, &code_hash, self.policy.ttl)
            .await
            .map_err(IssueError::Storage)?;

        info!(email = %email, "passcode issued");

        let message = EmailMessage {
            to: email,
            subject: "Your verification code".to_string(),
            body: format!("Your verification code is: {code}"),
        };
        self.sender
            .send(&message)
            .await
            .map_err(IssueError::Delivery)?;

        Ok(())
    }

    /// Check `submitted` against the active record for `email`.
    ///
    /// Unparseable input counts as a mismatch and consumes an attempt; the
    /// exhausting wrong attempt clears the record so only re-issuance can
    /// continue the flow.
    ///
    /// # Errors
    /// Only store backend failures; every expected result is a [`VerifyOutcome`].
    pub async fn verify(&self, email: &str, submitted: &str) -> Result<VerifyOutcome> {
        let email = normalize_email(email);

        let Some(record) = self.store.get(&email).await? else {
            return Ok(VerifyOutcome::Expired);
        };

        if record.attempts >= self.policy.max_attempts {
            // Rows written under an older, laxer policy; exhausted either way.
            self.store.clear(&email).await?;
            warn!(email = %email, "verification attempts exhausted");
            return Ok(VerifyOutcome::TooManyAttempts);
        }

        let matches = submitted
            .trim()
            .parse::<u32>()
            .map(|code| hash::digest_matches(&hash::hash_code(code), &record.code_hash))
            .unwrap_or(false);

        if matches {
            self.store.clear(&email).await?;
            info!(email = %email, "passcode verified");
            return Ok(VerifyOutcome::Verified);
        }

        let Some(attempts) = self.store.increment_attempts(&email).await? else {
            // The record raced away between get and increment.
            return Ok(VerifyOutcome::Expired);
        };

        if attempts >= self.policy.max_attempts {
            self.store.clear(&email).await?;
            warn!(email = %email, "verification attempts exhausted");
            return Ok(VerifyOutcome::TooManyAttempts);
        }

        Ok(VerifyOutcome::Invalid {
            attempts_remaining: self.policy.max_attempts - attempts,
        })
    }
}
