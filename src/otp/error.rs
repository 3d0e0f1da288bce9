//! Issuance errors and verification outcomes.
//!
//! Issuance failures are errors: nothing was delivered, and the variants tell
//! the transport layer which status to return and whether a pending code still
//! exists (`Delivery` means the store already committed one). Verification
//! results other than storage failures are expected outcomes, not errors, so
//! they live in [`VerifyOutcome`] rather than an error enum.

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("rate limited")]
    RateLimited,
    /// Store or limiter backend failure; no code was issued.
    #[error("storage unavailable: {0}")]
    Storage(#[source] anyhow::Error),
    /// Delivery failed after the record was committed; the pending code is
    /// unusable by the recipient and a re-issue overwrites it.
    #[error("delivery failed: {0}")]
    Delivery(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Code matched; the record has been cleared.
    Verified,
    /// Code did not match; the attempt counter was advanced.
    Invalid { attempts_remaining: u32 },
    /// No active code for this identity (never issued, consumed, or past TTL).
    Expired,
    /// Attempt ceiling reached; the record has been cleared to force re-issuance.
    TooManyAttempts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_error_messages_are_user_safe() {
        assert_eq!(IssueError::InvalidEmail.to_string(), "invalid email address");
        assert_eq!(IssueError::RateLimited.to_string(), "rate limited");
        let storage = IssueError::Storage(anyhow::anyhow!("pool exhausted"));
        assert!(storage.to_string().starts_with("storage unavailable"));
        let delivery = IssueError::Delivery(anyhow::anyhow!("upstream 500"));
        assert!(delivery.to_string().starts_with("delivery failed"));
    }

    #[test]
    fn verify_outcome_carries_remaining_attempts() {
        let outcome = VerifyOutcome::Invalid {
            attempts_remaining: 3,
        };
        assert_eq!(
            outcome,
            VerifyOutcome::Invalid {
                attempts_remaining: 3
            }
        );
        assert_ne!(outcome, VerifyOutcome::Expired);
    }
}
