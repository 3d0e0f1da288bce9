//! End-to-end OTP lifecycle tests over the in-memory backends.
//!
//! The capturing sender plays the recipient's mailbox: it records every
//! outbound message so tests can read back the code that was actually issued.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use konfirmo::api::email::{EmailMessage, EmailSender};
use konfirmo::otp::rate_limit::{MemoryRateLimiter, RateLimitConfig};
use konfirmo::otp::store::{MemoryOtpStore, OtpStore};
use konfirmo::otp::{IssueError, OtpPolicy, OtpService, VerifyOutcome};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

const EMAIL: &str = "user@example.com";

#[derive(Default)]
struct CapturingSender {
    messages: Mutex<Vec<EmailMessage>>,
}

impl CapturingSender {
    fn last_code(&self) -> Result<String> {
        let messages = self
            .messages
            .lock()
            .map_err(|_| anyhow!("sender lock poisoned"))?;
        let body = &messages.last().ok_or_else(|| anyhow!("no message sent"))?.body;
        body.rsplit(' ')
            .next()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("empty message body"))
    }

    fn sent_count(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EmailSender for CapturingSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_| anyhow!("sender lock poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

/// Captures the message, then reports the provider as down.
#[derive(Default)]
struct CapturingFailingSender {
    inner: CapturingSender,
}

#[async_trait]
impl EmailSender for CapturingFailingSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.inner.send(message).await?;
        bail!("provider unreachable")
    }
}

fn harness(
    sender: Arc<dyn EmailSender>,
    policy: OtpPolicy,
    rate_config: RateLimitConfig,
) -> (OtpService, Arc<MemoryOtpStore>) {
    let store = Arc::new(MemoryOtpStore::new());
    let limiter = Arc::new(MemoryRateLimiter::new(rate_config));
    (
        OtpService::new(store.clone(), limiter, sender, policy),
        store,
    )
}

fn relaxed_rate() -> RateLimitConfig {
    RateLimitConfig::new().with_max_requests(100)
}

#[tokio::test]
async fn issue_then_verify_succeeds_exactly_once() -> Result<()> {
    let sender = Arc::new(CapturingSender::default());
    let (service, _store) = harness(sender.clone(), OtpPolicy::new(), relaxed_rate());

    service.issue(EMAIL).await.map_err(|e| anyhow!(e))?;
    let code = sender.last_code()?;

    assert_eq!(service.verify(EMAIL, &code).await?, VerifyOutcome::Verified);
    // The code was consumed; replaying it finds no active record.
    assert_eq!(service.verify(EMAIL, &code).await?, VerifyOutcome::Expired);
    Ok(())
}

#[tokio::test]
async fn wrong_code_counts_down_then_correct_code_verifies() -> Result<()> {
    let sender = Arc::new(CapturingSender::default());
    let (service, _store) = harness(sender.clone(), OtpPolicy::new(), relaxed_rate());

    service.issue(EMAIL).await.map_err(|e| anyhow!(e))?;
    let code = sender.last_code()?;
    let wrong = if code == "100000" { "100001" } else { "100000" };

    assert_eq!(
        service.verify(EMAIL, wrong).await?,
        VerifyOutcome::Invalid {
            attempts_remaining: 3
        }
    );
    assert_eq!(service.verify(EMAIL, &code).await?, VerifyOutcome::Verified);
    Ok(())
}

#[tokio::test]
async fn attempt_ceiling_invalidates_the_record() -> Result<()> {
    let sender = Arc::new(CapturingSender::default());
    let (service, store) = harness(sender.clone(), OtpPolicy::new(), relaxed_rate());

    service.issue(EMAIL).await.map_err(|e| anyhow!(e))?;
    let code = sender.last_code()?;
    let wrong = if code == "100000" { "100001" } else { "100000" };

    for remaining in [3, 2, 1] {
        assert_eq!(
            service.verify(EMAIL, wrong).await?,
            VerifyOutcome::Invalid {
                attempts_remaining: remaining
            }
        );
    }

    // The exhausting wrong attempt reports the ceiling and clears the record.
    assert_eq!(
        service.verify(EMAIL, wrong).await?,
        VerifyOutcome::TooManyAttempts
    );
    assert!(store.get(EMAIL).await?.is_none());

    // Even the originally-correct code is dead now.
    assert_eq!(service.verify(EMAIL, &code).await?, VerifyOutcome::Expired);
    Ok(())
}

#[tokio::test]
async fn expired_code_never_verifies() -> Result<()> {
    let sender = Arc::new(CapturingSender::default());
    let (service, _store) = harness(
        sender.clone(),
        OtpPolicy::new().with_ttl(Duration::from_millis(30)),
        relaxed_rate(),
    );

    service.issue(EMAIL).await.map_err(|e| anyhow!(e))?;
    let code = sender.last_code()?;

    sleep(Duration::from_millis(60)).await;
    assert_eq!(service.verify(EMAIL, &code).await?, VerifyOutcome::Expired);
    Ok(())
}

#[tokio::test]
async fn issuance_rate_limit_denies_then_recovers() -> Result<()> {
    let sender = Arc::new(CapturingSender::default());
    let (service, _store) = harness(
        sender.clone(),
        OtpPolicy::new(),
        RateLimitConfig::new()
            .with_max_requests(2)
            .with_window(Duration::from_millis(80)),
    );

    service.issue(EMAIL).await.map_err(|e| anyhow!(e))?;
    service.issue(EMAIL).await.map_err(|e| anyhow!(e))?;
    assert!(matches!(
        service.issue(EMAIL).await,
        Err(IssueError::RateLimited)
    ));
    assert_eq!(sender.sent_count(), 2);

    sleep(Duration::from_millis(120)).await;
    service.issue(EMAIL).await.map_err(|e| anyhow!(e))?;
    assert_eq!(sender.sent_count(), 3);
    Ok(())
}

#[tokio::test]
async fn rate_limited_issuance_keeps_the_pending_code() -> Result<()> {
    let sender = Arc::new(CapturingSender::default());
    let (service, _store) = harness(
        sender.clone(),
        OtpPolicy::new(),
        RateLimitConfig::new().with_max_requests(1),
    );

    service.issue(EMAIL).await.map_err(|e| anyhow!(e))?;
    let code = sender.last_code()?;

    assert!(matches!(
        service.issue(EMAIL).await,
        Err(IssueError::RateLimited)
    ));

    // The denial left the first record untouched.
    assert_eq!(service.verify(EMAIL, &code).await?, VerifyOutcome::Verified);
    Ok(())
}

#[tokio::test]
async fn delivery_failure_leaves_a_verifiable_record() -> Result<()> {
    let sender = Arc::new(CapturingFailingSender::default());
    let (service, store) = harness(sender.clone(), OtpPolicy::new(), relaxed_rate());

    assert!(matches!(
        service.issue(EMAIL).await,
        Err(IssueError::Delivery(_))
    ));

    // The record committed before delivery was attempted.
    assert!(store.get(EMAIL).await?.is_some());
    let code = sender.inner.last_code()?;
    assert_eq!(service.verify(EMAIL, &code).await?, VerifyOutcome::Verified);
    Ok(())
}

#[tokio::test]
async fn unparseable_code_consumes_an_attempt() -> Result<()> {
    let sender = Arc::new(CapturingSender::default());
    let (service, _store) = harness(sender.clone(), OtpPolicy::new(), relaxed_rate());

    service.issue(EMAIL).await.map_err(|e| anyhow!(e))?;

    assert_eq!(
        service.verify(EMAIL, "not-a-code").await?,
        VerifyOutcome::Invalid {
            attempts_remaining: 3
        }
    );
    Ok(())
}

#[tokio::test]
async fn full_lifecycle_walks_through_the_store() -> Result<()> {
    let sender = Arc::new(CapturingSender::default());
    let (service, store) = harness(sender.clone(), OtpPolicy::new(), relaxed_rate());

    service.issue(EMAIL).await.map_err(|e| anyhow!(e))?;

    let record = store.get(EMAIL).await?.ok_or_else(|| anyhow!("no record"))?;
    assert_eq!(record.attempts, 0);
    let ttl_left = record.expires_at - Utc::now();
    assert!(ttl_left.num_seconds() > 55 && ttl_left.num_seconds() <= 60);

    let code = sender.last_code()?;
    let wrong = if code == "100000" { "100001" } else { "100000" };

    assert_eq!(
        service.verify(EMAIL, wrong).await?,
        VerifyOutcome::Invalid {
            attempts_remaining: 3
        }
    );
    assert_eq!(
        store
            .get(EMAIL)
            .await?
            .ok_or_else(|| anyhow!("no record"))?
            .attempts,
        1
    );

    assert_eq!(service.verify(EMAIL, &code).await?, VerifyOutcome::Verified);
    assert!(store.get(EMAIL).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn reissue_overwrites_the_previous_code() -> Result<()> {
    let sender = Arc::new(CapturingSender::default());
    let (service, _store) = harness(sender.clone(), OtpPolicy::new(), relaxed_rate());

    service.issue(EMAIL).await.map_err(|e| anyhow!(e))?;
    let first = sender.last_code()?;

    // Burn an attempt, then re-issue; the counter and code both reset.
    let wrong = if first == "100000" { "100001" } else { "100000" };
    service.verify(EMAIL, wrong).await?;

    service.issue(EMAIL).await.map_err(|e| anyhow!(e))?;
    let second = sender.last_code()?;

    if first != second {
        assert_eq!(service.verify(EMAIL, &first).await?, VerifyOutcome::Invalid {
            attempts_remaining: 3
        });
    }
    assert_eq!(
        service.verify(EMAIL, &second).await?,
        VerifyOutcome::Verified
    );
    Ok(())
}
