//! Fixed-window issuance rate limiting, independent of OTP state.
//!
//! Fixed-window counting trades precision for O(1) memory per identity, which
//! is all the coarse throttling an OTP endpoint needs. A backend failure is
//! surfaced as an error so callers can fail closed instead of silently
//! allowing traffic through.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::Instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    max_requests: u32,
    window: Duration,
}

impl RateLimitConfig {
    /// Default policy: 3 issuance requests per 10-minute window.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_requests: 3,
            window: Duration::from_secs(10 * 60),
        }
    }

    #[must_use]
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record a request for `identity` and decide whether it may proceed.
    async fn check(&self, identity: &str) -> Result<RateLimitDecision>;
}

/// Limiter that allows everything; used in tests and handler wiring stubs.
#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn check(&self, _identity: &str) -> Result<RateLimitDecision> {
        Ok(RateLimitDecision::Allowed)
    }
}

#[derive(Debug)]
struct Window {
    count: u32,
    started_at: Instant,
}

/// In-process fixed-window limiter for single-instance deployments.
///
/// Stale windows are harmless (bounded by identity cardinality) and get reset
/// in place on the next request after the window elapses.
#[derive(Debug)]
pub struct MemoryRateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryRateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, identity: &str) -> Result<RateLimitDecision> {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();

        match windows.entry(identity.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(Window {
                    count: 1,
                    started_at: now,
                });
                Ok(RateLimitDecision::Allowed)
            }
            Entry::Occupied(mut entry) => {
                let window = entry.get_mut();
                if now.duration_since(window.started_at) > self.config.window {
                    window.count = 1;
                    window.started_at = now;
                    return Ok(RateLimitDecision::Allowed);
                }
                if window.count >= self.config.max_requests {
                    // Denied requests do not extend or mutate the window.
                    return Ok(RateLimitDecision::Limited);
                }
                window.count += 1;
                Ok(RateLimitDecision::Allowed)
            }
        }
    }
}

/// Shared fixed-window limiter; synchronizes limits across service instances
/// through a single upsert per request (see `db/sql/01_konfirmo.sql`).
///
/// The counter keeps rising past the ceiling within a window, which decides
/// identically to check-then-increment while staying one atomic statement.
#[derive(Debug, Clone)]
pub struct PgRateLimiter {
    pool: PgPool,
    config: RateLimitConfig,
}

impl PgRateLimiter {
    #[must_use]
    pub fn new(pool: PgPool, config: RateLimitConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl RateLimiter for PgRateLimiter {
    async fn check(&self, identity: &str) -> Result<RateLimitDecision> {
        let window_ms = i64::try_from(self.config.window.as_millis()).unwrap_or(i64::MAX);
        let query = r"
            INSERT INTO otp_requests (email, count, window_start)
            VALUES ($1, 1, NOW())
            ON CONFLICT (email) DO UPDATE
            SET count = CASE
                    WHEN otp_requests.window_start <= NOW() - ($2 * INTERVAL '1 millisecond')
                    THEN 1
                    ELSE otp_requests.count + 1
                END,
                window_start = CASE
                    WHEN otp_requests.window_start <= NOW() - ($2 * INTERVAL '1 millisecond')
                    THEN NOW()
                    ELSE otp_requests.window_start
                END
            RETURNING count
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identity)
            .bind(window_ms)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to record issuance request")?;

        let count: i32 = row.get("count");
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        if count <= self.config.max_requests {
            Ok(RateLimitDecision::Allowed)
        } else {
            Ok(RateLimitDecision::Limited)
        }
    }
}
