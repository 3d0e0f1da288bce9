//! Hashed OTP records keyed by identity.
//!
//! Two backends honor the same contract: an in-process map for single-instance
//! deployments and a Postgres table shared across instances. Expiry is lazy in
//! both; a record past `expires_at` is reported as absent and never revived.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::Instrument;

#[derive(Debug, Clone)]
pub struct OtpRecord {
    /// SHA-256 digest of the issued code; the raw code is never at rest.
    pub code_hash: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    /// Failed verifications since the last issuance.
    pub attempts: u32,
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Overwrite any record for `identity` with a fresh one: zero attempts,
    /// expiry at `now + ttl`.
    async fn put(&self, identity: &str, code_hash: &[u8], ttl: Duration) -> Result<()>;

    /// Fetch the active record. `None` if never set, cleared, or expired.
    async fn get(&self, identity: &str) -> Result<Option<OtpRecord>>;

    /// Advance the attempt counter and return the new count, or `None` if the
    /// record is gone (cleared or expired since it was read).
    async fn increment_attempts(&self, identity: &str) -> Result<Option<u32>>;

    /// Remove the record.
    async fn clear(&self, identity: &str) -> Result<()>;
}

/// In-process store for single-instance deployments.
#[derive(Debug, Default)]
pub struct MemoryOtpStore {
    records: Mutex<HashMap<String, OtpRecord>>,
}

impl MemoryOtpStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn put(&self, identity: &str, code_hash: &[u8], ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl).context("OTP TTL out of range")?;
        let mut records = self.records.lock().await;
        let now = Utc::now();
        records.retain(|_, record| record.expires_at > now);
        records.insert(
            identity.to_string(),
            OtpRecord {
                code_hash: code_hash.to_vec(),
                expires_at: now + ttl,
                attempts: 0,
            },
        );
        Ok(())
    }

    async fn get(&self, identity: &str) -> Result<Option<OtpRecord>> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get(identity).cloned() else {
            return Ok(None);
        };
        if record.expires_at <= Utc::now() {
            records.remove(identity);
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn increment_attempts(&self, identity: &str) -> Result<Option<u32>> {
        let mut records = self.records.lock().await;
        let now = Utc::now();
        let expired = match records.get_mut(identity) {
            None => return Ok(None),
            Some(record) if record.expires_at <= now => true,
            Some(record) => {
                record.attempts += 1;
                return Ok(Some(record.attempts));
            }
        };
        if expired {
            records.remove(identity);
        }
        Ok(None)
    }

    async fn clear(&self, identity: &str) -> Result<()> {
        self.records.lock().await.remove(identity);
        Ok(())
    }
}

/// Shared store for multi-instance deployments; see `db/sql/01_konfirmo.sql`.
///
/// Every operation is a single statement, so per-key read-modify-write is
/// atomic inside Postgres and expiry is evaluated with the database clock.
#[derive(Debug, Clone)]
pub struct PgOtpStore {
    pool: PgPool,
}

impl PgOtpStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    async fn put(&self, identity: &str, code_hash: &[u8], ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let query = r"
            INSERT INTO otp_codes (email, code_hash, attempts, expires_at)
            VALUES ($1, $2, 0, NOW() + ($3 * INTERVAL '1 millisecond'))
            ON CONFLICT (email) DO UPDATE
            SET code_hash = EXCLUDED.code_hash,
                attempts = 0,
                expires_at = EXCLUDED.expires_at,
                created_at = NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(identity)
            .bind(code_hash)
            .bind(ttl_ms)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to store OTP record")?;
        Ok(())
    }

    async fn get(&self, identity: &str) -> Result<Option<OtpRecord>> {
        let query = r"
            SELECT code_hash, attempts, expires_at
            FROM otp_codes
            WHERE email = $1 AND expires_at > NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load OTP record")?;

        Ok(row.map(|row| {
            let attempts: i32 = row.get("attempts");
            OtpRecord {
                code_hash: row.get("code_hash"),
                expires_at: row.get("expires_at"),
                attempts: u32::try_from(attempts).unwrap_or(0),
            }
        }))
    }

    async fn increment_attempts(&self, identity: &str) -> Result<Option<u32>> {
        let query = r"
            UPDATE otp_codes
            SET attempts = attempts + 1
            WHERE email = $1 AND expires_at > NOW()
            RETURNING attempts
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to advance OTP attempt counter")?;

        Ok(row.map(|row| {
            let attempts: i32 = row.get("attempts");
            u32::try_from(attempts).unwrap_or(u32::MAX)
        }))
    }

    async fn clear(&self, identity: &str) -> Result<()> {
        let query = "DELETE FROM otp_codes WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(identity)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to clear OTP record")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::time::Duration;
    use tokio::time::sleep;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn put_then_get_round_trips() -> Result<()> {
        let store = MemoryOtpStore::new();
        store.put("a@example.com", &[1, 2, 3], TTL).await?;

        let record = store.get("a@example.com").await?.expect("record");
        assert_eq!(record.code_hash, vec![1, 2, 3]);
        assert_eq!(record.attempts, 0);
        assert!(record.expires_at > Utc::now());
        Ok(())
    }

    #[tokio::test]
    async fn get_absent_returns_none() -> Result<()> {
        let store = MemoryOtpStore::new();
        assert!(store.get("nobody@example.com").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn put_overwrites_and_resets_attempts() -> Result<()> {
        let store = MemoryOtpStore::new();
        store.put("a@example.com", &[1], TTL).await?;
        store.increment_attempts("a@example.com").await?;
        store.increment_attempts("a@example.com").await?;

        store.put("a@example.com", &[2], TTL).await?;
        let record = store.get("a@example.com").await?.expect("record");
        assert_eq!(record.code_hash, vec![2]);
        assert_eq!(record.attempts, 0);
        Ok(())
    }

    #[tokio::test]
    async fn expired_records_read_as_absent() -> Result<()> {
        let store = MemoryOtpStore::new();
        store
            .put("a@example.com", &[1], Duration::from_millis(20))
            .await?;
        sleep(Duration::from_millis(50)).await;

        assert!(store.get("a@example.com").await?.is_none());
        assert!(store.increment_attempts("a@example.com").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn increment_returns_new_count() -> Result<()> {
        let store = MemoryOtpStore::new();
        store.put("a@example.com", &[1], TTL).await?;

        assert_eq!(store.increment_attempts("a@example.com").await?, Some(1));
        assert_eq!(store.increment_attempts("a@example.com").await?, Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn increment_absent_is_none() -> Result<()> {
        let store = MemoryOtpStore::new();
        assert!(store.increment_attempts("a@example.com").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn clear_removes_the_record() -> Result<()> {
        let store = MemoryOtpStore::new();
        store.put("a@example.com", &[1], TTL).await?;
        store.clear("a@example.com").await?;
        assert!(store.get("a@example.com").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn identities_are_independent() -> Result<()> {
        let store = MemoryOtpStore::new();
        store.put("a@example.com", &[1], TTL).await?;
        store.put("b@example.com", &[2], TTL).await?;
        store.clear("a@example.com").await?;

        assert!(store.get("a@example.com").await?.is_none());
        assert!(store.get("b@example.com").await?.is_some());
        Ok(())
    }
}
