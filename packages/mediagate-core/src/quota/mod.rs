//! Token verification and bandwidth-quota accounting.
//!
//! The external account database is modeled as a [`TokenStore`] trait, with
//! an in-memory implementation provided as the default/test double —
//! mirroring how the upstream wire protocol is abstracted behind
//! [`crate::upstream::UpstreamClient`] rather than embedding a concrete
//! client in the pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::protocol_constants::{QUOTA_TRACK_INTERVAL_SECS, QUOTA_TRACK_STARTUP_GRACE_SECS};
use crate::stream::{StreamRegistry, StreamStatus};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Which cap a token has crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Daily,
    Monthly,
}

/// Result of comparing a token's usage against its configured limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaStatus {
    Ok,
    Exceeded(LimitKind),
}

/// Rolling usage counters for one token, in bytes.
#[derive(Debug, Clone, Default)]
pub struct UsageCounters {
    pub daily_bytes: u64,
    pub monthly_bytes: u64,
}

/// One token's limits and current usage, as loaded from the account
/// database.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub token: String,
    /// Daily cap in GiB; 0 means unlimited.
    pub daily_limit_gb: f64,
    /// Monthly cap in GiB; 0 means unlimited.
    pub monthly_limit_gb: f64,
    pub usage: UsageCounters,
}

impl TokenRecord {
    /// Checks daily usage before monthly, matching the admission order the
    /// reference implementation uses.
    pub fn quota_status(&self) -> QuotaStatus {
        if self.daily_limit_gb > 0.0 {
            let daily_gb = self.usage.daily_bytes as f64 / BYTES_PER_GIB;
            if daily_gb >= self.daily_limit_gb {
                return QuotaStatus::Exceeded(LimitKind::Daily);
            }
        }
        if self.monthly_limit_gb > 0.0 {
            let monthly_gb = self.usage.monthly_bytes as f64 / BYTES_PER_GIB;
            if monthly_gb >= self.monthly_limit_gb {
                return QuotaStatus::Exceeded(LimitKind::Monthly);
            }
        }
        QuotaStatus::Ok
    }
}

/// Result alias for store operations, keyed to a plain message string —
/// same rationale as [`crate::upstream::client::UpstreamResult`].
pub type StoreResult<T> = Result<T, String>;

/// Operations the gateway needs from the account database.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Loads a token's limits and current usage, or `None` if unknown.
    async fn get_api_token(&self, token: &str) -> StoreResult<Option<TokenRecord>>;

    /// Applies an incremental usage delta to both the daily and monthly
    /// counters. Idempotent increments; atomicity is the store's
    /// responsibility.
    async fn update_token_usage(&self, token: &str, delta_bytes: i64) -> StoreResult<()>;
}

/// Verifies a token exists. Does not gate on quota: per the streaming
/// surface's documented behavior, an already-exceeded token still streams —
/// enforcement happens only at new-request admission in front of this
/// gateway, not here.
pub async fn verify_token(
    store: &dyn TokenStore,
    token: &str,
) -> Result<TokenRecord, crate::error::GatewayError> {
    store
        .get_api_token(token)
        .await
        .map_err(crate::error::GatewayError::Internal)?
        .ok_or(crate::error::GatewayError::InvalidToken)
}

/// Periodically flushes a stream's delivered-byte delta to the token store.
///
/// Sleeps `QUOTA_TRACK_STARTUP_GRACE_SECS` before the first flush, then
/// flushes every `QUOTA_TRACK_INTERVAL_SECS` while the stream is active.
/// Performs one final flush covering the remaining bytes on the tick where
/// the stream is observed to have left the active state (or disappeared
/// from the registry entirely), then exits.
pub fn spawn_usage_tracker(
    store: Arc<dyn TokenStore>,
    registry: Arc<StreamRegistry>,
    token: String,
    stream_id: String,
) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(QUOTA_TRACK_STARTUP_GRACE_SECS)).await;

        let mut last_tracked: u64 = 0;
        loop {
            let Some(record) = registry.get(&stream_id) else {
                break;
            };

            let current = record.total_bytes();
            let delta = current.saturating_sub(last_tracked);
            if delta > 0 {
                match store.update_token_usage(&token, delta as i64).await {
                    Ok(()) => last_tracked = current,
                    Err(e) => log::warn!(
                        "[Quota] usage flush failed for stream {stream_id}: {e}"
                    ),
                }
            }

            if record.status() != StreamStatus::Active {
                break;
            }

            tokio::time::sleep(Duration::from_secs(QUOTA_TRACK_INTERVAL_SECS)).await;
        }
    });
}

/// In-memory [`TokenStore`], used as the default and in tests. Production
/// deployments are expected to supply a real database-backed implementation
/// at bootstrap.
#[derive(Default)]
pub struct InMemoryTokenStore {
    records: Mutex<HashMap<String, TokenRecord>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a token record.
    pub fn insert(&self, record: TokenRecord) {
        self.records.lock().insert(record.token.clone(), record);
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get_api_token(&self, token: &str) -> StoreResult<Option<TokenRecord>> {
        Ok(self.records.lock().get(token).cloned())
    }

    async fn update_token_usage(&self, token: &str, delta_bytes: i64) -> StoreResult<()> {
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(token) else {
            return Err(format!("unknown token {token}"));
        };
        record.usage.daily_bytes = record.usage.daily_bytes.saturating_add_signed(delta_bytes);
        record.usage.monthly_bytes = record.usage.monthly_bytes.saturating_add_signed(delta_bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamMeta;

    fn record(daily_gb: f64, monthly_gb: f64, daily_bytes: u64, monthly_bytes: u64) -> TokenRecord {
        TokenRecord {
            token: "tok".into(),
            daily_limit_gb: daily_gb,
            monthly_limit_gb: monthly_gb,
            usage: UsageCounters {
                daily_bytes,
                monthly_bytes,
            },
        }
    }

    #[test]
    fn unlimited_token_is_always_ok() {
        let r = record(0.0, 0.0, u64::MAX / 2, u64::MAX / 2);
        assert_eq!(r.quota_status(), QuotaStatus::Ok);
    }

    #[test]
    fn daily_limit_exceeded_takes_priority() {
        let one_gib = 1024u64 * 1024 * 1024;
        let r = record(1.0, 100.0, one_gib, one_gib);
        assert_eq!(r.quota_status(), QuotaStatus::Exceeded(LimitKind::Daily));
    }

    #[test]
    fn monthly_limit_checked_when_daily_is_clear() {
        let one_gib = 1024u64 * 1024 * 1024;
        let r = record(100.0, 1.0, 0, one_gib);
        assert_eq!(r.quota_status(), QuotaStatus::Exceeded(LimitKind::Monthly));
    }

    #[tokio::test]
    async fn verify_token_rejects_unknown_token() {
        let store = InMemoryTokenStore::new();
        let err = verify_token(&store, "nope").await.unwrap_err();
        assert!(matches!(err, crate::error::GatewayError::InvalidToken));
    }

    #[tokio::test]
    async fn verify_token_returns_record_even_when_exceeded() {
        let store = InMemoryTokenStore::new();
        store.insert(record(1.0, 1.0, u64::MAX / 2, u64::MAX / 2));
        let got = verify_token(&store, "tok").await.unwrap();
        assert_eq!(got.quota_status(), QuotaStatus::Exceeded(LimitKind::Daily));
    }

    /// Advances the paused clock and yields a few times so the background
    /// tracker task (on the same current-thread runtime) gets polled past
    /// its sleep before we inspect its effects.
    async fn advance_and_drive(duration: Duration) {
        tokio::time::advance(duration).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn usage_tracker_flushes_final_delta_on_completion() {
        let concrete = InMemoryTokenStore::new();
        concrete.insert(record(0.0, 0.0, 0, 0));
        let store: Arc<dyn TokenStore> = Arc::new(concrete);

        let registry = StreamRegistry::new();
        let rec = registry.create("s1".into(), 1, -1, 1, 0, 4, 3, 2, StreamMeta::default());
        rec.record_chunk(5 * 1024 * 1024);

        spawn_usage_tracker(
            Arc::clone(&store),
            Arc::clone(&registry),
            "tok".into(),
            "s1".into(),
        );

        // Let the tracker's startup grace elapse and the first flush happen.
        advance_and_drive(Duration::from_secs(QUOTA_TRACK_STARTUP_GRACE_SECS + 1)).await;
        registry.finish("s1", StreamStatus::Finished);
        advance_and_drive(Duration::from_secs(QUOTA_TRACK_INTERVAL_SECS + 1)).await;

        let got = store.get_api_token("tok").await.unwrap().unwrap();
        assert_eq!(got.usage.daily_bytes, 5 * 1024 * 1024);
    }
}
