//! Upstream session pool.
//!
//! Maintains one authenticated session per `(client_index, dc_id)` pair,
//! serializing session creation per client so concurrent requests for the
//! same cold DC observe exactly one `start_session` call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::protocol_constants::{
    AUTH_IMPORT_IO_RETRY_SECS, AUTH_IMPORT_MAX_ATTEMPTS, AUTH_IMPORT_RETRY_SECS, PREWARM_DCS,
};

use super::client::UpstreamClient;
use super::types::SessionHandle;

/// Owns per-client session caches and the locks that serialize their
/// creation.
pub struct SessionPool {
    upstream: Arc<dyn UpstreamClient>,
    /// `(client_index, dc_id) -> session`.
    sessions: DashMap<(usize, u16), SessionHandle>,
    /// One creation lock per client, so concurrent cold starts on the same
    /// client serialize without blocking unrelated clients.
    creation_locks: Vec<AsyncMutex<()>>,
    /// Flipped once the background pre-warm pass has run to completion.
    /// Backs the `/ready` probe.
    prewarmed: AtomicBool,
    /// Applied to every session this pool starts; see
    /// [`UpstreamClient::start_session`].
    session_timeout_secs: u64,
    session_sleep_threshold_secs: u64,
}

impl SessionPool {
    pub fn new(
        upstream: Arc<dyn UpstreamClient>,
        session_timeout_secs: u64,
        session_sleep_threshold_secs: u64,
    ) -> Arc<Self> {
        let client_count = upstream.client_count();
        let pool = Arc::new(Self {
            upstream,
            sessions: DashMap::new(),
            creation_locks: (0..client_count).map(|_| AsyncMutex::new(())).collect(),
            prewarmed: AtomicBool::new(false),
            session_timeout_secs,
            session_sleep_threshold_secs,
        });
        pool.clone().spawn_prewarm();
        pool
    }

    /// Whether the background pre-warm pass has finished at least once.
    pub fn is_prewarmed(&self) -> bool {
        self.prewarmed.load(Ordering::Acquire)
    }

    /// Returns a ready session for `(client_index, dc_id)`, creating and
    /// caching one (with cross-DC auth import, if needed) on first use.
    pub async fn session_for(
        &self,
        client_index: usize,
        dc_id: u16,
    ) -> Result<SessionHandle, String> {
        if let Some(session) = self.sessions.get(&(client_index, dc_id)) {
            return Ok(*session);
        }

        let lock = self
            .creation_locks
            .get(client_index)
            .ok_or_else(|| format!("unknown client index {client_index}"))?;
        let _guard = lock.lock().await;

        // Re-check: another task may have created it while we waited.
        if let Some(session) = self.sessions.get(&(client_index, dc_id)) {
            return Ok(*session);
        }

        let session = self.create_session_with_retry(client_index, dc_id).await?;
        self.sessions.insert((client_index, dc_id), session);
        Ok(session)
    }

    async fn create_session_with_retry(
        &self,
        client_index: usize,
        dc_id: u16,
    ) -> Result<SessionHandle, String> {
        let mut last_error = None;
        for attempt in 0..AUTH_IMPORT_MAX_ATTEMPTS {
            match self
                .upstream
                .start_session(
                    client_index,
                    dc_id,
                    self.session_timeout_secs,
                    self.session_sleep_threshold_secs,
                )
                .await
            {
                Ok(session) => return Ok(session),
                Err(e) if is_auth_bytes_invalid(&e) => {
                    log::debug!(
                        "[Pool] AuthBytesInvalid for client {client_index} DC {dc_id}; retrying (attempt {attempt})"
                    );
                    tokio::time::sleep(Duration::from_secs_f64(AUTH_IMPORT_RETRY_SECS)).await;
                    last_error = Some(e);
                }
                Err(e) if is_transient_io(&e) => {
                    log::debug!(
                        "[Pool] transient I/O for client {client_index} DC {dc_id}; retrying (attempt {attempt})"
                    );
                    tokio::time::sleep(Duration::from_secs_f64(AUTH_IMPORT_IO_RETRY_SECS)).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| "session creation exhausted retries".to_string()))
    }

    /// Pre-warms sessions for the common DCs in the background, ignoring
    /// individual failures. Best-effort: a cold request still works, just
    /// pays the auth-import latency itself.
    fn spawn_prewarm(self: Arc<Self>) {
        tokio::spawn(async move {
            for client_index in 0..self.upstream.client_count() {
                let Some(home_dc) = self.upstream.home_dc(client_index) else {
                    continue;
                };
                for &dc in PREWARM_DCS {
                    if dc == home_dc {
                        continue;
                    }
                    if let Err(e) = self.session_for(client_index, dc).await {
                        log::debug!("[Pool] could not pre-warm client {client_index} DC {dc}: {e}");
                    }
                }
            }
            self.prewarmed.store(true, Ordering::Release);
        });
    }
}

/// Matches the upstream library's `AuthBytesInvalid` exception by message,
/// since the trait boundary carries plain strings rather than a typed error.
fn is_auth_bytes_invalid(err: &str) -> bool {
    err.contains("AuthBytesInvalid")
}

fn is_transient_io(err: &str) -> bool {
    err.contains("transient") || err.contains("OSError") || err.contains("timed out")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::test_fixtures::FakeUpstreamClient;

    #[tokio::test]
    async fn concurrent_session_for_calls_create_exactly_once() {
        let fake = Arc::new(FakeUpstreamClient::new(vec![1, 2]));
        let upstream: Arc<dyn UpstreamClient> = Arc::clone(&fake) as Arc<dyn UpstreamClient>;
        let pool = SessionPool::new(upstream, 30, 60);

        // Let the background pre-warm pass settle before the concurrent burst,
        // so it doesn't contend with the counter assertion below.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let before = fake.sessions_started.load(std::sync::atomic::Ordering::SeqCst);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move { pool.session_for(0, 9).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let after = fake.sessions_started.load(std::sync::atomic::Ordering::SeqCst);
        assert_eq!(after - before, 1, "DC 9 session should only be created once");
        assert!(pool.sessions.contains_key(&(0, 9)));
    }
}
