//! Single-chunk fetch with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::protocol_constants::{CHUNK_FETCH_BACKOFF_SECS, CHUNK_FETCH_MAX_ATTEMPTS, CHUNK_SIZE};

use super::client::UpstreamClient;
use super::types::{FileLocation, SessionHandle};

/// Fetches one chunk at `offset`, retrying transient failures up to
/// `CHUNK_FETCH_MAX_ATTEMPTS` times with linear backoff.
///
/// Returns `None` once retries are exhausted or the upstream returns an
/// empty body; the caller treats either as a fatal pipeline error.
pub async fn fetch_chunk_with_retries(
    upstream: &dyn UpstreamClient,
    session: SessionHandle,
    location: &FileLocation,
    seq: u64,
    offset: u64,
    stop: &CancellationToken,
) -> Option<Bytes> {
    let mut tries = 0;
    while tries < CHUNK_FETCH_MAX_ATTEMPTS && !stop.is_cancelled() {
        match upstream
            .fetch_chunk(session, location, offset, CHUNK_SIZE as u32)
            .await
        {
            Ok(Some(bytes)) => return Some(bytes),
            Ok(None) => {
                log::error!("[Fetcher] chunk fetch returned empty body seq={seq} offset={offset}");
                return None;
            }
            Err(e) => {
                tries += 1;
                log::debug!(
                    "[Fetcher] fetch error seq={seq} offset={offset} try={tries} err={e}"
                );
                tokio::time::sleep(Duration::from_secs_f64(
                    CHUNK_FETCH_BACKOFF_SECS * tries as f64,
                ))
                .await;
            }
        }
    }

    log::error!("[Fetcher] failed to fetch chunk seq={seq} offset={offset} after retries");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::test_fixtures::FakeUpstreamClient;
    use crate::upstream::types::MessageRef;

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let msg = MessageRef {
            chat_id: -1,
            msg_id: 1,
        };
        let upstream = FakeUpstreamClient::new(vec![1]).with_file(
            msg,
            1,
            "abcdef",
            Bytes::from(vec![7u8; 16]),
        );
        upstream
            .fail_first_n_fetches
            .store(2, std::sync::atomic::Ordering::SeqCst);

        let session = upstream.start_session(0, 1, 30, 60).await.unwrap();
        let stop = CancellationToken::new();
        let result = fetch_chunk_with_retries(
            &upstream,
            session,
            &FileLocation(vec![]),
            0,
            0,
            &stop,
        )
        .await;
        assert_eq!(result.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_none() {
        let msg = MessageRef {
            chat_id: -1,
            msg_id: 1,
        };
        let upstream = FakeUpstreamClient::new(vec![1]).with_file(
            msg,
            1,
            "abcdef",
            Bytes::from(vec![7u8; 16]),
        );
        upstream
            .fail_first_n_fetches
            .store(CHUNK_FETCH_MAX_ATTEMPTS as u64, std::sync::atomic::Ordering::SeqCst);

        let session = upstream.start_session(0, 1, 30, 60).await.unwrap();
        let stop = CancellationToken::new();
        let result = fetch_chunk_with_retries(
            &upstream,
            session,
            &FileLocation(vec![]),
            0,
            0,
            &stop,
        )
        .await;
        assert!(result.is_none());
    }
}
