//! File-property cache.
//!
//! Resolves `(chat_id, msg_id)` to a [`FileDescriptor`], caching hits per
//! client index and clearing the whole cache on a coarse timer. Staleness
//! after a clear is tolerated: the next lookup simply re-resolves.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::interval;

use crate::error::{GatewayError, GatewayResult};

use super::client::UpstreamClient;
use super::types::{FileDescriptor, MessageRef};

/// Caches resolved file descriptors per client index.
pub struct FileCache {
    upstream: Arc<dyn UpstreamClient>,
    entries: DashMap<(usize, MessageRef), FileDescriptor>,
}

impl FileCache {
    /// `clean_interval_secs` is the deployment-configured sweep interval;
    /// see `Config::file_cache_clean_interval_secs`.
    pub fn new(upstream: Arc<dyn UpstreamClient>, clean_interval_secs: u64) -> Arc<Self> {
        let cache = Arc::new(Self {
            upstream,
            entries: DashMap::new(),
        });
        cache.clone().spawn_cleaner(clean_interval_secs);
        cache
    }

    /// Resolves a message to its file descriptor, using the cache when
    /// possible.
    pub async fn get_file(
        &self,
        client_index: usize,
        msg: MessageRef,
    ) -> GatewayResult<FileDescriptor> {
        if let Some(entry) = self.entries.get(&(client_index, msg)) {
            return Ok(entry.clone());
        }

        let resolved = self
            .upstream
            .resolve_file(client_index, msg)
            .await
            .map_err(GatewayError::UpstreamFetchFailure)?;

        let descriptor = resolved.ok_or_else(|| {
            GatewayError::FileNotFound(format!("message {} not found", msg.msg_id))
        })?;

        self.entries.insert((client_index, msg), descriptor.clone());
        Ok(descriptor)
    }

    fn spawn_cleaner(self: Arc<Self>, clean_interval_secs: u64) {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(clean_interval_secs.max(1)));
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                self.entries.clear();
                log::debug!("[FileCache] cleared file-property cache");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::test_fixtures::FakeUpstreamClient;
    use bytes::Bytes;

    #[tokio::test]
    async fn caches_resolved_file_on_second_call() {
        let msg = MessageRef {
            chat_id: -100,
            msg_id: 42,
        };
        let upstream: Arc<dyn UpstreamClient> = Arc::new(
            FakeUpstreamClient::new(vec![1]).with_file(msg, 1, "abcdef", Bytes::from_static(b"hi")),
        );
        let cache = FileCache::new(upstream, 1800);

        let first = cache.get_file(0, msg).await.unwrap();
        let second = cache.get_file(0, msg).await.unwrap();
        assert_eq!(first.unique_id, second.unique_id);
    }

    #[tokio::test]
    async fn unknown_message_is_not_found() {
        let upstream: Arc<dyn UpstreamClient> = Arc::new(FakeUpstreamClient::new(vec![1]));
        let cache = FileCache::new(upstream, 1800);

        let err = cache
            .get_file(
                0,
                MessageRef {
                    chat_id: -100,
                    msg_id: 1,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::FileNotFound(_)));
    }
}
