//! Placeholder [`UpstreamClient`] wired into the binary until a real
//! wire-protocol client library is linked in.
//!
//! This crate's core deliberately has no concrete implementation of the
//! upstream chat-backend protocol — that lives in a client library specific
//! to the deployment's account pool and is supplied by whoever assembles the
//! final binary. This stub keeps `main.rs` runnable (it serves `/health` and
//! rejects every file-bearing request cleanly) so the HTTP surface, routing,
//! and graceful-shutdown path can be exercised before that client is wired
//! in.

use async_trait::async_trait;
use bytes::Bytes;
use mediagate_core::upstream::client::{UpstreamClient, UpstreamResult};
use mediagate_core::upstream::types::{FileDescriptor, FileLocation, MessageRef, SessionHandle};

pub struct UnconfiguredUpstreamClient {
    home_dcs: Vec<u16>,
}

impl UnconfiguredUpstreamClient {
    pub fn new(client_dc_map: &std::collections::HashMap<usize, u16>) -> Self {
        let count = client_dc_map.keys().max().map(|m| m + 1).unwrap_or(0);
        let mut home_dcs = vec![0u16; count];
        for (&idx, &dc) in client_dc_map {
            home_dcs[idx] = dc;
        }
        Self { home_dcs }
    }
}

#[async_trait]
impl UpstreamClient for UnconfiguredUpstreamClient {
    async fn resolve_file(
        &self,
        _client_index: usize,
        _msg: MessageRef,
    ) -> UpstreamResult<Option<FileDescriptor>> {
        Err("no upstream client configured for this deployment".to_string())
    }

    async fn start_session(
        &self,
        _client_index: usize,
        _dc_id: u16,
        _timeout_secs: u64,
        _sleep_threshold_secs: u64,
    ) -> UpstreamResult<SessionHandle> {
        Err("no upstream client configured for this deployment".to_string())
    }

    async fn fetch_chunk(
        &self,
        _session: SessionHandle,
        _location: &FileLocation,
        _offset: u64,
        _limit: u32,
    ) -> UpstreamResult<Option<Bytes>> {
        Err("no upstream client configured for this deployment".to_string())
    }

    fn home_dc(&self, client_index: usize) -> Option<u16> {
        self.home_dcs.get(client_index).copied()
    }

    fn client_count(&self) -> usize {
        self.home_dcs.len()
    }
}
