//! In-memory fake of [`UpstreamClient`] used by the pipeline, pool, and
//! selector test suites.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::client::{UpstreamClient, UpstreamResult};
use super::types::{FileDescriptor, FileLocation, MessageRef, SessionHandle};

struct FakeFile {
    msg: MessageRef,
    descriptor: FileDescriptor,
    data: Bytes,
}

/// A fake upstream backed by an in-memory file, for deterministic tests.
pub struct FakeUpstreamClient {
    home_dcs: Vec<u16>,
    file: Mutex<Option<FakeFile>>,
    session_counter: AtomicU64,
    /// When set, the next N `fetch_chunk` calls fail, to exercise the
    /// fetcher's retry path.
    pub fail_first_n_fetches: AtomicU64,
    pub sessions_started: AtomicU64,
}

impl FakeUpstreamClient {
    pub fn new(home_dcs: Vec<u16>) -> Self {
        Self {
            home_dcs,
            file: Mutex::new(None),
            session_counter: AtomicU64::new(0),
            fail_first_n_fetches: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
        }
    }

    /// Registers a fake file, so `resolve_file` returns a matching descriptor.
    pub fn with_file(self, msg: MessageRef, dc_id: u16, unique_id: &str, data: Bytes) -> Self {
        let descriptor = FileDescriptor {
            dc_id,
            size: data.len() as u64,
            unique_id: unique_id.to_string(),
            location: FileLocation(b"fake-location".to_vec()),
            file_name: Some("movie.mkv".to_string()),
            mime_type: Some("video/x-matroska".to_string()),
        };
        *self.file.lock().unwrap() = Some(FakeFile {
            msg,
            descriptor,
            data,
        });
        self
    }
}

#[async_trait]
impl UpstreamClient for FakeUpstreamClient {
    async fn resolve_file(
        &self,
        _client_index: usize,
        msg: MessageRef,
    ) -> UpstreamResult<Option<FileDescriptor>> {
        let guard = self.file.lock().unwrap();
        Ok(guard
            .as_ref()
            .filter(|f| f.msg == msg)
            .map(|f| f.descriptor.clone()))
    }

    async fn start_session(
        &self,
        _client_index: usize,
        _dc_id: u16,
        _timeout_secs: u64,
        _sleep_threshold_secs: u64,
    ) -> UpstreamResult<SessionHandle> {
        self.sessions_started.fetch_add(1, Ordering::SeqCst);
        let id = self.session_counter.fetch_add(1, Ordering::SeqCst);
        Ok(SessionHandle(id))
    }

    async fn fetch_chunk(
        &self,
        _session: SessionHandle,
        _location: &FileLocation,
        offset: u64,
        limit: u32,
    ) -> UpstreamResult<Option<Bytes>> {
        let remaining = self.fail_first_n_fetches.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first_n_fetches.fetch_sub(1, Ordering::SeqCst);
            return Err("simulated transient failure".to_string());
        }

        let guard = self.file.lock().unwrap();
        let file = guard.as_ref().ok_or("no file registered")?;
        let start = offset as usize;
        if start >= file.data.len() {
            return Ok(Some(Bytes::new()));
        }
        let end = (start + limit as usize).min(file.data.len());
        Ok(Some(file.data.slice(start..end)))
    }

    fn home_dc(&self, client_index: usize) -> Option<u16> {
        self.home_dcs.get(client_index).copied()
    }

    fn client_count(&self) -> usize {
        self.home_dcs.len()
    }
}
