//! Stream registry: tracks active and recently-finished streams with
//! throughput telemetry.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::protocol_constants::{
    INSTANT_MBPS_CLAMP, RATE_WINDOW_SIZE, RECENT_STREAMS_CAPACITY, STREAM_PRUNE_GRACE_SECS,
};

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Terminal status of a finished stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Active,
    Cancelled,
    Error,
    Finished,
}

/// Caller-supplied identifying metadata, carried through for `/stream/stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamMeta {
    pub request_path: String,
    pub client_host: Option<String>,
}

struct MutableState {
    last_ts: f64,
    end_ts: Option<f64>,
    duration: Option<f64>,
    total_bytes: u64,
    instant_mbps: f64,
    avg_mbps: f64,
    peak_mbps: f64,
    status: StreamStatus,
    /// Rolling window of `(chunk_len, elapsed)` samples for the instant rate.
    rate_window: VecDeque<(u64, f64)>,
}

/// One entry in the active or recent stream table.
pub struct StreamRecord {
    pub stream_id: String,
    pub msg_id: i64,
    pub chat_id: i64,
    pub dc_id: u16,
    pub client_index: usize,
    pub start_ts: f64,
    pub part_count: u64,
    pub prefetch: usize,
    pub parallelism: usize,
    pub meta: StreamMeta,
    mutable: Mutex<MutableState>,
}

impl StreamRecord {
    fn new(
        stream_id: String,
        msg_id: i64,
        chat_id: i64,
        dc_id: u16,
        client_index: usize,
        part_count: u64,
        prefetch: usize,
        parallelism: usize,
        meta: StreamMeta,
    ) -> Self {
        let now = now_secs();
        Self {
            stream_id,
            msg_id,
            chat_id,
            dc_id,
            client_index,
            start_ts: now,
            part_count,
            prefetch,
            parallelism,
            meta,
            mutable: Mutex::new(MutableState {
                last_ts: now,
                end_ts: None,
                duration: None,
                total_bytes: 0,
                instant_mbps: 0.0,
                avg_mbps: 0.0,
                peak_mbps: 0.0,
                status: StreamStatus::Active,
                rate_window: VecDeque::with_capacity(RATE_WINDOW_SIZE),
            }),
        }
    }

    /// Records one delivered chunk and recomputes throughput figures.
    pub fn record_chunk(&self, chunk_len: u64) {
        let now = now_secs();
        let mut state = self.mutable.lock();

        let elapsed = (now - state.last_ts).max(1e-6);
        if state.rate_window.len() >= RATE_WINDOW_SIZE {
            state.rate_window.pop_front();
        }
        state.rate_window.push_back((chunk_len, elapsed));

        state.instant_mbps = if state.rate_window.len() >= 2 {
            let total_bytes: u64 = state.rate_window.iter().map(|(b, _)| b).sum();
            let total_time: f64 = state.rate_window.iter().map(|(_, t)| t).sum();
            ((total_bytes as f64 / (1024.0 * 1024.0)) / total_time.max(0.01))
                .min(INSTANT_MBPS_CLAMP)
        } else {
            0.0
        };

        state.total_bytes += chunk_len;
        state.last_ts = now;

        let total_time = (now - self.start_ts).max(1e-6);
        state.avg_mbps = (state.total_bytes as f64 / (1024.0 * 1024.0)) / total_time;
        state.peak_mbps = state.peak_mbps.max(state.instant_mbps);
    }

    /// Marks the stream terminal and stamps final duration/avg_mbps.
    fn finalize(&self, status: StreamStatus) {
        let mut state = self.mutable.lock();
        let end_ts = now_secs();
        let duration = (end_ts - self.start_ts).max(0.0);
        state.avg_mbps = (state.total_bytes as f64 / (1024.0 * 1024.0)) / duration.max(1e-6);
        state.end_ts = Some(end_ts);
        state.duration = Some(duration);
        state.status = status;
    }

    pub fn status(&self) -> StreamStatus {
        self.mutable.lock().status
    }

    pub fn last_ts(&self) -> f64 {
        self.mutable.lock().last_ts
    }

    pub fn total_bytes(&self) -> u64 {
        self.mutable.lock().total_bytes
    }

    pub fn to_active_json(&self) -> serde_json::Value {
        let state = self.mutable.lock();
        serde_json::json!({
            "stream_id": self.stream_id,
            "msg_id": self.msg_id,
            "chat_id": self.chat_id,
            "client_index": self.client_index,
            "dc_id": self.dc_id,
            "status": state.status,
            "total_bytes": state.total_bytes,
            "instant_mbps": round3(state.instant_mbps),
            "avg_mbps": round3(state.avg_mbps),
            "peak_mbps": round3(state.peak_mbps),
            "start_ts": self.start_ts,
        })
    }

    pub fn to_recent_json(&self) -> serde_json::Value {
        let state = self.mutable.lock();
        serde_json::json!({
            "stream_id": self.stream_id,
            "msg_id": self.msg_id,
            "chat_id": self.chat_id,
            "client_index": self.client_index,
            "dc_id": self.dc_id,
            "status": state.status,
            "total_bytes": state.total_bytes,
            "duration": state.duration,
            "avg_mbps": round3(state.avg_mbps),
            "start_ts": self.start_ts,
            "end_ts": state.end_ts,
        })
    }

    pub fn to_detail_json(&self) -> serde_json::Value {
        let state = self.mutable.lock();
        serde_json::json!({
            "stream_id": self.stream_id,
            "msg_id": self.msg_id,
            "chat_id": self.chat_id,
            "client_index": self.client_index,
            "dc_id": self.dc_id,
            "status": state.status,
            "total_bytes": state.total_bytes,
            "instant_mbps": round3(state.instant_mbps),
            "avg_mbps": round3(state.avg_mbps),
            "peak_mbps": round3(state.peak_mbps),
            "start_ts": self.start_ts,
            "end_ts": state.end_ts,
            "duration": state.duration,
            "part_count": self.part_count,
            "prefetch": self.prefetch,
            "parallelism": self.parallelism,
            "meta": {
                "request_path": self.meta.request_path,
                "client_host": self.meta.client_host,
            },
        })
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Process-wide registry of active and recently-finished streams.
pub struct StreamRegistry {
    active: DashMap<String, Arc<StreamRecord>>,
    recent: Mutex<VecDeque<Arc<StreamRecord>>>,
}

impl StreamRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: DashMap::new(),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_STREAMS_CAPACITY)),
        })
    }

    /// Creates and registers a new active stream record.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        stream_id: String,
        msg_id: i64,
        chat_id: i64,
        dc_id: u16,
        client_index: usize,
        part_count: u64,
        prefetch: usize,
        parallelism: usize,
        meta: StreamMeta,
    ) -> Arc<StreamRecord> {
        let record = Arc::new(StreamRecord::new(
            stream_id.clone(),
            msg_id,
            chat_id,
            dc_id,
            client_index,
            part_count,
            prefetch,
            parallelism,
            meta,
        ));
        self.active.insert(stream_id, Arc::clone(&record));
        record
    }

    /// Marks `stream_id` terminal and moves it straight into `recent`.
    ///
    /// Called from the pipeline's completion path, which always knows the
    /// final status immediately — the grace-period eviction in [`prune`]
    /// only matters for entries observed via `/stream/stats` before their
    /// owning pipeline has finished cleaning up.
    pub fn finish(&self, stream_id: &str, status: StreamStatus) {
        if let Some((_, record)) = self.active.remove(stream_id) {
            record.finalize(status);
            let mut recent = self.recent.lock();
            if recent.len() >= RECENT_STREAMS_CAPACITY {
                recent.pop_back();
            }
            recent.push_front(record);
        }
    }

    /// Looks up a stream by id, active first then recent.
    pub fn get(&self, stream_id: &str) -> Option<Arc<StreamRecord>> {
        if let Some(r) = self.active.get(stream_id) {
            return Some(Arc::clone(r.value()));
        }
        self.recent
            .lock()
            .iter()
            .find(|r| r.stream_id == stream_id)
            .cloned()
    }

    /// Evicts active entries that reached a terminal status at least
    /// [`STREAM_PRUNE_GRACE_SECS`] ago. A stream can only reach this path if
    /// something other than the pipeline's own `finish()` call marked it
    /// terminal right before the owning task observed the channel close —
    /// in practice this is a defensive backstop, not the primary path.
    pub fn prune(&self) {
        let now = now_secs();
        let stale: Vec<String> = self
            .active
            .iter()
            .filter(|r| {
                r.status() != StreamStatus::Active && now - r.last_ts() > STREAM_PRUNE_GRACE_SECS
            })
            .map(|r| r.stream_id.clone())
            .collect();

        for id in stale {
            if let Some((_, record)) = self.active.remove(&id) {
                let mut recent = self.recent.lock();
                if recent.len() >= RECENT_STREAMS_CAPACITY {
                    recent.pop_back();
                }
                recent.push_front(record);
            }
        }
    }

    pub fn active_snapshot(&self) -> Vec<Arc<StreamRecord>> {
        self.active.iter().map(|r| Arc::clone(r.value())).collect()
    }

    pub fn recent_snapshot(&self) -> Vec<Arc<StreamRecord>> {
        self.recent.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_chunk_accumulates_total_bytes() {
        let registry = StreamRegistry::new();
        let record = registry.create(
            "abc123".into(),
            1,
            -100,
            1,
            0,
            4,
            3,
            2,
            StreamMeta::default(),
        );
        record.record_chunk(1024);
        record.record_chunk(2048);
        assert_eq!(record.total_bytes(), 3072);
    }

    #[test]
    fn finish_moves_from_active_to_recent() {
        let registry = StreamRegistry::new();
        registry.create(
            "abc123".into(),
            1,
            -100,
            1,
            0,
            4,
            3,
            2,
            StreamMeta::default(),
        );
        assert!(registry.get("abc123").is_some());
        registry.finish("abc123", StreamStatus::Finished);
        assert_eq!(registry.active_snapshot().len(), 0);
        assert_eq!(registry.recent_snapshot().len(), 1);
        assert_eq!(registry.get("abc123").unwrap().status(), StreamStatus::Finished);
    }

    #[test]
    fn recent_deque_is_bounded() {
        let registry = StreamRegistry::new();
        for i in 0..(RECENT_STREAMS_CAPACITY + 2) {
            let id = format!("s{i}");
            registry.create(id.clone(), 1, -100, 1, 0, 1, 3, 2, StreamMeta::default());
            registry.finish(&id, StreamStatus::Finished);
        }
        assert_eq!(registry.recent_snapshot().len(), RECENT_STREAMS_CAPACITY);
    }
}
