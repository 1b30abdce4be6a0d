//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the upstream wire protocol and by the
//! historical behavior of the HTTP surface; changing them breaks byte-exact
//! compatibility with existing clients.

// ─────────────────────────────────────────────────────────────────────────────
// Chunking
// ─────────────────────────────────────────────────────────────────────────────

/// Upstream chunk-fetch alignment unit, in bytes.
///
/// All `Range` math is done relative to this boundary; it is not a tunable.
pub const CHUNK_SIZE: u64 = 1024 * 1024;

// File-property cache sweep interval is deployment-tunable, not fixed — see
// `Config::file_cache_clean_interval_secs` in `state.rs`.

// ─────────────────────────────────────────────────────────────────────────────
// Retry policy
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum attempts for a single chunk fetch before the stream fails.
pub const CHUNK_FETCH_MAX_ATTEMPTS: u32 = 4;

/// Backoff multiplier per attempt for chunk fetch retries (seconds).
///
/// Attempt N sleeps `N * CHUNK_FETCH_BACKOFF_SECS` before retrying.
pub const CHUNK_FETCH_BACKOFF_SECS: f64 = 0.15;

/// Maximum attempts for cross-DC authorization import.
pub const AUTH_IMPORT_MAX_ATTEMPTS: u32 = 6;

/// Backoff after an `AuthBytesInvalid`-equivalent failure (seconds).
pub const AUTH_IMPORT_RETRY_SECS: f64 = 0.5;

/// Backoff after a transient I/O failure during auth import (seconds).
pub const AUTH_IMPORT_IO_RETRY_SECS: f64 = 1.0;

// ─────────────────────────────────────────────────────────────────────────────
// Session lifecycle
// ─────────────────────────────────────────────────────────────────────────────
//
// Session I/O timeout and idle-sleep threshold are deployment-tunable, not
// fixed protocol constants — see `Config::session_timeout_secs` /
// `Config::session_sleep_threshold_secs` in `state.rs`.

/// Datacenters pre-warmed with a media session at startup.
///
/// These are the common datacenters seen across the client pool; pre-warming
/// avoids paying cross-DC auth-import latency on a cold first request.
pub const PREWARM_DCS: &[u16] = &[1, 2, 4, 5];

// ─────────────────────────────────────────────────────────────────────────────
// Stream registry
// ─────────────────────────────────────────────────────────────────────────────

/// Length of a generated stream id, in random bytes (hex-encoded to 16 chars).
pub const STREAM_ID_BYTES: usize = 8;

/// Number of samples kept in the instantaneous-throughput rolling window.
pub const RATE_WINDOW_SIZE: usize = 3;

/// Capacity of the `recent_streams` deque.
pub const RECENT_STREAMS_CAPACITY: usize = 3;

/// Grace period before a terminal stream is evicted from the active map
/// into `recent_streams` (seconds).
pub const STREAM_PRUNE_GRACE_SECS: f64 = 3.0;

/// Upper clamp applied to the instantaneous throughput estimate (MiB/s).
///
/// Guards against a divide-by-near-zero elapsed time producing an absurd
/// reading on the very first sample.
pub const INSTANT_MBPS_CLAMP: f64 = 1000.0;

// ─────────────────────────────────────────────────────────────────────────────
// Quota accounting
// ─────────────────────────────────────────────────────────────────────────────

/// Delay before the first quota-usage flush for a new stream (seconds).
pub const QUOTA_TRACK_STARTUP_GRACE_SECS: u64 = 2;

/// Interval between quota-usage flushes for an active stream (seconds).
pub const QUOTA_TRACK_INTERVAL_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP surface
// ─────────────────────────────────────────────────────────────────────────────

/// Bypass value for the hash-prefix check, for trusted internal callers.
pub const SKIP_HASH_CHECK: &str = "SKIP_HASH_CHECK";

/// Length of the `unique_id` prefix used as the URL security hash.
pub const SECURE_HASH_LEN: usize = 6;
