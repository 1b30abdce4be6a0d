//! Trait abstraction over the upstream wire protocol.
//!
//! The real transport (session framing, auth key derivation, chunk-fetch
//! RPC) is supplied by a client library external to this crate. Services
//! here depend only on this trait, which keeps the pipeline, pool, and
//! fetcher testable against an in-memory fake.

use async_trait::async_trait;

use super::types::{FileDescriptor, FileLocation, MessageRef, SessionHandle};

/// Result alias for upstream operations, keyed to a plain message string.
///
/// Kept deliberately untyped (rather than a dedicated error enum) because
/// every failure path here is translated into a [`crate::error::GatewayError`]
/// one level up, with no behavior differentiated by upstream error kind
/// beyond the transient/non-transient split the retry helpers already make.
pub type UpstreamResult<T> = Result<T, String>;

/// Operations the gateway needs from the upstream wire protocol.
///
/// One concrete implementation is expected per deployment, wrapping the
/// actual client library; [`super::test_fixtures::FakeUpstreamClient`]
/// backs the test suite.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Resolves a chat/message pair to its file descriptor.
    ///
    /// Returns `Ok(None)` when the message exists but carries no media, or
    /// the message itself cannot be found.
    async fn resolve_file(
        &self,
        client_index: usize,
        msg: MessageRef,
    ) -> UpstreamResult<Option<FileDescriptor>>;

    /// Starts a media session for `client_index` on `dc_id`, performing
    /// cross-DC authorization import if `dc_id` is not the client's home DC.
    ///
    /// `timeout_secs`/`sleep_threshold_secs` are applied to the underlying
    /// session object the same way the reference client sets
    /// `session.timeout`/`session.sleep_threshold` right after construction,
    /// before starting it.
    ///
    /// Implementations are expected to cache the resulting session
    /// themselves; the pool only calls this once per `(client_index, dc_id)`
    /// under its per-client lock.
    async fn start_session(
        &self,
        client_index: usize,
        dc_id: u16,
        timeout_secs: u64,
        sleep_threshold_secs: u64,
    ) -> UpstreamResult<SessionHandle>;

    /// Fetches exactly one chunk. Returns `Ok(None)` when the upstream
    /// responds with an empty body (treated as fatal by the caller).
    async fn fetch_chunk(
        &self,
        session: SessionHandle,
        location: &FileLocation,
        offset: u64,
        limit: u32,
    ) -> UpstreamResult<Option<bytes::Bytes>>;

    /// Returns the home datacenter for `client_index`, as configured.
    fn home_dc(&self, client_index: usize) -> Option<u16>;

    /// Total number of client identities in the pool.
    fn client_count(&self) -> usize;
}
