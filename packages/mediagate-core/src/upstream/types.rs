//! Data types shared across the upstream session pool and chunk fetcher.

use serde::{Deserialize, Serialize};

/// Opaque handle the upstream wire protocol returns for a chunk-fetch
/// location (e.g. an `InputDocumentFileLocation`-equivalent). The gateway
/// never interprets its bytes; it is only round-tripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation(pub Vec<u8>);

/// Immutable description of one file as resolved from the upstream backend.
///
/// A `FileDescriptor` is only ever consumed together with a session bound to
/// its `dc_id` — the session pool enforces this pairing.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    /// Datacenter hosting the bytes.
    pub dc_id: u16,
    /// Total file size in bytes.
    pub size: u64,
    /// Content-addressable fingerprint; the first `SECURE_HASH_LEN` chars are
    /// used as the URL hash check.
    pub unique_id: String,
    /// Opaque location, passed verbatim to the chunk-fetch RPC.
    pub location: FileLocation,
    /// Original filename, if the upstream message carries one.
    pub file_name: Option<String>,
    /// MIME type, if known.
    pub mime_type: Option<String>,
}

/// Identifies one message within the upstream backend, as decoded from an
/// opaque gateway id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: i64,
    pub msg_id: i64,
}

/// An authenticated, long-lived logical connection to one datacenter, scoped
/// to one client identity.
///
/// Opaque to the gateway beyond its identity; the real session object (with
/// its socket, auth key, and framing state) lives behind the
/// [`UpstreamClient`](super::client::UpstreamClient) implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);
