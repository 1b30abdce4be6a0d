//! Mediagate Core - shared library for the media streaming gateway.
//!
//! This crate provides the core functionality of a gateway that re-exposes
//! remote media stored behind a chat-messaging backend as standard HTTP byte
//! streams: an authenticated session pool, a chunked-range-to-stream
//! pipeline, per-stream telemetry, and token quota accounting. It is
//! designed to be consumed by a standalone headless server binary.
//!
//! # Architecture
//!
//! - [`upstream`]: session pool, client selection, chunk fetcher, file cache
//! - [`stream`]: the prefetch pipeline and the stream telemetry registry
//! - [`quota`]: token verification and bandwidth accounting
//! - [`id_codec`]: opaque-id decoding for the download surface
//! - [`range`]: HTTP `Range` header parsing and chunk-plan derivation
//! - [`state`]: core configuration types
//! - [`error`]: centralized error type with HTTP mapping
//! - [`bootstrap`]: composition root wiring every service together
//! - [`api`]: the HTTP layer (router, handlers, server startup)

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod error;
pub mod id_codec;
pub mod protocol_constants;
pub mod quota;
pub mod range;
pub mod state;
pub mod stream;
pub mod upstream;

pub use api::{start_server, AppState, AppStateBuilder, ServerError};
pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use error::{GatewayError, GatewayResult};
pub use id_codec::{Base64IdCodec, IdCodec};
pub use quota::{InMemoryTokenStore, QuotaStatus, TokenRecord, TokenStore};
pub use state::{Config, PipelineConfig};
pub use stream::{StreamRecord, StreamRegistry, StreamStatus};
pub use upstream::{FileCache, SessionPool, UpstreamClient, WorkloadTable};
