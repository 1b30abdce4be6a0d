//! Prefetch pipeline and stream telemetry registry.

pub mod pipeline;
pub mod registry;

pub use pipeline::{build_stream, PipelineParams};
pub use registry::{StreamMeta, StreamRecord, StreamRegistry, StreamStatus};
