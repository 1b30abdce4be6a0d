//! Upstream wire-protocol abstraction: session pool, client selection,
//! chunk fetching, and file-property caching.

pub mod client;
pub mod fetcher;
pub mod file_cache;
pub mod pool;
pub mod selector;
#[cfg(test)]
pub mod test_fixtures;
pub mod types;
pub mod workload;

pub use client::UpstreamClient;
pub use file_cache::FileCache;
pub use pool::SessionPool;
pub use types::{FileDescriptor, FileLocation, MessageRef, SessionHandle};
pub use workload::{WorkloadGuard, WorkloadTable};
