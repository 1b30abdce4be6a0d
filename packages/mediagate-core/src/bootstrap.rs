//! Application bootstrap and dependency wiring.
//!
//! The composition root: the single place where the session pool, file
//! cache, stream registry, and quota manager are instantiated and wired
//! together, consumed by `AppState` to build the HTTP layer.

use std::sync::Arc;

use crate::id_codec::{Base64IdCodec, IdCodec};
use crate::quota::{InMemoryTokenStore, TokenStore};
use crate::state::Config;
use crate::stream::StreamRegistry;
use crate::upstream::{FileCache, SessionPool, UpstreamClient, WorkloadTable};

/// Container for all bootstrapped services.
///
/// Consumed by `AppState::builder().from_services(...)` to build the final
/// application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    pub upstream: Arc<dyn UpstreamClient>,
    pub session_pool: Arc<SessionPool>,
    pub file_cache: Arc<FileCache>,
    pub workloads: Arc<WorkloadTable>,
    pub stream_registry: Arc<StreamRegistry>,
    pub token_store: Arc<dyn TokenStore>,
    pub id_codec: Arc<dyn IdCodec>,
    pub config: Arc<Config>,
}

/// Wires every service in dependency order:
///
/// 1. Workload table and stream registry (no dependencies).
/// 2. File-property cache (depends on `upstream`).
/// 3. Session pool (depends on `upstream`; spawns its own pre-warm task).
/// 4. Token store and id codec (independent of the above; swappable by the
///    caller for a real database-backed / catalog-backed implementation).
///
/// `upstream` and `token_store` are taken as trait objects so a real
/// deployment can supply its own wire-protocol client and account database
/// without this crate depending on either concretely.
pub fn bootstrap_services(
    config: Config,
    upstream: Arc<dyn UpstreamClient>,
    token_store: Option<Arc<dyn TokenStore>>,
) -> BootstrappedServices {
    let workloads = Arc::new(WorkloadTable::new());
    let stream_registry = StreamRegistry::new();
    let file_cache = FileCache::new(Arc::clone(&upstream), config.file_cache_clean_interval_secs);
    let session_pool = SessionPool::new(
        Arc::clone(&upstream),
        config.session_timeout_secs,
        config.session_sleep_threshold_secs,
    );
    let token_store = token_store.unwrap_or_else(|| Arc::new(InMemoryTokenStore::new()));
    let id_codec: Arc<dyn IdCodec> = Arc::new(Base64IdCodec);

    BootstrappedServices {
        upstream,
        session_pool,
        file_cache,
        workloads,
        stream_registry,
        token_store,
        id_codec,
        config: Arc::new(config),
    }
}
