//! Client selection for a target datacenter.

use super::client::UpstreamClient;
use super::workload::WorkloadTable;

/// Picks the client index that should serve a file hosted on `target_dc`.
///
/// Prefers a client whose home DC matches, breaking ties by lowest current
/// workload; falls back to the globally least-loaded client when no client
/// is home to `target_dc`. Returns 0 when the pool has no clients at all
/// (the caller will fail at the subsequent lookup).
pub fn select_best_client(
    upstream: &dyn UpstreamClient,
    workloads: &WorkloadTable,
    target_dc: u16,
) -> usize {
    let client_count = upstream.client_count();
    if client_count == 0 {
        return 0;
    }

    let home_match = (0..client_count)
        .filter(|&idx| upstream.home_dc(idx) == Some(target_dc))
        .min_by_key(|&idx| workloads.get(idx));

    if let Some(idx) = home_match {
        return idx;
    }

    (0..client_count)
        .min_by_key(|&idx| workloads.get(idx))
        .unwrap_or(0)
}
