//! Per-client active-stream counters.
//!
//! Mirrors the upstream codebase's `work_loads` dict: a simple counter per
//! client index, incremented when a stream starts and decremented exactly
//! once when it ends, regardless of how it ends.

use dashmap::DashMap;

/// Tracks the number of active streams per client index.
#[derive(Debug, Default)]
pub struct WorkloadTable {
    counts: DashMap<usize, i64>,
}

impl WorkloadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current workload for a client, 0 if never recorded.
    pub fn get(&self, client_index: usize) -> i64 {
        self.counts.get(&client_index).map(|v| *v).unwrap_or(0)
    }

    /// Snapshot of every client's workload, for the stats endpoint.
    pub fn snapshot(&self) -> DashMap<usize, i64> {
        self.counts.clone()
    }

    /// Increments the counter for `client_index` and returns a guard that
    /// decrements it exactly once on drop.
    ///
    /// Using a guard rather than paired increment/decrement calls ensures the
    /// counter is released on every exit path of the pipeline (success,
    /// error, and cancellation) without duplicating cleanup code at each call
    /// site.
    pub fn acquire(self: &std::sync::Arc<Self>, client_index: usize) -> WorkloadGuard {
        *self.counts.entry(client_index).or_insert(0) += 1;
        WorkloadGuard {
            table: std::sync::Arc::clone(self),
            client_index,
            released: false,
        }
    }
}

/// RAII guard that decrements a client's workload counter exactly once.
pub struct WorkloadGuard {
    table: std::sync::Arc<WorkloadTable>,
    client_index: usize,
    released: bool,
}

impl Drop for WorkloadGuard {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            if let Some(mut entry) = self.table.counts.get_mut(&self.client_index) {
                *entry -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn acquire_increments_and_drop_decrements() {
        let table = Arc::new(WorkloadTable::new());
        assert_eq!(table.get(0), 0);
        {
            let _guard = table.acquire(0);
            assert_eq!(table.get(0), 1);
        }
        assert_eq!(table.get(0), 0);
    }

    #[test]
    fn concurrent_streams_conserve_workload() {
        let table = Arc::new(WorkloadTable::new());
        let guards: Vec<_> = (0..5).map(|_| table.acquire(2)).collect();
        assert_eq!(table.get(2), 5);
        drop(guards);
        assert_eq!(table.get(2), 0);
    }
}
