//! Prefetch pipeline: schedules chunk fetches ahead of the consumer while
//! delivering them to the HTTP body stream strictly in order.
//!
//! Mirrors the producer/consumer split of the upstream reference
//! implementation: a background task schedules up to `parallelism` chunk
//! fetches concurrently and pushes completed chunks through a bounded
//! channel once they reach the front of the delivery order, while the
//! consumer side turns that channel into an axum-compatible byte stream.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::upstream::client::UpstreamClient;
use crate::upstream::fetcher::fetch_chunk_with_retries;
use crate::upstream::types::{FileLocation, SessionHandle};
use crate::upstream::workload::WorkloadTable;

use super::registry::{StreamRegistry, StreamStatus};

/// Everything the pipeline needs to stream one ranged request.
pub struct PipelineParams {
    pub stream_id: String,
    pub client_index: usize,
    pub session: SessionHandle,
    pub location: FileLocation,
    /// Byte offset of part 0, chunk-aligned.
    pub offset: u64,
    /// Bytes to trim from the front of part 0.
    pub first_part_cut: u64,
    /// Bytes to keep from the front of the last part.
    pub last_part_cut: u64,
    /// Total number of chunk-sized parts to fetch.
    pub part_count: u64,
    pub chunk_size: u64,
    pub prefetch: usize,
    pub parallelism: usize,
}

/// One chunk result as it comes off the producer channel.
struct ProducerItem {
    seq: u64,
    chunk: Option<Bytes>,
}

fn spawn_fetch(
    in_flight: &mut JoinSet<(u64, Option<Bytes>)>,
    upstream: &Arc<dyn UpstreamClient>,
    session: SessionHandle,
    location: &FileLocation,
    base_offset: u64,
    chunk_size: u64,
    seq: u64,
    stop: &CancellationToken,
) {
    let upstream = Arc::clone(upstream);
    let location = location.clone();
    let stop = stop.clone();
    let fetch_offset = base_offset + seq * chunk_size;
    in_flight.spawn(async move {
        let chunk =
            fetch_chunk_with_retries(upstream.as_ref(), session, &location, seq, fetch_offset, &stop)
                .await;
        (seq, chunk)
    });
}

/// Schedules chunk fetches ahead of delivery order and pushes completed
/// chunks to `tx` strictly in sequence.
///
/// `parallelism` bounds concurrent in-flight fetches; `prefetch` (via the
/// channel capacity the caller constructs) bounds how far ahead of the
/// consumer the pipeline is allowed to buffer completed-but-undelivered
/// chunks.
async fn producer(
    stream_id: &str,
    upstream: Arc<dyn UpstreamClient>,
    session: SessionHandle,
    location: FileLocation,
    offset: u64,
    chunk_size: u64,
    part_count: u64,
    parallelism: usize,
    tx: mpsc::Sender<ProducerItem>,
    stop: CancellationToken,
) {
    if part_count == 0 {
        let _ = tx.send(ProducerItem { seq: 0, chunk: None }).await;
        return;
    }

    let max_parallel = (parallelism.max(1) as u64).min(part_count);
    let mut in_flight: JoinSet<(u64, Option<Bytes>)> = JoinSet::new();
    let mut results_buffer: HashMap<u64, Bytes> = HashMap::new();
    let mut next_to_schedule: u64 = 0;
    let mut next_to_put: u64 = 0;

    for _ in 0..max_parallel {
        spawn_fetch(
            &mut in_flight,
            &upstream,
            session,
            &location,
            offset,
            chunk_size,
            next_to_schedule,
            &stop,
        );
        next_to_schedule += 1;
    }

    while next_to_put < part_count {
        if stop.is_cancelled() {
            break;
        }

        let Some(joined) = in_flight.join_next().await else {
            break;
        };

        let (seq, chunk) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("[Pipeline] stream {stream_id} fetch task panicked: {e}");
                let _ = tx.send(ProducerItem { seq: 0, chunk: None }).await;
                return;
            }
        };

        let Some(bytes) = chunk else {
            let _ = tx.send(ProducerItem { seq, chunk: None }).await;
            return;
        };
        results_buffer.insert(seq, bytes);

        if next_to_schedule < part_count {
            spawn_fetch(
                &mut in_flight,
                &upstream,
                session,
                &location,
                offset,
                chunk_size,
                next_to_schedule,
                &stop,
            );
            next_to_schedule += 1;
        }

        while let Some(bytes) = results_buffer.remove(&next_to_put) {
            let seq = next_to_put;
            if tx
                .send(ProducerItem {
                    seq,
                    chunk: Some(bytes),
                })
                .await
                .is_err()
            {
                return;
            }
            next_to_put += 1;
        }
    }

    if !stop.is_cancelled() {
        let _ = tx
            .send(ProducerItem {
                seq: part_count,
                chunk: None,
            })
            .await;
    }
}

/// Builds the byte stream axum hands to the client for one ranged download.
///
/// Trims the first and last delivered chunks to `first_part_cut`/
/// `last_part_cut`, updates `registry` per chunk, and stamps the stream
/// terminal (`Cancelled`/`Error`/`Finished`) on every exit path, including
/// the consumer dropping the stream early.
pub fn build_stream(
    upstream: Arc<dyn UpstreamClient>,
    registry: Arc<StreamRegistry>,
    workloads: Arc<WorkloadTable>,
    params: PipelineParams,
) -> impl Stream<Item = Result<Bytes, io::Error>> {
    let PipelineParams {
        stream_id,
        client_index,
        session,
        location,
        offset,
        first_part_cut,
        last_part_cut,
        part_count,
        chunk_size,
        prefetch,
        parallelism,
    } = params;

    let channel_capacity = prefetch.max(1);
    let (tx, mut rx) = mpsc::channel::<ProducerItem>(channel_capacity);
    let stop = CancellationToken::new();

    let producer_stop = stop.clone();
    let producer_upstream = Arc::clone(&upstream);
    let producer_stream_id = stream_id.clone();
    tokio::spawn(async move {
        producer(
            &producer_stream_id,
            producer_upstream,
            session,
            location,
            offset,
            chunk_size,
            part_count,
            parallelism,
            tx,
            producer_stop,
        )
        .await;
    });

    // Acquired here but moved into the generator below so it lives for the
    // stream's lifetime, not just this function call, and releases on drop
    // regardless of how the consumer exits.
    let workload_guard = workloads.acquire(client_index);

    // `stream!` builds an async generator: if the consumer drops the stream
    // mid-`await` (client disconnect), no code after that await point ever
    // runs. Cleanup therefore can't be a statement after the loop — it has
    // to live in a `Drop` impl so it fires on every exit path alike.
    let cleanup = StreamCleanup {
        stop: stop.clone(),
        registry,
        stream_id,
        status: std::cell::Cell::new(StreamStatus::Cancelled),
    };

    stream! {
        let _workload_guard = workload_guard;
        let _cleanup = cleanup;

        loop {
            let Some(item) = rx.recv().await else {
                // Producer dropped the sender without a terminal message.
                _cleanup.status.set(StreamStatus::Error);
                break;
            };

            let Some(mut bytes) = item.chunk else {
                _cleanup.status.set(if item.seq < part_count {
                    StreamStatus::Error
                } else {
                    StreamStatus::Finished
                });
                break;
            };

            // Order matters for a single-part range (seq 0 is also the last
            // part): `last_part_cut` is an absolute index into the
            // *original* chunk, so it must be applied before the front trim
            // shifts indices, or a chunk longer than `last_part_cut` yields
            // `first_part_cut` bytes too many.
            if item.seq == part_count.saturating_sub(1) {
                let keep = (last_part_cut as usize).min(bytes.len());
                bytes = bytes.slice(..keep);
            }
            if item.seq == 0 && first_part_cut > 0 {
                let cut = (first_part_cut as usize).min(bytes.len());
                bytes = bytes.slice(cut..);
            }

            _cleanup.registry.record_chunk(bytes.len() as u64);
            yield Ok(bytes);
        }
    }
}

/// Cancels the producer and stamps the stream terminal on drop, whichever
/// path got us there: normal completion, a fetch error, or the consumer
/// dropping the stream before it finished.
struct StreamCleanup {
    stop: CancellationToken,
    registry: Arc<StreamRegistry>,
    stream_id: String,
    status: std::cell::Cell<StreamStatus>,
}

impl Drop for StreamCleanup {
    fn drop(&mut self) {
        self.stop.cancel();
        self.registry.finish(&self.stream_id, self.status.get());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::registry::StreamMeta;
    use crate::upstream::test_fixtures::FakeUpstreamClient;
    use crate::upstream::types::MessageRef;
    use futures::StreamExt;

    fn build_fake(data: Vec<u8>) -> (Arc<dyn UpstreamClient>, SessionHandle, FileLocation) {
        let msg = MessageRef {
            chat_id: -1,
            msg_id: 7,
        };
        let fake = FakeUpstreamClient::new(vec![1]).with_file(msg, 1, "abcdef", Bytes::from(data));
        let upstream: Arc<dyn UpstreamClient> = Arc::new(fake);
        (upstream, SessionHandle(0), FileLocation(vec![]))
    }

    #[tokio::test]
    async fn delivers_chunks_in_order_and_marks_finished() {
        let chunk_size = 8u64;
        let total = chunk_size * 3;
        let data: Vec<u8> = (0..total as usize).map(|i| (i % 256) as u8).collect();
        let (upstream, session, location) = build_fake(data.clone());

        let registry = StreamRegistry::new();
        registry.create(
            "s1".into(),
            7,
            -1,
            1,
            0,
            3,
            4,
            2,
            StreamMeta::default(),
        );
        let workloads = Arc::new(WorkloadTable::new());

        let params = PipelineParams {
            stream_id: "s1".into(),
            client_index: 0,
            session,
            location,
            offset: 0,
            first_part_cut: 0,
            last_part_cut: chunk_size,
            part_count: 3,
            chunk_size,
            prefetch: 4,
            parallelism: 2,
        };

        let stream = build_stream(upstream, Arc::clone(&registry), workloads, params);
        tokio::pin!(stream);

        let mut collected = Vec::new();
        while let Some(item) = stream.next().await {
            collected.extend_from_slice(&item.unwrap());
        }

        assert_eq!(collected, data);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let record = registry.get("s1").unwrap();
        assert_eq!(record.status(), StreamStatus::Finished);
    }

    #[tokio::test]
    async fn workload_is_released_after_stream_completes() {
        let chunk_size = 4u64;
        let data = vec![1u8; chunk_size as usize * 2];
        let (upstream, session, location) = build_fake(data);

        let registry = StreamRegistry::new();
        registry.create(
            "s2".into(),
            7,
            -1,
            1,
            3,
            2,
            4,
            2,
            StreamMeta::default(),
        );
        let workloads = Arc::new(WorkloadTable::new());

        let params = PipelineParams {
            stream_id: "s2".into(),
            client_index: 3,
            session,
            location,
            offset: 0,
            first_part_cut: 0,
            last_part_cut: chunk_size,
            part_count: 2,
            chunk_size,
            prefetch: 4,
            parallelism: 2,
        };

        let stream = build_stream(upstream, registry, workloads.clone(), params);
        tokio::pin!(stream);
        while stream.next().await.is_some() {}

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(workloads.get(3), 0);
    }

    /// A single-part range (`Range: bytes=10-20` on a chunk larger than
    /// `last_part_cut`) must apply both cuts to the *original* chunk, not
    /// trim the front and then re-slice the already-trimmed buffer.
    #[tokio::test]
    async fn single_part_mid_file_range_slices_exact_bytes() {
        let chunk_size = 1024u64;
        let data: Vec<u8> = (0..chunk_size as usize).map(|i| (i % 256) as u8).collect();
        let (upstream, session, location) = build_fake(data.clone());

        let registry = StreamRegistry::new();
        registry.create(
            "s3".into(),
            7,
            -1,
            1,
            0,
            1,
            4,
            2,
            StreamMeta::default(),
        );
        let workloads = Arc::new(WorkloadTable::new());

        // Range: bytes=10-20, both endpoints inclusive, entirely inside one
        // chunk-aligned part.
        let first_part_cut = 10u64;
        let last_part_cut = 21u64;

        let params = PipelineParams {
            stream_id: "s3".into(),
            client_index: 0,
            session,
            location,
            offset: 0,
            first_part_cut,
            last_part_cut,
            part_count: 1,
            chunk_size,
            prefetch: 4,
            parallelism: 2,
        };

        let stream = build_stream(upstream, registry, workloads, params);
        tokio::pin!(stream);

        let mut collected = Vec::new();
        while let Some(item) = stream.next().await {
            collected.extend_from_slice(&item.unwrap());
        }

        assert_eq!(collected, &data[10..21]);
        assert_eq!(collected.len(), 11);
    }
}
