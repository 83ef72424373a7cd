//! The usage recorder's enqueue/drain halves.
//!
//! `Recorder::record` is the only thing the request pipeline touches: an unbounded,
//! non-blocking enqueue. A single drain task owns the `UsageStore` writer, batching up
//! to [`BATCH_SIZE`] records or every [`BATCH_INTERVAL`], whichever comes first, and
//! caps in-memory backlog at [`SOFT_CAP`] by dropping the oldest record and counting
//! the drop — the sink being slow or down never blocks a request.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use telemetry::metrics::{USAGE_RECORDER_DROPPED_RECORDS, meter};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::record::UsageRecord;
use crate::store::UsageStore;

const SOFT_CAP: usize = 10_000;
const BATCH_SIZE: usize = 200;
const BATCH_INTERVAL: Duration = Duration::from_millis(500);

/// Handle held by the request pipeline to enqueue completed exchanges.
#[derive(Clone)]
pub struct Recorder {
    sender: mpsc::UnboundedSender<UsageRecord>,
    dropped_count: Arc<AtomicU64>,
}

impl Recorder {
    /// Enqueue a completed exchange's usage record. Never blocks, never fails visibly:
    /// if the drain task has already shut down the record is silently discarded, which
    /// only happens during/after process shutdown.
    pub fn record(&self, record: UsageRecord) {
        if self.sender.send(record).is_err() {
            log::debug!("usage record dropped: drain task no longer running");
        }
    }

    /// Total records dropped from the in-memory backlog since startup because the
    /// sink couldn't keep up with [`SOFT_CAP`].
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }
}

/// Spawn the drain loop and return a [`Recorder`] handle plus its task handle.
///
/// `shutdown` is observed between batches; once cancelled the loop drains whatever is
/// already queued, flushes a final batch, and returns.
pub fn spawn(store: UsageStore, shutdown: CancellationToken) -> (Recorder, tokio::task::JoinHandle<()>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let dropped_count = Arc::new(AtomicU64::new(0));

    let handle = tokio::spawn(drain_loop(store, receiver, dropped_count.clone(), shutdown));

    (Recorder { sender, dropped_count }, handle)
}

async fn drain_loop(
    store: UsageStore,
    mut receiver: mpsc::UnboundedReceiver<UsageRecord>,
    dropped_count: Arc<AtomicU64>,
    shutdown: CancellationToken,
) {
    let dropped_counter = meter().u64_counter(USAGE_RECORDER_DROPPED_RECORDS).build();

    let mut backlog: VecDeque<UsageRecord> = VecDeque::with_capacity(BATCH_SIZE);
    let mut tick = tokio::time::interval(BATCH_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            maybe_record = receiver.recv() => {
                match maybe_record {
                    Some(record) => {
                        push_with_cap(&mut backlog, record, &dropped_count, &dropped_counter);

                        if backlog.len() >= BATCH_SIZE {
                            flush(&store, &mut backlog).await;
                        }
                    }
                    None => {
                        flush(&store, &mut backlog).await;
                        return;
                    }
                }
            }

            _ = tick.tick() => {
                flush(&store, &mut backlog).await;
            }

            _ = shutdown.cancelled() => {
                receiver.close();
                while let Ok(record) = receiver.try_recv() {
                    push_with_cap(&mut backlog, record, &dropped_count, &dropped_counter);
                }

                flush(&store, &mut backlog).await;
                return;
            }
        }
    }
}

fn push_with_cap(
    backlog: &mut VecDeque<UsageRecord>,
    record: UsageRecord,
    dropped_count: &AtomicU64,
    dropped_counter: &opentelemetry::metrics::Counter<u64>,
) {
    if backlog.len() >= SOFT_CAP {
        backlog.pop_front();
        dropped_count.fetch_add(1, Ordering::Relaxed);
        dropped_counter.add(1, &[]);
    }

    backlog.push_back(record);
}

/// Write the current backlog and, only on success, clear it. A failed write leaves
/// the records queued (subject to [`SOFT_CAP`]) so the next tick retries rather than
/// losing them outright.
async fn flush(store: &UsageStore, backlog: &mut VecDeque<UsageRecord>) {
    if backlog.is_empty() {
        return;
    }

    let batch: Vec<_> = backlog.iter().cloned().collect();
    let store = store.clone();

    let result = tokio::task::spawn_blocking(move || store.write_batch(&batch)).await;

    match result {
        Ok(Ok(())) => backlog.clear(),
        Ok(Err(e)) => log::error!("usage store write failed, {} records still queued: {e}", backlog.len()),
        Err(e) => log::error!("usage store write task panicked: {e}"),
    }
}
