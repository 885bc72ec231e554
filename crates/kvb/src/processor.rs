//! 🎬 *[a channel fills with operations. somewhere, a batch waits.]*
//! *[the clock on the wall reads 2:47am.]*
//!
//! 🧵 The bulk processor: many producers, one batch, zero locks.
//!
//! `BulkBatch` is deliberately not thread-safe. The processor is how you share one anyway:
//! producers push operations into a bounded `async-channel`, and a single worker task owns
//! the batch, commits it whenever it gets heavy enough, and keeps score.
//!
//! ## Knowledge Graph 🧠
//! - Commit triggers: `bulk_actions` reached, `bulk_size_bytes` reached, interval tick,
//!   explicit `flush()`, and `close()` (final drain). `0` disables a threshold.
//! - Every incoming operation is rendered on arrival. One that cannot render is logged,
//!   counted as rejected, and dropped, so it can never wedge the batch.
//! - A commit that fails (transport or decode) keeps the queue and stalls the worker:
//!   thresholds stop triggering, and once the batch is over its threshold the worker stops
//!   reading the channel, so producers block on `add`. Only the next tick, `flush()` or
//!   `close()` tries again. No backoff beyond that, and no request per `add`.
//! - `flush()` reports that the attempt happened. Whether it worked lives in the stats.
//! - `close()` returns the final `ProcessorStats`, or an error if operations were still
//!   undelivered when the worker ran out of chances.
//!
//! ⚠️ When the singularity occurs, the worker will still be draining the channel.
//! It will not notice. It does not notice things. It only commits. 🦆

use std::time::Duration;

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, interval_at};
use tracing::{debug, error, warn};

use crate::bulk::{BulkBatch, BulkConfig};
use crate::error::BulkError;
use crate::operations::BulkOperation;
use crate::response::BulkResponse;
use crate::transport::Transport;

/// 🚰 When the processor commits, and how much it buffers in the channel.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProcessorConfig {
    /// 🔢 Commit once this many operations are queued. `0` disables.
    #[serde(default = "default_bulk_actions")]
    pub bulk_actions: usize,
    /// 📏 Commit once the estimated body reaches this many bytes. `0` disables.
    #[serde(default = "default_bulk_size_bytes")]
    pub bulk_size_bytes: u64,
    /// ⏱️ Commit whatever is queued on this period, if set.
    #[serde(default)]
    pub flush_interval_ms: Option<u64>,
    /// ✉️ Channel capacity between producers and the worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

// 📦 1000 actions. A nice round number that will age like milk the moment someone
// bulk-indexes 50MB PDFs.
fn default_bulk_actions() -> usize {
    1000
}

// 📏 5 MiB. Comfortably under the 100MB the cluster tolerates, comfortably over "chatty".
fn default_bulk_size_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            bulk_actions: default_bulk_actions(),
            bulk_size_bytes: default_bulk_size_bytes(),
            flush_interval_ms: None,
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// 📊 The scoreboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessorStats {
    /// 🔄 Commit attempts that had something to send.
    pub flushed: u64,
    /// ✅ Commits that made a full round trip.
    pub committed: u64,
    /// 💀 Commits that failed at the transport or decode level (queue kept).
    pub commit_errors: u64,
    /// 🚫 Operations dropped on arrival because they could not render.
    pub rejected: u64,
    pub indexed: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl ProcessorStats {
    fn record(&mut self, response: &BulkResponse) {
        self.committed += 1;
        self.indexed += response.indexed().len() as u64;
        self.created += response.created().len() as u64;
        self.updated += response.updated().len() as u64;
        self.deleted += response.deleted().len() as u64;
        self.succeeded += response.succeeded().len() as u64;
        self.failed += response.failed().len() as u64;
    }
}

/// 🏗️ A background worker, that does work. duh.
trait Worker {
    type Output;

    fn start(self) -> JoinHandle<Result<Self::Output>>;
}

/// 🧵 Handle to a running processor. Cheap to share by reference across producers.
#[derive(Debug)]
pub struct BulkProcessor {
    tx: Sender<BulkOperation>,
    // -- 🚽 flush requests get their own lane, so they still reach a worker that stopped reading `tx`
    flush_tx: Sender<oneshot::Sender<()>>,
    handle: JoinHandle<Result<ProcessorStats>>,
}

impl BulkProcessor {
    /// 🚀 Spawn the worker. Must be called inside a tokio runtime.
    pub fn start<T: Transport + 'static>(transport: T, bulk_config: BulkConfig, config: ProcessorConfig) -> Self {
        let (tx, rx) = async_channel::bounded(config.queue_capacity.max(1));
        let (flush_tx, flush_rx) = async_channel::unbounded();
        let worker = CommitWorker {
            rx,
            flush_rx,
            batch: BulkBatch::new(transport, bulk_config),
            config,
            stats: ProcessorStats::default(),
            stalled: false,
        };
        Self {
            tx,
            flush_tx,
            handle: worker.start(),
        }
    }

    /// ➕ Queue an operation. Waits when the channel is full, which includes the whole time a
    /// failed commit has left the batch over its threshold.
    pub async fn add(&self, operation: impl Into<BulkOperation>) -> Result<()> {
        self.tx
            .send(operation.into())
            .await
            .context("💀 The processor worker is gone. Operations are being sent into a channel nobody is listening to.")
    }

    /// 🚽 Commit whatever is queued right now, and wait until the worker has tried.
    ///
    /// ⚠️ `Ok(())` means the attempt happened, not that it worked. A failed commit only shows
    /// up in [`ProcessorStats::commit_errors`] (and the operations stay queued).
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.flush_tx
            .send(ack_tx)
            .await
            .context("💀 Asked the processor worker to flush, but the worker has left the building.")?;
        ack_rx
            .await
            .context("💀 The processor worker hung up before confirming the flush.")
    }

    /// 🏁 Close the channels, let the worker drain and commit the remainder, collect the stats.
    pub async fn close(self) -> Result<ProcessorStats> {
        self.tx.close();
        self.flush_tx.close();
        self.handle
            .await
            .context("💀 The processor worker panicked or was cancelled. The stats went down with it.")?
    }
}

/// 🗑️ Owns the batch. Drains the channel. Commits. Repeats.
struct CommitWorker<T> {
    rx: Receiver<BulkOperation>,
    flush_rx: Receiver<oneshot::Sender<()>>,
    batch: BulkBatch<T>,
    config: ProcessorConfig,
    stats: ProcessorStats,
    /// 🧊 The last commit failed. Thresholds stop triggering until a tick, flush or close.
    stalled: bool,
}

impl<T: Transport + 'static> Worker for CommitWorker<T> {
    type Output = ProcessorStats;

    fn start(mut self) -> JoinHandle<Result<ProcessorStats>> {
        tokio::spawn(async move {
            debug!("📥 commit worker started draining channel...");
            let mut ticker = self.config.flush_interval_ms.filter(|ms| *ms > 0).map(|ms| {
                let period = Duration::from_millis(ms);
                interval_at(Instant::now() + period, period)
            });

            loop {
                // -- 🧊 stalled and full: stop reading, let the bounded channel push back on producers
                let accepting = !self.stalled || !self.over_threshold();
                match next_event(&self.rx, &self.flush_rx, ticker.as_mut(), accepting).await {
                    Event::Add(operation) => {
                        self.accept(operation);
                        if !self.stalled && self.over_threshold() {
                            self.commit().await;
                        }
                    }
                    Event::Flush(ack) => {
                        self.accept_pending();
                        self.commit().await;
                        let _ = ack.send(());
                    }
                    Event::Tick => self.commit().await,
                    Event::Closed => {
                        debug!("🏁 commit worker: channel closed, committing the remainder");
                        while let Ok(operation) = self.rx.recv().await {
                            self.accept(operation);
                            if !self.stalled && self.over_threshold() {
                                self.commit().await;
                            }
                        }
                        self.commit().await;
                        if !self.batch.is_empty() {
                            anyhow::bail!(
                                "💀 The processor shut down with {} operations still undelivered. The last commit failed and there is no one left to retry it.",
                                self.batch.number_of_actions()
                            );
                        }
                        return Ok(self.stats);
                    }
                }
            }
        })
    }
}

enum Event {
    Add(BulkOperation),
    Flush(oneshot::Sender<()>),
    Tick,
    Closed,
}

async fn next_event(
    rx: &Receiver<BulkOperation>,
    flush_rx: &Receiver<oneshot::Sender<()>>,
    ticker: Option<&mut Interval>,
    accepting: bool,
) -> Event {
    tokio::select! {
        biased;
        flush = flush_rx.recv() => match flush {
            Ok(ack) => Event::Flush(ack),
            Err(_) => Event::Closed,
        },
        received = rx.recv(), if accepting => match received {
            Ok(operation) => Event::Add(operation),
            Err(_) => Event::Closed,
        },
        _ = tick(ticker) => Event::Tick,
    }
}

async fn tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl<T: Transport> CommitWorker<T> {
    fn accept(&mut self, mut operation: BulkOperation) {
        // -- 🧪 render on arrival; the memo makes the batch's own render free later
        if let Err(err) = operation.render().map(|_| ()) {
            error!("🚫 dropping {} operation for id {:?}: {}", operation.action(), operation.id(), err);
            self.stats.rejected += 1;
            return;
        }
        self.batch.add(operation);
    }

    /// 📥 Take what was already waiting in the channel when a flush arrived, nothing newer.
    fn accept_pending(&mut self) {
        for _ in 0..self.rx.len() {
            match self.rx.try_recv() {
                Ok(operation) => self.accept(operation),
                Err(_) => break,
            }
        }
    }

    fn over_threshold(&mut self) -> bool {
        if self.config.bulk_actions > 0 && self.batch.number_of_actions() >= self.config.bulk_actions {
            return true;
        }
        if self.config.bulk_size_bytes > 0 {
            // -- every queued operation already rendered once in `accept`, so this cannot fail
            return matches!(self.batch.estimated_size_in_bytes(), Ok(size) if size >= self.config.bulk_size_bytes);
        }
        false
    }

    async fn commit(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        self.stats.flushed += 1;
        match self.batch.submit().await {
            Ok(response) => {
                debug!(
                    "✅ committed {} items in {}ms ({} failed)",
                    response.items.len(),
                    response.took,
                    response.failed().len()
                );
                self.stats.record(&response);
                self.stalled = false;
            }
            Err(BulkError::EmptyBatch) => {}
            Err(err) => {
                warn!(
                    "💀 commit of {} operations failed, holding them until the next tick, flush or close: {}",
                    self.batch.number_of_actions(),
                    err
                );
                self.stats.commit_errors += 1;
                self.stalled = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::operations::{DeleteOperation, IndexOperation, Payload};
    use crate::transport::{TransportRequest, TransportResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 🎭 Answers every bulk request with one 201 `index` item per action line it sees.
    /// Optionally fails the first `outages` calls with a 503.
    #[derive(Debug, Default)]
    struct EchoTransport {
        calls: AtomicUsize,
        outages: AtomicUsize,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn perform(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .outages
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok()
            {
                return Err(TransportError::Status {
                    status: 503,
                    body: "try again later".into(),
                });
            }
            let items: Vec<_> = request
                .body
                .lines()
                .filter(|line| line.starts_with("{\"index\""))
                .map(|_| json!({"index": {"_index": "i", "status": 201, "result": "created"}}))
                .collect();
            let body = json!({"took": 1, "errors": false, "items": items});
            Ok(TransportResponse {
                status: 200,
                body: body.to_string().into_bytes(),
            })
        }
    }

    fn doc(n: usize) -> IndexOperation {
        IndexOperation::new().index("i").id(n.to_string()).doc(json!({"n": n}))
    }

    fn config(bulk_actions: usize) -> ProcessorConfig {
        ProcessorConfig {
            bulk_actions,
            bulk_size_bytes: 0,
            flush_interval_ms: None,
            queue_capacity: 16,
        }
    }

    #[tokio::test]
    async fn the_one_where_the_action_threshold_triggers_commits() -> Result<()> {
        let transport = Arc::new(EchoTransport::default());
        let processor = BulkProcessor::start(transport.clone(), BulkConfig::default(), config(2));
        for n in 0..5 {
            processor.add(doc(n)).await?;
        }
        let stats = processor.close().await?;

        // 🧪 2 + 2 on threshold, then the leftover 1 on close
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(stats.committed, 3);
        assert_eq!(stats.indexed, 5);
        assert_eq!(stats.succeeded, 5);
        assert_eq!(stats.failed, 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_size_threshold_triggers_commits() -> Result<()> {
        let transport = Arc::new(EchoTransport::default());
        let processor_config = ProcessorConfig {
            bulk_actions: 0,
            bulk_size_bytes: 1,
            flush_interval_ms: None,
            queue_capacity: 4,
        };
        let processor = BulkProcessor::start(transport.clone(), BulkConfig::default(), processor_config);
        processor.add(doc(1)).await?;
        processor.add(doc(2)).await?;
        let stats = processor.close().await?;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(stats.indexed, 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_flush_does_not_wait_for_the_threshold() -> Result<()> {
        let transport = Arc::new(EchoTransport::default());
        let processor = BulkProcessor::start(transport.clone(), BulkConfig::default(), config(100));
        processor.add(doc(1)).await?;
        processor.flush().await?;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        // 🧪 flushing nothing is not an error and not a request
        processor.flush().await?;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        let stats = processor.close().await?;
        assert_eq!(stats.flushed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_outage_is_survived_by_keeping_the_queue() -> Result<()> {
        let transport = Arc::new(EchoTransport {
            calls: AtomicUsize::new(0),
            outages: AtomicUsize::new(1),
        });
        let processor = BulkProcessor::start(transport.clone(), BulkConfig::default(), config(100));
        processor.add(doc(1)).await?;
        processor.add(doc(2)).await?;
        // 🧪 the commit behind this flush fails, and the flush still says Ok. Only the stats know.
        assert!(processor.flush().await.is_ok());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        let stats = processor.close().await?;

        assert_eq!(stats.commit_errors, 1);
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.indexed, 2, "the failed commit's operations ride along on the next one");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_permanent_outage_fails_the_close() -> Result<()> {
        let transport = Arc::new(EchoTransport {
            calls: AtomicUsize::new(0),
            outages: AtomicUsize::new(usize::MAX),
        });
        let processor = BulkProcessor::start(transport, BulkConfig::default(), config(100));
        processor.add(doc(1)).await?;
        let err = processor.close().await.expect_err("undelivered operations must not be silent");
        assert!(err.to_string().contains("1 operations still undelivered"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_outage_backs_producers_up_instead_of_hammering_the_cluster() -> Result<()> {
        let transport = Arc::new(EchoTransport {
            calls: AtomicUsize::new(0),
            outages: AtomicUsize::new(usize::MAX),
        });
        let processor_config = ProcessorConfig {
            queue_capacity: 1,
            ..config(2)
        };
        let processor = BulkProcessor::start(transport.clone(), BulkConfig::default(), processor_config);
        processor.add(doc(1)).await?;
        processor.add(doc(2)).await?;
        // 🧪 the threshold commit of 1+2 fails. Op 3 fits in the channel's single slot...
        processor.add(doc(3)).await?;
        // 🧪 ...and op 4 has nowhere to go, because the stalled worker stopped reading
        let blocked = tokio::time::timeout(Duration::from_millis(100), processor.add(doc(4))).await;
        assert!(blocked.is_err(), "a stalled worker must push back on producers");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1, "no resend per add while stalled");

        // 🚽 flush is a retry: it takes op 3 along and tries once
        processor.flush().await?;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);

        // 🏁 close tries one last time, then owns up
        let err = processor.close().await.expect_err("the cluster never came back");
        assert!(err.to_string().contains("3 operations still undelivered"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_successful_flush_unsticks_the_thresholds() -> Result<()> {
        let transport = Arc::new(EchoTransport {
            calls: AtomicUsize::new(0),
            outages: AtomicUsize::new(1),
        });
        let processor_config = ProcessorConfig {
            queue_capacity: 1,
            ..config(2)
        };
        let processor = BulkProcessor::start(transport.clone(), BulkConfig::default(), processor_config);
        processor.add(doc(1)).await?;
        processor.add(doc(2)).await?;
        processor.add(doc(3)).await?;
        // 🧪 1+2 failed on threshold, this flush delivers 1+2+3
        processor.flush().await?;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);

        // 🧪 back to normal: the threshold commits 4+5 on its own
        processor.add(doc(4)).await?;
        processor.add(doc(5)).await?;
        let stats = processor.close().await?;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(stats.commit_errors, 1);
        assert_eq!(stats.indexed, 5);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_unrenderable_operation_is_turned_away() -> Result<()> {
        let transport = Arc::new(EchoTransport::default());
        let processor = BulkProcessor::start(transport.clone(), BulkConfig::default(), config(100));
        processor.add(IndexOperation::new().doc(Payload::raw("{{{"))).await?;
        processor.add(DeleteOperation::new().id("1")).await?;
        let stats = processor.close().await?;
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.committed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_interval_flushes_stragglers() -> Result<()> {
        let transport = Arc::new(EchoTransport::default());
        let processor_config = ProcessorConfig {
            flush_interval_ms: Some(50),
            ..config(100)
        };
        let processor = BulkProcessor::start(transport.clone(), BulkConfig::default(), processor_config);
        processor.add(doc(1)).await?;
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        processor.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_many_producers_share_one_batch() -> Result<()> {
        let transport = Arc::new(EchoTransport::default());
        let processor = BulkProcessor::start(transport.clone(), BulkConfig::default(), config(7));
        let producers = (0..4).map(|producer| {
            let processor = &processor;
            async move {
                for n in 0..25 {
                    processor.add(doc(producer * 100 + n)).await?;
                }
                Ok::<_, anyhow::Error>(())
            }
        });
        for result in futures::future::join_all(producers).await {
            result?;
        }
        let stats = processor.close().await?;
        assert_eq!(stats.indexed, 100);
        Ok(())
    }
}
