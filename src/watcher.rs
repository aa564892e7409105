//! Main watcher loop
//!
//! Owns the queues and the worker pool. Polls the chain head, dispatches
//! every new block number to the workers, and folds their completions into
//! a contiguous watermark that is persisted as the resume point.

use crate::address_index::UserLookup;
use crate::checkpoint::CheckpointStore;
use crate::config::PipelineConfig;
use crate::metrics::PipelineMetrics;
use crate::publisher::Publisher;
use crate::retry::RetryRelay;
use crate::rpc::BlockFetcher;
use crate::tracker::AckTracker;
use crate::worker::{sleep_or_cancel, Worker, WorkerQueues, WorkerTiming};
use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Ingestion pipeline orchestrator.
pub struct Watcher {
    config: PipelineConfig,
    fetcher: Arc<dyn BlockFetcher>,
    lookup: Arc<dyn UserLookup>,
    publisher: Arc<dyn Publisher>,
    checkpoints: Arc<dyn CheckpointStore>,
    metrics: Arc<PipelineMetrics>,
}

impl Watcher {
    /// Create a new watcher.
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<dyn BlockFetcher>,
        lookup: Arc<dyn UserLookup>,
        publisher: Arc<dyn Publisher>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            config,
            fetcher,
            lookup,
            publisher,
            checkpoints,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Report into an externally owned counter sink.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the pipeline until `shutdown` is cancelled.
    ///
    /// Fails if the chain head cannot be read at startup or if a worker hits
    /// a fatal publish error. Transient fetch and head failures are absorbed.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.config.validate().context("Invalid pipeline configuration")?;

        // Workers cancel this on fatal errors; the caller's token cascades into it.
        let token = shutdown.child_token();
        let capacity = self.config.queue_capacity;
        let (block_tx, block_rx) = async_channel::bounded::<u64>(capacity);
        let (retry_tx, retry_rx) = async_channel::bounded::<u64>(capacity);
        let (done_tx, done_rx) = async_channel::bounded::<u64>(capacity);

        let cursor = self.start_cursor().await?;

        let mut tasks = JoinSet::new();
        let timing = WorkerTiming {
            fetch_failure_delay: self.config.fetch_failure_delay,
            retry_send_timeout: self.config.retry_send_timeout,
            retry_delay: self.config.retry_delay,
        };
        let queues = WorkerQueues {
            blocks: block_rx,
            retries: retry_tx,
            completions: done_tx,
        };
        for id in 0..self.config.worker_count {
            let worker = Worker::new(
                id,
                Arc::clone(&self.fetcher),
                Arc::clone(&self.lookup),
                Arc::clone(&self.publisher),
                queues.clone(),
                timing,
                Arc::clone(&self.metrics),
            );
            tasks.spawn(worker.run(token.clone()));
        }
        drop(queues);

        let relay = RetryRelay::new(retry_rx, block_tx.clone(), self.config.retry_delay);
        let relay_token = token.clone();
        tasks.spawn(async move {
            relay.run(relay_token).await;
            Ok(())
        });

        info!(
            "Started {} workers, dispatching from block {}",
            self.config.worker_count, cursor
        );
        let loop_result = self.poll_loop(cursor, &block_tx, &done_rx, &token).await;

        // Stopping: wake everyone up and wait for in-flight work to settle.
        token.cancel();
        block_tx.close();
        done_rx.close();

        let mut result = loop_result;
        while let Some(joined) = tasks.join_next().await {
            let task_result = joined.context("Pipeline task panicked").and_then(|r| r);
            if let Err(e) = task_result {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        info!("Pipeline stopped");
        result
    }

    /// Work out the first block to dispatch.
    ///
    /// With no checkpoint the pipeline starts live at the current head;
    /// otherwise it resumes right after the watermark.
    async fn start_cursor(&self) -> Result<u64> {
        let checkpoint = self.checkpoints.load();
        let head = self
            .fetcher
            .current_head()
            .await
            .context("Failed to get latest block on startup")?;

        if checkpoint == 0 {
            info!("No checkpoint found, starting live at head {}", head);
            return Ok(head);
        }
        match checkpoint.checked_add(1) {
            Some(next) => {
                info!(
                    "Resuming after checkpoint {} (head is {})",
                    checkpoint, head
                );
                Ok(next)
            }
            None => {
                warn!(
                    "Checkpoint {} has no successor, treating it as corrupt and starting live at head {}",
                    checkpoint, head
                );
                Ok(head)
            }
        }
    }

    async fn poll_loop(
        &self,
        mut cursor: u64,
        blocks: &Sender<u64>,
        completions: &Receiver<u64>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let mut tracker = AckTracker::new(cursor, self.config.checkpoint_interval);
        let mut first_poll = true;

        loop {
            let head = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                head = self.fetcher.current_head() => head,
            };
            let head = match head {
                Ok(head) => head,
                Err(e) => {
                    warn!("Failed to get latest block: {:#}", e);
                    self.metrics.head_failed();
                    if !sleep_or_cancel(self.config.head_backoff, shutdown).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            if first_poll {
                // The head can appear to move backwards right after startup
                // (stale node, shallow reorg); don't wait on unreachable blocks.
                // `cursor == head + 1` is the caught-up state, not a stale head.
                if cursor > head.saturating_add(1) {
                    warn!("Cursor {} is ahead of head {}, clamping", cursor, head);
                    cursor = head;
                }
                first_poll = false;
            }

            if cursor <= head {
                debug!("Dispatching blocks {}..={}", cursor, head);
            }
            while cursor <= head {
                // Blocking send is the backpressure point; keep draining
                // completions meanwhile so workers never stall on a full
                // completion queue.
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return Ok(()),
                    sent = blocks.send(cursor) => {
                        sent.context("Input queue closed")?;
                        self.metrics.block_dispatched();
                        let Some(next) = cursor.checked_add(1) else {
                            warn!("Dispatched the last representable block {}", cursor);
                            return Ok(());
                        };
                        cursor = next;
                    }
                    Ok(done) = completions.recv() => self.on_completion(&mut tracker, done),
                }
            }

            while let Ok(done) = completions.try_recv() {
                self.on_completion(&mut tracker, done);
            }

            if !sleep_or_cancel(self.config.poll_interval, shutdown).await {
                return Ok(());
            }
        }
    }

    fn on_completion(&self, tracker: &mut AckTracker, block: u64) {
        self.metrics.block_completed();
        let persist = tracker.ack(block);
        self.metrics.set_buffered_completions(tracker.pending_ahead());
        let Some(watermark) = persist else {
            return;
        };

        match self.checkpoints.save(watermark) {
            Ok(()) => {
                self.metrics.checkpoint_saved();
                debug!("Saved checkpoint at block {}", watermark);
            }
            Err(e) => {
                self.metrics.checkpoint_failed();
                error!("Failed to save checkpoint at block {}: {:#}", watermark, e);
            }
        }
    }
}
