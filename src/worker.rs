//! Block workers
//!
//! Each worker pulls block numbers from the shared input queue, fetches the
//! block, filters its transactions through the address index and publishes
//! the matches. Fetch failures go to the retry queue; successes are
//! acknowledged on the completion queue once publishing is done.

use crate::address_index::UserLookup;
use crate::metrics::PipelineMetrics;
use crate::publisher::Publisher;
use crate::records::TxMessage;
use crate::rpc::BlockFetcher;
use crate::types::Block;
use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Build the outbound messages for every watched side of every transaction.
///
/// A transaction yields one message if its sender is watched and another if
/// its recipient is watched, so a transfer between two watched users (or a
/// self-transfer) produces two.
pub fn extract_messages(block: &Block, lookup: &dyn UserLookup) -> Vec<TxMessage> {
    let mut msgs = Vec::new();

    for tx in &block.transactions {
        if !tx.has_chain_id() {
            continue;
        }

        let from_user = lookup.user_id(&tx.from);
        let to_user = tx.to.as_ref().and_then(|to| lookup.user_id(to));

        if let Some(user) = from_user {
            msgs.push(TxMessage::new(user, tx, block.number));
        }
        if let Some(user) = to_user {
            msgs.push(TxMessage::new(user, tx, block.number));
        }
    }

    msgs
}

/// Queue ends a worker is wired to.
#[derive(Clone)]
pub struct WorkerQueues {
    pub blocks: Receiver<u64>,
    pub retries: Sender<u64>,
    pub completions: Sender<u64>,
}

/// Delays applied on the failure path.
#[derive(Debug, Clone, Copy)]
pub struct WorkerTiming {
    pub fetch_failure_delay: Duration,
    pub retry_send_timeout: Duration,
    pub retry_delay: Duration,
}

/// How handling one block ended.
enum Outcome {
    Done,
    Stop,
}

pub struct Worker {
    id: usize,
    fetcher: Arc<dyn BlockFetcher>,
    lookup: Arc<dyn UserLookup>,
    publisher: Arc<dyn Publisher>,
    queues: WorkerQueues,
    timing: WorkerTiming,
    metrics: Arc<PipelineMetrics>,
}

impl Worker {
    pub fn new(
        id: usize,
        fetcher: Arc<dyn BlockFetcher>,
        lookup: Arc<dyn UserLookup>,
        publisher: Arc<dyn Publisher>,
        queues: WorkerQueues,
        timing: WorkerTiming,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            id,
            fetcher,
            lookup,
            publisher,
            queues,
            timing,
            metrics,
        }
    }

    /// Process blocks until the input queue closes or `shutdown` fires.
    ///
    /// A publish failure is fatal: the worker cancels `shutdown` so the rest
    /// of the pipeline stops too, and returns the error.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        debug!("Worker {} started", self.id);

        loop {
            let number = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = self.queues.blocks.recv() => match next {
                    Ok(number) => number,
                    Err(_) => break,
                },
            };

            match self.handle(number, &shutdown).await {
                Ok(Outcome::Done) => {}
                Ok(Outcome::Stop) => break,
                Err(e) => {
                    error!("Worker {} stopping pipeline: {:#}", self.id, e);
                    shutdown.cancel();
                    return Err(e);
                }
            }
        }

        debug!("Worker {} stopped", self.id);
        Ok(())
    }

    async fn handle(&self, number: u64, shutdown: &CancellationToken) -> Result<Outcome> {
        loop {
            let block = match self.fetcher.fetch_block(number).await {
                Ok(block) => block,
                Err(e) => {
                    warn!("Failed to fetch block {}: {:#} (will retry later)", number, e);
                    self.metrics.fetch_failed();
                    if !sleep_or_cancel(self.timing.fetch_failure_delay, shutdown).await {
                        return Ok(Outcome::Stop);
                    }

                    // Bounded hand-off. A saturated retry path keeps the block
                    // here instead, which throttles this worker.
                    let send = tokio::time::timeout(
                        self.timing.retry_send_timeout,
                        self.queues.retries.send(number),
                    );
                    let sent = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return Ok(Outcome::Stop),
                        sent = send => sent,
                    };
                    match sent {
                        Ok(Ok(())) => {
                            self.metrics.retry_scheduled();
                            return Ok(Outcome::Done);
                        }
                        Ok(Err(_)) => return Ok(Outcome::Stop),
                        Err(_) => {
                            warn!(
                                "Retry queue saturated, worker {} retrying block {} itself",
                                self.id, number
                            );
                            if !sleep_or_cancel(self.timing.retry_delay, shutdown).await {
                                return Ok(Outcome::Stop);
                            }
                            continue;
                        }
                    }
                }
            };

            let msgs = extract_messages(&block, self.lookup.as_ref());
            debug!(
                "Block {}: {} transactions, {} messages",
                number,
                block.transactions.len(),
                msgs.len()
            );
            drop(block);

            if !msgs.is_empty() {
                let count = msgs.len();
                self.publisher
                    .publish(msgs)
                    .await
                    .with_context(|| format!("Failed to publish messages for block {}", number))?;
                self.metrics.messages_published(count);
            }

            // Acknowledge only after publishing: completion means "handled".
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(Outcome::Stop),
                sent = self.queues.completions.send(number) => {
                    return Ok(if sent.is_ok() { Outcome::Done } else { Outcome::Stop });
                }
            }
        }
    }
}

/// Sleep for `duration`; `false` if cancelled first.
pub(crate) async fn sleep_or_cancel(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
