//! Retry relay
//!
//! Drains the retry queue and feeds each failed block back into the input
//! queue after a fixed delay. Retried blocks therefore re-enter behind
//! freshly discovered ones; the ack tracker keeps the watermark honest.

use crate::worker::sleep_or_cancel;
use async_channel::{Receiver, Sender};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct RetryRelay {
    retries: Receiver<u64>,
    blocks: Sender<u64>,
    delay: Duration,
}

impl RetryRelay {
    pub fn new(retries: Receiver<u64>, blocks: Sender<u64>, delay: Duration) -> Self {
        Self {
            retries,
            blocks,
            delay,
        }
    }

    /// Relay until either queue closes or `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            let number = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = self.retries.recv() => match next {
                    Ok(number) => number,
                    Err(_) => break,
                },
            };

            if !sleep_or_cancel(self.delay, &shutdown).await {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = self.blocks.send(number) => {
                    if sent.is_err() {
                        break;
                    }
                    debug!("Re-enqueued block {}", number);
                }
            }
        }
        debug!("Retry relay stopped");
    }
}
