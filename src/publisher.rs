//! Downstream message sinks
//!
//! The pipeline hands each block's matches to a [`Publisher`] as one batch.
//! Publishers own their retry policy; an error means they gave up and the
//! pipeline shuts down.

use crate::records::TxMessage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver a batch. `Err` is fatal to the pipeline.
    async fn publish(&self, batch: Vec<TxMessage>) -> Result<()>;
}

/// Writes each message as a JSON line on stdout.
#[derive(Debug, Default)]
pub struct StdoutPublisher;

#[async_trait]
impl Publisher for StdoutPublisher {
    async fn publish(&self, batch: Vec<TxMessage>) -> Result<()> {
        let mut out = std::io::stdout().lock();
        for msg in &batch {
            let line = serde_json::to_string(msg).context("Failed to encode message")?;
            writeln!(out, "{}", line).context("Failed to write message to stdout")?;
        }
        out.flush().context("Failed to flush stdout")
    }
}

#[cfg(feature = "kafka")]
pub use kafka::KafkaPublisher;

#[cfg(feature = "kafka")]
mod kafka {
    use super::Publisher;
    use crate::records::TxMessage;
    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use futures::future::join_all;
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;
    use std::time::Duration;
    use tracing::warn;

    const MAX_ATTEMPTS: u32 = 10;

    /// Kafka sink: one record per message, keyed by transaction hash.
    pub struct KafkaPublisher {
        producer: FutureProducer,
        topic: String,
    }

    impl KafkaPublisher {
        pub fn new(broker: &str, topic: &str) -> Result<Self> {
            Self::with_delivery_timeout(broker, topic, Duration::from_secs(30))
        }

        /// Producer whose per-message delivery gives up after `timeout`.
        pub fn with_delivery_timeout(broker: &str, topic: &str, timeout: Duration) -> Result<Self> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", broker)
                .set("message.timeout.ms", timeout.as_millis().to_string())
                .create()
                .with_context(|| format!("Failed to create Kafka producer for {}", broker))?;
            Ok(Self {
                producer,
                topic: topic.to_string(),
            })
        }

        /// Enqueue the whole batch, then wait for every delivery report.
        async fn send_all(&self, encoded: &[(String, String)]) -> Result<()> {
            let deliveries = encoded.iter().map(|(key, payload)| {
                let record = FutureRecord::to(&self.topic).key(key).payload(payload);
                self.producer.send(record, Timeout::Never)
            });
            let reports = join_all(deliveries).await;

            for ((key, _), report) in encoded.iter().zip(reports) {
                report
                    .map_err(|(e, _)| anyhow::anyhow!(e))
                    .with_context(|| format!("Failed to deliver message for tx {}", key))?;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Publisher for KafkaPublisher {
        async fn publish(&self, batch: Vec<TxMessage>) -> Result<()> {
            let encoded = batch
                .iter()
                .map(|msg| Ok((msg.hash.clone(), serde_json::to_string(msg)?)))
                .collect::<Result<Vec<_>, serde_json::Error>>()
                .context("Failed to encode messages")?;

            let mut attempt = 0;
            loop {
                match self.send_all(&encoded).await {
                    Ok(()) => return Ok(()),
                    Err(e) if attempt + 1 < MAX_ATTEMPTS => {
                        warn!("Kafka write failed (attempt {}): {:#}", attempt + 1, e);
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        return Err(e).context(format!(
                            "Failed to write to Kafka after {} attempts",
                            MAX_ATTEMPTS
                        ))
                    }
                }
            }
        }
    }

}
