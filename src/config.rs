//! Configuration and address-book loading
//!
//! `PipelineConfig` carries every tunable of the relay. Address books are
//! plain text files with one `<address> <user-id>` pair per line.

use crate::address_index::IndexSizing;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pause between head polls
    pub poll_interval: Duration,
    /// Number of concurrent block workers
    pub worker_count: usize,
    /// Capacity of each of the input, retry and completion queues
    pub queue_capacity: usize,
    /// Where the watermark is persisted
    pub checkpoint_path: PathBuf,
    pub index_sizing: IndexSizing,
    /// Pause after a failed block fetch before handing it to the retry queue
    pub fetch_failure_delay: Duration,
    /// How long the retry relay holds a block before re-enqueueing it
    pub retry_delay: Duration,
    /// Longest a worker waits on a full retry queue before retrying in place
    pub retry_send_timeout: Duration,
    /// Pause after a failed head query
    pub head_backoff: Duration,
    /// Persist the watermark when it lands on a multiple of this
    pub checkpoint_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            worker_count: 4,
            queue_capacity: 1000,
            checkpoint_path: PathBuf::from("checkpoint.txt"),
            index_sizing: IndexSizing::default(),
            fetch_failure_delay: Duration::from_millis(100),
            retry_delay: Duration::from_millis(200),
            retry_send_timeout: Duration::from_secs(1),
            head_backoff: Duration::from_secs(2),
            checkpoint_interval: 5,
        }
    }
}

impl PipelineConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            anyhow::bail!("worker count must be at least 1");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("queue capacity must be at least 1");
        }
        if self.checkpoint_interval == 0 {
            anyhow::bail!("checkpoint interval must be at least 1");
        }
        if self.index_sizing.expected_addresses == 0 {
            anyhow::bail!("expected address count must be at least 1");
        }
        let fp = self.index_sizing.false_positive_rate;
        if !(fp > 0.0 && fp < 1.0) {
            anyhow::bail!("false positive rate must be in (0, 1), got {}", fp);
        }
        Ok(())
    }
}

/// Load an address book from a file.
///
/// Each line holds an address (with or without 0x prefix) and a user id,
/// separated by whitespace or a comma. Empty lines and lines starting with
/// '#' are ignored. A repeated address keeps the last user id.
///
/// # Example file format:
/// ```text
/// 0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb alice
/// 0xdAC17F958D2ee523a2206206994597C13D831ec7,bob
/// # This is a comment
/// ```
pub fn load_address_book(path: &Path) -> Result<HashMap<Address, String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read address book: {:?}", path))?;

    let mut book = HashMap::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (addr, user) = parse_entry(line)
            .with_context(|| format!("Invalid entry on line {}: {}", line_num + 1, line))?;
        book.insert(addr, user);
    }

    if book.is_empty() {
        anyhow::bail!("Address book is empty (no valid entries found)");
    }

    Ok(book)
}

/// Deterministic address book of `count` entries: address `i` → `user-i`.
pub fn synthetic_address_book(count: usize) -> HashMap<Address, String> {
    (1..=count as u64)
        .map(|i| {
            let mut bytes = [0u8; 20];
            bytes[12..].copy_from_slice(&i.to_be_bytes());
            (Address::from(bytes), format!("user-{}", i))
        })
        .collect()
}

fn parse_entry(line: &str) -> Result<(Address, String)> {
    let mut parts = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty());
    let addr = parts.next().context("Missing address")?;
    let user = parts.next().context("Missing user id")?;
    if let Some(extra) = parts.next() {
        anyhow::bail!("Unexpected trailing field: {}", extra);
    }
    Ok((parse_address(addr)?, user.to_string()))
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("Invalid hex address: {}", s))?;

    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }

    Ok(Address::from_slice(&bytes))
}
