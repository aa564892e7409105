//! JSON-RPC client for Ethereum nodes
//!
//! Provides the [`BlockFetcher`] seam the pipeline consumes, plus a typed
//! HTTP implementation of it.

use crate::types::{parse_hex_u64, Block};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Source of blocks for the pipeline.
///
/// Every error is treated as transient by the pipeline, except a failed
/// head query at startup.
#[async_trait]
pub trait BlockFetcher: Send + Sync {
    /// Number of the current chain head.
    async fn current_head(&self) -> Result<u64>;

    /// Full block (with transaction objects) at `number`.
    async fn fetch_block(&self, number: u64) -> Result<Block>;
}

/// JSON-RPC client for Ethereum nodes.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, url })
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let json: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if let Some(error) = json.get("error") {
            anyhow::bail!("RPC error from {}: {}", method, error);
        }

        json.get("result")
            .cloned()
            .context("RPC response missing 'result' field")
    }

    /// Get the latest block number via `eth_blockNumber`.
    pub async fn get_block_number(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let number = result
            .as_str()
            .context("Block number response is not a string")?;
        parse_hex_u64(number).context("Failed to parse block number")
    }

    /// Get a block by number with full transaction objects.
    pub async fn get_block_by_number(&self, number: u64) -> Result<Block> {
        let params = json!([format!("0x{:x}", number), true]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        if result.is_null() {
            anyhow::bail!("Block {} not available yet", number);
        }
        serde_json::from_value(result)
            .with_context(|| format!("Failed to deserialize block {}", number))
    }
}

#[async_trait]
impl BlockFetcher for RpcClient {
    async fn current_head(&self) -> Result<u64> {
        self.get_block_number().await
    }

    async fn fetch_block(&self, number: u64) -> Result<Block> {
        self.get_block_by_number(number).await
    }
}
