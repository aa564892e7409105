//! Blockrelay - Ethereum transaction relay for watched addresses
//!
//! Follows the chain head, fetches blocks with a pool of workers, picks out
//! transactions that touch any of a large set of watched addresses and
//! publishes them downstream. A contiguous watermark is checkpointed so a
//! restart resumes where processing safely left off.

pub mod address_index;
pub mod bloom;
pub mod checkpoint;
pub mod config;
pub mod metrics;
pub mod publisher;
pub mod records;
pub mod retry;
pub mod rpc;
pub mod tracker;
pub mod types;
pub mod watcher;
pub mod worker;

// Re-export the main types for convenience
pub use address_index::{AddressIndex, IndexSizing, UserLookup};
pub use checkpoint::{CheckpointStore, FileCheckpointStore};
pub use config::PipelineConfig;
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use publisher::Publisher;
pub use records::TxMessage;
pub use rpc::{BlockFetcher, RpcClient};
pub use watcher::Watcher;
