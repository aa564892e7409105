//! Watched-address index
//!
//! Two levels: a bloom filter answers "definitely not watched" for the vast
//! majority of addresses seen on chain, and an exact map resolves the rest
//! to the owning user. Built once, then shared read-only by every worker.

use crate::bloom::BloomFilter;
use alloy_primitives::Address;
use std::collections::HashMap;
use tracing::{info, warn};

/// Lookup of the user that owns an address.
pub trait UserLookup: Send + Sync {
    /// The owning user id, or `None` if the address is not watched.
    fn user_id(&self, addr: &Address) -> Option<&str>;
}

/// Bloom filter sizing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexSizing {
    /// Should exceed the real address count so the filter keeps spare zero bits.
    pub expected_addresses: usize,
    pub false_positive_rate: f64,
}

impl Default for IndexSizing {
    fn default() -> Self {
        Self {
            expected_addresses: 600_000,
            false_positive_rate: 0.0001,
        }
    }
}

/// Immutable address → user index.
pub struct AddressIndex {
    bloom: BloomFilter,
    users: HashMap<Address, String>,
}

impl AddressIndex {
    /// Build the index from a full address book.
    pub fn build(sizing: IndexSizing, addresses: HashMap<Address, String>) -> Self {
        if addresses.len() > sizing.expected_addresses {
            warn!(
                "Address book has {} entries but the filter was sized for {}; false positive rate will exceed {}",
                addresses.len(),
                sizing.expected_addresses,
                sizing.false_positive_rate
            );
        }

        let mut bloom =
            BloomFilter::with_estimates(sizing.expected_addresses, sizing.false_positive_rate);
        for addr in addresses.keys() {
            bloom.insert(addr.as_slice());
        }

        info!(
            "Built address index: {} addresses, {} filter bits, {} hashes, est. FPR {:.6}",
            addresses.len(),
            bloom.size_bits(),
            bloom.hash_count(),
            bloom.estimated_false_positive_rate()
        );

        Self {
            bloom,
            users: addresses,
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserLookup for AddressIndex {
    #[inline]
    fn user_id(&self, addr: &Address) -> Option<&str> {
        if !self.bloom.contains(addr.as_slice()) {
            return None;
        }
        self.users.get(addr).map(String::as_str)
    }
}
