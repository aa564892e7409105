//! Bloom filter used as the negative fast path of the address index
//!
//! Sizing follows the usual formulas:
//! - m = -n*ln(p) / (ln(2)^2)  -- bits
//! - k = (m/n) * ln(2)         -- hash functions
//!
//! Positions are derived by double hashing two MurmurHash3 seeds:
//! h(i) = h1 + i * h2 (mod m).

use bitvec::prelude::*;
use std::f64::consts::LN_2;
use std::io::Cursor;

/// Probabilistic set membership with no false negatives.
#[derive(Clone, Debug)]
pub struct BloomFilter {
    bits: BitVec<u64, Lsb0>,
    /// Number of hash functions (k)
    k: usize,
    /// Size in bits (m)
    m: usize,
    /// Number of elements inserted (n)
    n: usize,
}

impl BloomFilter {
    /// Create an empty filter with explicit `m` bits and `k` hash functions.
    pub fn new(m: usize, k: usize) -> Self {
        let m = m.max(1);
        Self {
            bits: bitvec![u64, Lsb0; 0; m],
            k: k.clamp(1, 32),
            m,
            n: 0,
        }
    }

    /// Create a filter sized to hold `expected` elements at `fp_rate`.
    pub fn with_estimates(expected: usize, fp_rate: f64) -> Self {
        let (m, k) = optimal_parameters(expected, fp_rate);
        Self::new(m, k)
    }

    /// Insert an element. `contains(element)` is true from here on.
    pub fn insert(&mut self, element: &[u8]) {
        let (h1, h2) = base_hashes(element);
        for i in 0..self.k {
            let pos = self.position(h1, h2, i);
            self.bits.set(pos, true);
        }
        self.n += 1;
    }

    /// `false` means definitely absent; `true` means possibly present.
    pub fn contains(&self, element: &[u8]) -> bool {
        let (h1, h2) = base_hashes(element);
        (0..self.k).all(|i| self.bits[self.position(h1, h2, i)])
    }

    /// FPR = (1 - e^(-kn/m))^k for the current fill.
    pub fn estimated_false_positive_rate(&self) -> f64 {
        let exponent = -(self.k as f64) * (self.n as f64) / (self.m as f64);
        (1.0 - exponent.exp()).powi(self.k as i32)
    }

    pub fn size_bits(&self) -> usize {
        self.m
    }

    pub fn hash_count(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    fn position(&self, h1: u64, h2: u64, i: usize) -> usize {
        (h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.m as u64) as usize
    }
}

/// Optimal (m, k) for `n` elements at false-positive rate `p`.
pub fn optimal_parameters(n: usize, p: f64) -> (usize, usize) {
    if n == 0 {
        return (1, 1);
    }
    let n = n as f64;
    let m = (-n * p.ln() / (LN_2 * LN_2)).ceil().max(1.0) as usize;
    let k = ((m as f64 / n) * LN_2).round() as usize;
    (m, k.clamp(1, 32))
}

fn murmur(element: &[u8], seed: u32) -> u64 {
    // Reading from an in-memory cursor cannot fail.
    murmur3::murmur3_x64_128(&mut Cursor::new(element), seed).unwrap_or(0) as u64
}

fn base_hashes(element: &[u8]) -> (u64, u64) {
    // An odd h2 keeps the probe sequence from collapsing onto one bit.
    (murmur(element, 0), murmur(element, 1) | 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimal_parameters() {
        // 1000 elements at 1% => ~9586 bits, 7 hashes
        let (m, k) = optimal_parameters(1000, 0.01);
        assert!((9500..9700).contains(&m), "m = {}", m);
        assert_eq!(k, 7);

        assert_eq!(optimal_parameters(0, 0.01), (1, 1));
    }

    #[test]
    fn test_no_false_negatives() {
        let mut filter = BloomFilter::with_estimates(5_000, 0.001);
        for i in 0u32..5_000 {
            filter.insert(&i.to_be_bytes());
        }
        for i in 0u32..5_000 {
            assert!(filter.contains(&i.to_be_bytes()), "lost element {}", i);
        }
        assert_eq!(filter.len(), 5_000);
    }

    #[test]
    fn test_false_positive_rate_holds() {
        let mut filter = BloomFilter::with_estimates(10_000, 0.01);
        for i in 0u64..10_000 {
            filter.insert(&i.to_le_bytes());
        }

        let trials = 20_000u64;
        let hits = (1_000_000u64..1_000_000 + trials)
            .filter(|i| filter.contains(&i.to_le_bytes()))
            .count();
        let observed = hits as f64 / trials as f64;
        // Generous margin over the configured 1%
        assert!(observed < 0.03, "observed FPR {}", observed);
        assert!(filter.estimated_false_positive_rate() < 0.02);
    }

    #[test]
    fn test_empty_filter_rejects() {
        let filter = BloomFilter::with_estimates(100, 0.01);
        assert!(filter.is_empty());
        assert!(!filter.contains(b"anything"));
    }
}
