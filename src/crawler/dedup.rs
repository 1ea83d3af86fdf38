//! Dedup filter shared by every traversal worker
//!
//! Three key spaces are tracked independently: user identities, slugs whose
//! aggregate page was requested, and slugs whose external page was requested.
//! `insert` is the atomic check-then-mark used at admission time; two workers
//! racing on the same key see exactly one `true`.

use crate::crawler::FrontierError;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Mutex;

/// Key space of a dedup entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DedupKind {
    User,
    Slug,
    Page,
}

impl DedupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Slug => "slug",
            Self::Page => "page",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Set membership over the dedup key spaces
///
/// Implementations never report a marked key as unseen. Approximate
/// implementations may report an unmarked key as seen.
pub trait SeenSet: Send + Sync {
    /// Returns true if the key was marked before
    fn seen(&self, kind: DedupKind, key: &str) -> Result<bool, FrontierError>;

    /// Marks the key
    fn mark_seen(&self, kind: DedupKind, key: &str) -> Result<(), FrontierError> {
        self.insert(kind, key).map(|_| ())
    }

    /// Marks the key and returns true if it was not marked before
    fn insert(&self, kind: DedupKind, key: &str) -> Result<bool, FrontierError>;

    /// Forgets every key
    fn clear(&self) -> Result<(), FrontierError>;
}

/// Exact in-memory set, for runs small enough to keep every key
#[derive(Debug, Default)]
pub struct ExactSeenSet {
    sets: Mutex<[HashSet<String>; 3]>,
}

impl ExactSeenSet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeenSet for ExactSeenSet {
    fn seen(&self, kind: DedupKind, key: &str) -> Result<bool, FrontierError> {
        let sets = self.sets.lock().map_err(|_| FrontierError::Poisoned)?;
        Ok(sets[kind.index()].contains(key))
    }

    fn insert(&self, kind: DedupKind, key: &str) -> Result<bool, FrontierError> {
        let mut sets = self.sets.lock().map_err(|_| FrontierError::Poisoned)?;
        Ok(sets[kind.index()].insert(key.to_string()))
    }

    fn clear(&self) -> Result<(), FrontierError> {
        let mut sets = self.sets.lock().map_err(|_| FrontierError::Poisoned)?;
        for set in sets.iter_mut() {
            set.clear();
        }
        Ok(())
    }
}

/// Bloom filter over all key spaces
///
/// Memory is fixed at construction from the expected key count and target
/// false-positive rate. A false positive drops a request that was actually
/// new; a false negative cannot happen.
#[derive(Debug)]
pub struct BloomSeenSet {
    filter: Mutex<BloomFilter>,
}

impl BloomSeenSet {
    pub fn new(expected_items: u64, false_positive_rate: f64) -> Self {
        Self {
            filter: Mutex::new(BloomFilter::with_rate(expected_items, false_positive_rate)),
        }
    }

    /// Number of bits backing the filter
    pub fn bit_len(&self) -> u64 {
        self.filter.lock().map(|f| f.num_bits).unwrap_or(0)
    }
}

impl SeenSet for BloomSeenSet {
    fn seen(&self, kind: DedupKind, key: &str) -> Result<bool, FrontierError> {
        let filter = self.filter.lock().map_err(|_| FrontierError::Poisoned)?;
        Ok(filter.contains(kind, key))
    }

    fn insert(&self, kind: DedupKind, key: &str) -> Result<bool, FrontierError> {
        let mut filter = self.filter.lock().map_err(|_| FrontierError::Poisoned)?;
        Ok(filter.insert(kind, key))
    }

    fn clear(&self) -> Result<(), FrontierError> {
        let mut filter = self.filter.lock().map_err(|_| FrontierError::Poisoned)?;
        filter.bits.iter_mut().for_each(|word| *word = 0);
        Ok(())
    }
}

#[derive(Debug)]
struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    fn with_rate(expected_items: u64, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;

        let num_bits = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().clamp(1.0, 32.0) as u32;
        let words = num_bits.div_ceil(64) as usize;

        Self {
            bits: vec![0; words],
            num_bits,
            num_hashes,
        }
    }

    /// Double hashing over one SHA-256 digest of the kind-prefixed key
    fn bit_indexes(&self, kind: DedupKind, key: &str) -> impl Iterator<Item = u64> {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();

        let mut first = [0u8; 8];
        let mut second = [0u8; 8];
        first.copy_from_slice(&digest[0..8]);
        second.copy_from_slice(&digest[8..16]);
        let h1 = u64::from_le_bytes(first);
        let h2 = u64::from_le_bytes(second) | 1;

        let m = self.num_bits;
        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
    }

    fn contains(&self, kind: DedupKind, key: &str) -> bool {
        self.bit_indexes(kind, key)
            .all(|bit| self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0)
    }

    fn insert(&mut self, kind: DedupKind, key: &str) -> bool {
        let bits: Vec<u64> = self.bit_indexes(kind, key).collect();
        let mut newly_set = false;
        for bit in bits {
            let word = &mut self.bits[(bit / 64) as usize];
            let mask = 1 << (bit % 64);
            if *word & mask == 0 {
                *word |= mask;
                newly_set = true;
            }
        }
        newly_set
    }
}
