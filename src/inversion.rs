//! Cache of decoding matrices keyed by erasure pattern
//!
//! Inverting the survivor sub-matrix is the expensive part of
//! reconstruction, and workloads tend to see the same few erasure patterns
//! over and over. The cache key is the bitmap of missing shard indices;
//! the value is a pure function of that set and the coding matrix, so an
//! entry may be evicted, or computed twice by racing callers, without
//! affecting correctness.

use crate::matrix::Matrix;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};

/// Wholesale-eviction threshold. Patterns repeat heavily in practice, so a
/// modest cap holds the working set; past it the map is simply cleared.
const MAX_ENTRIES: usize = 512;

/// 256 shard slots fit one bit each in four words
type PatternKey = [u64; 4];

fn pattern_key(missing: &[usize]) -> PatternKey {
    let mut key = [0u64; 4];
    for &idx in missing {
        debug_assert!(idx < 256);
        key[idx / 64] |= 1 << (idx % 64);
    }
    key
}

/// Internally synchronized decode-matrix cache
pub(crate) struct InversionCache {
    entries: Mutex<FxHashMap<PatternKey, Arc<Matrix>>>,
}

impl InversionCache {
    pub fn new() -> InversionCache {
        InversionCache {
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn get(&self, missing: &[usize]) -> Option<Arc<Matrix>> {
        let entries = self.entries.lock().unwrap();
        entries.get(&pattern_key(missing)).cloned()
    }

    /// Store a freshly computed decode matrix and return the shared handle.
    /// A racing insert for the same pattern keeps whichever lands last;
    /// both values are identical by construction.
    pub fn insert(&self, missing: &[usize], matrix: Matrix) -> Arc<Matrix> {
        let shared = Arc::new(matrix);
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= MAX_ENTRIES {
            entries.clear();
        }
        entries.insert(pattern_key(missing), Arc::clone(&shared));
        shared
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
