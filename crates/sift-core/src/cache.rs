//! Per-chunk, per-token result memo with prefix/suffix reuse.
//!
//! Sealed (full) chunks are immutable, so a token's matches against one
//! never change and can be memoised. Only high-selectivity results are kept:
//! a set larger than [`MAX_CACHED_RESULTS`] is silently dropped, since
//! rescoring a long list buys nothing over rescanning the chunk.
//!
//! When a query extends or trims a previous one, its matches are a subset of
//! the narrower key's matches against the same chunk. [`ChunkCache::search`]
//! exploits that: it probes sub-keys of the query — characters removed from
//! the end (prefix keys) and from the start (suffix keys), alternating,
//! longest first — and returns the first cached superset for the caller to
//! rescore. A flat map per chunk is deliberate; with at most `len(query)`
//! probes a trie would be overkill.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::store::{CHUNK_CAPACITY, Item};

/// Largest result set worth caching (`CHUNK_CAPACITY / 5`).
pub const MAX_CACHED_RESULTS: usize = CHUNK_CAPACITY / 5;

// =============================================================================
// TokenMatch
// =============================================================================

/// One item's hit for a single query token. Carries the first matched
/// position so multi-token queries can recombine ordering keys later.
#[derive(Debug, Clone, Copy)]
pub struct TokenMatch {
    /// The matched candidate.
    pub item: Item,
    /// Score of this token against the item.
    pub score: i32,
    /// First matched byte offset (greedy anchor).
    pub first_pos: u16,
}

// =============================================================================
// ChunkCache
// =============================================================================

/// `chunk_index → (token → results)` memo. Internal lock, never held across
/// external calls; entries exist only for sealed chunks.
#[derive(Debug, Default)]
pub struct ChunkCache {
    inner: Mutex<HashMap<usize, HashMap<String, Arc<Vec<TokenMatch>>>>>,
}

impl ChunkCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact hit for `query` against chunk `chunk_index`. Only sealed
    /// (full) chunks are ever cached, so `chunk_count` must equal the chunk
    /// capacity.
    #[must_use]
    pub fn lookup(
        &self,
        chunk_index: usize,
        chunk_count: usize,
        query: &str,
    ) -> Option<Arc<Vec<TokenMatch>>> {
        if chunk_count != CHUNK_CAPACITY {
            return None;
        }
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.get(&chunk_index)?.get(query).cloned()
    }

    /// Find a cached superset of `query`'s matches by probing narrower
    /// sub-keys: drop characters from the end, then from the start,
    /// alternating, longest first. The caller must rescore the returned
    /// items against the full query.
    #[must_use]
    pub fn search(
        &self,
        chunk_index: usize,
        chunk_count: usize,
        query: &str,
    ) -> Option<Arc<Vec<TokenMatch>>> {
        if chunk_count != CHUNK_CAPACITY {
            return None;
        }
        let inner = self.inner.lock().expect("cache lock poisoned");
        let by_query = inner.get(&chunk_index)?;

        let starts: Vec<usize> = query.char_indices().map(|(i, _)| i).collect();
        let chars = starts.len();
        for drop in 1..chars {
            let prefix = &query[..starts[chars - drop]];
            if let Some(hit) = by_query.get(prefix) {
                return Some(Arc::clone(hit));
            }
            let suffix = &query[starts[drop]..];
            if let Some(hit) = by_query.get(suffix) {
                return Some(Arc::clone(hit));
            }
        }
        None
    }

    /// Memoise `results` for `query` against a sealed chunk. Writes for
    /// unsealed chunks or low-selectivity sets are silently dropped.
    pub fn add(
        &self,
        chunk_index: usize,
        chunk_count: usize,
        query: &str,
        results: Arc<Vec<TokenMatch>>,
    ) {
        if chunk_count != CHUNK_CAPACITY || results.len() > MAX_CACHED_RESULTS {
            return;
        }
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner
            .entry(chunk_index)
            .or_default()
            .insert(query.to_string(), results);
    }

    /// Drop every entry. Called when the store has grown a new sealed chunk.
    pub fn clear(&self) {
        self.inner.lock().expect("cache lock poisoned").clear();
    }

    /// Number of cached `(chunk, query)` entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.inner
            .lock()
            .expect("cache lock poisoned")
            .values()
            .map(HashMap::len)
            .sum()
    }
}

// =============================================================================
// Tests
// =============================================================================
