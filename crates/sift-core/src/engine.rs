//! Parallel matching engine.
//!
//! Takes a query and a store snapshot, fans the snapshot's chunks out over
//! scoped worker threads, and merges each worker's bounded heap into one
//! top-K result. Queries are whitespace-tokenised with AND semantics: a
//! candidate survives only when every token matches, and its score is the
//! sum of per-token scores.
//!
//! Sealed chunks are memoised in a [`ChunkCache`]: an exact hit skips the
//! scan entirely, and a narrower cached sub-query provides a superset that
//! only needs rescoring. The memo is cleared whenever a pass observes a
//! snapshot with more sealed chunks than the previous one.
//!
//! Cancellation is deliberately coarse: workers check the flag between
//! chunks, not inside the scoring loop, which keeps the hot path free of
//! branches at no perceptible latency cost.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crate::arena::TextArena;
use crate::cache::{ChunkCache, TokenMatch};
use crate::rank::{MatchedItem, Scheme, TopK, pack_points, scheme_key};
use crate::score::{self, MatcherScratch, PreparedPattern};
use crate::store::{Item, Snapshot};

/// Result count for one non-interactive pass.
pub const DEFAULT_TOP_K: usize = 30;
/// Upper bound on matching workers regardless of core count.
pub const MAX_WORKERS: usize = 16;

// =============================================================================
// MatchOptions
// =============================================================================

/// Per-pass knobs, resolved from config and CLI flags.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Disable ASCII case folding in pre-filter and scoring.
    pub case_sensitive: bool,
    /// Secondary ordering policy.
    pub scheme: Scheme,
    /// Bound on returned results. Interactive callers pass the visible row
    /// count; tooling uses [`DEFAULT_TOP_K`].
    pub top_k: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            scheme: Scheme::Default,
            top_k: DEFAULT_TOP_K,
        }
    }
}

// =============================================================================
// MatchingEngine
// =============================================================================

/// The engine owns the chunk memo and the sealed-boundary watermark; one
/// instance serves a whole matching session.
#[derive(Debug, Default)]
pub struct MatchingEngine {
    cache: ChunkCache,
    sealed_seen: AtomicUsize,
}

impl MatchingEngine {
    /// Create an engine with an empty memo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The chunk memo (exposed for coherence tests).
    #[must_use]
    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }

    /// Run one matching pass over a snapshot.
    ///
    /// Returns `None` when the pass was cancelled; partial results are
    /// discarded. For a fixed `(snapshot, query)` the output is
    /// deterministic: scoring is pure, partitioning depends only on chunk
    /// count and worker count, and ties break on the ingestion index.
    #[must_use]
    pub fn run(
        &self,
        query: &str,
        snapshot: &Snapshot,
        arena: &TextArena,
        options: &MatchOptions,
        cancel: &AtomicBool,
    ) -> Option<Vec<MatchedItem>> {
        // A new sealed chunk invalidates every memo entry.
        let sealed = snapshot.sealed_chunk_count();
        if self.sealed_seen.swap(sealed, Ordering::AcqRel) != sealed {
            self.cache.clear();
        }

        let tokens: Vec<&str> = query.split_ascii_whitespace().collect();
        if tokens.is_empty() {
            return self.run_empty(snapshot, options, cancel);
        }

        let patterns: Vec<PreparedPattern> = tokens
            .iter()
            .map(|t| PreparedPattern::new(t, options.case_sensitive))
            .collect();
        let longest = longest_token(&tokens);

        let chunk_count = snapshot.chunk_count();
        if chunk_count == 0 {
            return Some(Vec::new());
        }
        let workers = worker_count(chunk_count);
        tracing::debug!(query, chunk_count, workers, "matching pass");

        let mut merged = TopK::new(options.top_k);
        let mut cancelled = false;
        // Workers borrow the prepared query state; only the range moves in.
        let tokens = &tokens;
        let patterns = &patterns;
        thread::scope(|scope| {
            let handles: Vec<_> = partition(chunk_count, workers)
                .into_iter()
                .map(|range| {
                    scope.spawn(move || {
                        let mut scratch = MatcherScratch::new();
                        let mut topk = TopK::new(options.top_k);
                        for chunk_index in range {
                            if cancel.load(Ordering::Acquire) {
                                return None;
                            }
                            self.match_chunk(
                                chunk_index,
                                snapshot.chunk_at(chunk_index),
                                tokens,
                                patterns,
                                longest,
                                arena,
                                options,
                                &mut scratch,
                                &mut topk,
                            );
                        }
                        Some(topk)
                    })
                })
                .collect();
            for handle in handles {
                match handle.join() {
                    Ok(Some(topk)) => merged.merge(topk),
                    Ok(None) => cancelled = true,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
        });

        if cancelled || cancel.load(Ordering::Acquire) {
            return None;
        }
        Some(merged.into_sorted_descending())
    }

    /// Rerun a query against a previous result's items instead of a full
    /// snapshot. Used by incremental narrowing: when a query strictly
    /// extends the previous one, its matches are a subset of the previous
    /// matches, so only that pool needs rescoring. Bypasses the chunk memo.
    #[must_use]
    pub fn run_narrowed(
        &self,
        query: &str,
        pool: &[MatchedItem],
        arena: &TextArena,
        options: &MatchOptions,
        cancel: &AtomicBool,
    ) -> Option<Vec<MatchedItem>> {
        let tokens: Vec<&str> = query.split_ascii_whitespace().collect();
        let patterns: Vec<PreparedPattern> = tokens
            .iter()
            .map(|t| PreparedPattern::new(t, options.case_sensitive))
            .collect();
        let longest = longest_token(&tokens);

        let mut scratch = MatcherScratch::new();
        let mut topk = TopK::new(options.top_k);
        for previous in pool {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            let item = previous.item;
            let rescored = arena.read_with(item.window(), |text| {
                let mut total = 0;
                let mut anchor = 0u16;
                for (ti, pattern) in patterns.iter().enumerate() {
                    let result = score::score(pattern, text, &mut scratch)?;
                    total += result.score;
                    if ti == longest {
                        anchor = result.first_pos;
                    }
                }
                Some((total, scheme_key(options.scheme, text, anchor)))
            });
            if let Some((total, skey)) = rescored {
                topk.push(MatchedItem {
                    item,
                    score: total,
                    points: pack_points(total, skey, item.length, item.index),
                });
            }
        }
        Some(topk.into_sorted_descending())
    }

    /// Empty-pattern path: every item matches with score 0 and ordering
    /// falls through to `(length asc, index asc)`.
    fn run_empty(
        &self,
        snapshot: &Snapshot,
        options: &MatchOptions,
        cancel: &AtomicBool,
    ) -> Option<Vec<MatchedItem>> {
        let skey = scheme_key(options.scheme, &[], 0);
        let mut topk = TopK::new(options.top_k);
        for item in snapshot.iter() {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            topk.push(MatchedItem {
                item,
                score: 0,
                points: pack_points(0, skey, item.length, item.index),
            });
        }
        Some(topk.into_sorted_descending())
    }

    /// Match every token against one chunk, intersect, and push survivors.
    #[allow(clippy::too_many_arguments)]
    fn match_chunk(
        &self,
        chunk_index: usize,
        items: &[Item],
        tokens: &[&str],
        patterns: &[PreparedPattern],
        longest: usize,
        arena: &TextArena,
        options: &MatchOptions,
        scratch: &mut MatcherScratch,
        topk: &mut TopK,
    ) {
        let chunk_len = items.len();

        // Per-token hit sets, each sorted by ingestion index.
        let mut sets: Vec<Arc<Vec<TokenMatch>>> = Vec::with_capacity(patterns.len());
        for (token, pattern) in tokens.iter().zip(patterns) {
            if let Some(exact) = self.cache.lookup(chunk_index, chunk_len, token) {
                sets.push(exact);
                continue;
            }
            let set = if let Some(superset) = self.cache.search(chunk_index, chunk_len, token) {
                Arc::new(rescore(&superset, pattern, arena, scratch))
            } else {
                Arc::new(scan(items, pattern, arena, scratch))
            };
            self.cache
                .add(chunk_index, chunk_len, token, Arc::clone(&set));
            sets.push(set);
        }

        // AND-intersect by index, summing scores and keeping the longest
        // token's first-match anchor for the scheme key.
        let mut survivors: Vec<(Item, i32, u16)> = sets[0]
            .iter()
            .map(|hit| {
                let anchor = if longest == 0 { hit.first_pos } else { 0 };
                (hit.item, hit.score, anchor)
            })
            .collect();
        for (ti, set) in sets.iter().enumerate().skip(1) {
            if survivors.is_empty() {
                break;
            }
            let mut joined = Vec::with_capacity(survivors.len().min(set.len()));
            let mut right = set.iter().peekable();
            for (item, total, anchor) in survivors {
                while right.next_if(|hit| hit.item.index < item.index).is_some() {}
                if let Some(hit) = right.next_if(|hit| hit.item.index == item.index) {
                    let anchor = if ti == longest { hit.first_pos } else { anchor };
                    joined.push((item, total + hit.score, anchor));
                }
            }
            survivors = joined;
        }

        for (item, total, anchor) in survivors {
            let skey = if matches!(options.scheme, Scheme::Path) {
                arena.read_with(item.window(), |text| {
                    scheme_key(options.scheme, text, anchor)
                })
            } else {
                scheme_key(options.scheme, &[], 0)
            };
            topk.push(MatchedItem {
                item,
                score: total,
                points: pack_points(total, skey, item.length, item.index),
            });
        }
    }
}

/// Scan every item of a chunk against one pattern.
fn scan(
    items: &[Item],
    pattern: &PreparedPattern,
    arena: &TextArena,
    scratch: &mut MatcherScratch,
) -> Vec<TokenMatch> {
    let mut out = Vec::new();
    for &item in items {
        let result = arena.read_with(item.window(), |text| score::score(pattern, text, scratch));
        if let Some(result) = result {
            out.push(TokenMatch {
                item,
                score: result.score,
                first_pos: result.first_pos,
            });
        }
    }
    out
}

/// Rescore a cached superset against a (narrower) pattern. Preserves index
/// order, so the output stays merge-joinable.
fn rescore(
    superset: &[TokenMatch],
    pattern: &PreparedPattern,
    arena: &TextArena,
    scratch: &mut MatcherScratch,
) -> Vec<TokenMatch> {
    let mut out = Vec::new();
    for hit in superset {
        let result =
            arena.read_with(hit.item.window(), |text| score::score(pattern, text, scratch));
        if let Some(result) = result {
            out.push(TokenMatch {
                item: hit.item,
                score: result.score,
                first_pos: result.first_pos,
            });
        }
    }
    out
}

/// Index of the longest token; the first one on ties.
fn longest_token(tokens: &[&str]) -> usize {
    let mut longest = 0;
    for (i, token) in tokens.iter().enumerate() {
        if token.len() > tokens[longest].len() {
            longest = i;
        }
    }
    longest
}

/// Worker count for a pass: hardware parallelism clamped to
/// `[1, MAX_WORKERS]`, never more than one worker per chunk.
fn worker_count(chunk_count: usize) -> usize {
    let hardware = thread::available_parallelism().map_or(1, std::num::NonZero::get);
    hardware.clamp(1, MAX_WORKERS).min(chunk_count)
}

/// Split `0..chunk_count` into `workers` contiguous runs of near-equal size.
fn partition(chunk_count: usize, workers: usize) -> Vec<Range<usize>> {
    (0..workers)
        .map(|w| {
            let start = w * chunk_count / workers;
            let end = (w + 1) * chunk_count / workers;
            start..end
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
