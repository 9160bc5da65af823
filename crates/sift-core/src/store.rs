//! Chunked candidate store with point-in-time snapshots.
//!
//! Items arrive in ingestion order and are grouped into fixed-capacity
//! chunks: the unit of caching and work partitioning. Sealed chunks are
//! immutable and shared between snapshots via `Arc`; only the tail chunk is
//! ever written. A snapshot is a value type — the sealed sequence is shared
//! copy-on-write and the tail is copied by value — so matching workers can
//! read it freely while ingest keeps appending to the live store.
//!
//! # Architecture
//!
//! ```text
//! ingest ──► CandidateStore::register ──► ChunkedStore
//!                                           ├── sealed: Arc<[Arc<Chunk>]>  (immutable)
//!                                           └── tail: Chunk                (write target)
//! workers ◄── Snapshot { sealed clone, tail copy }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::arena::{TextArena, Window};

/// Fixed number of items per chunk.
pub const CHUNK_CAPACITY: usize = 100;

// =============================================================================
// Item
// =============================================================================

/// One candidate line: an arena window plus its ingestion index.
///
/// Items are immutable once published and cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    /// Ingestion order, monotonic from 0.
    pub index: u32,
    /// Arena byte offset.
    pub offset: u32,
    /// Line length in bytes.
    pub length: u16,
}

impl Item {
    /// The arena window covering this item's text.
    #[must_use]
    pub fn window(&self) -> Window {
        Window {
            offset: self.offset,
            length: self.length,
        }
    }
}

// =============================================================================
// Chunk
// =============================================================================

/// A fixed-capacity batch of items. Either sealed (full, immutable) or the
/// store's current tail.
#[derive(Debug, Clone)]
pub struct Chunk {
    items: Vec<Item>,
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk {
    /// Create an empty chunk with full capacity reserved.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::with_capacity(CHUNK_CAPACITY),
        }
    }

    /// Number of items held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the chunk holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the chunk reached capacity and is due for sealing.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() == CHUNK_CAPACITY
    }

    /// The items as a slice.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    fn push(&mut self, item: Item) {
        assert!(!self.is_full(), "chunk over-fill: sealing policy violated");
        self.items.push(item);
    }

    fn shrink_to_fit(&mut self) {
        self.items.shrink_to_fit();
    }
}

// =============================================================================
// ChunkedStore
// =============================================================================

/// Ordered sealed chunks plus one tail. Written only by the ingest side.
#[derive(Debug)]
pub struct ChunkedStore {
    sealed: Arc<Vec<Arc<Chunk>>>,
    tail: Chunk,
    total: usize,
}

impl Default for ChunkedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sealed: Arc::new(Vec::new()),
            tail: Chunk::new(),
            total: 0,
        }
    }

    /// Append one item. Seals the tail first when it is full, so sealed
    /// chunk `k` always holds exactly the indices `[k*C, (k+1)*C)`.
    pub fn append(&mut self, item: Item) {
        if self.tail.is_full() {
            let sealed = Arc::new(std::mem::replace(&mut self.tail, Chunk::new()));
            let mut chunks = Vec::with_capacity(self.sealed.len() + 1);
            chunks.extend(self.sealed.iter().cloned());
            chunks.push(sealed);
            self.sealed = Arc::new(chunks);
        }
        self.tail.push(item);
        self.total += 1;
    }

    /// Total items appended.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.total
    }

    /// O(1) point-in-time view: shared sealed sequence, by-value tail copy.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            sealed: Arc::clone(&self.sealed),
            tail: self.tail.clone(),
            count: self.total,
        }
    }

    /// Release tail headroom after ingest completes.
    pub fn shrink_to_fit(&mut self) {
        self.tail.shrink_to_fit();
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Immutable view of the store at a point in time. Safe to share across
/// threads; later writes to the live store are invisible to it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    sealed: Arc<Vec<Arc<Chunk>>>,
    tail: Chunk,
    count: usize,
}

impl Snapshot {
    /// Total items visible in this snapshot.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether the snapshot holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of sealed (full, cacheable) chunks.
    #[must_use]
    pub fn sealed_chunk_count(&self) -> usize {
        self.sealed.len()
    }

    /// Number of chunks including a non-empty tail.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.sealed.len() + usize::from(!self.tail.is_empty())
    }

    /// Items of chunk `k`.
    ///
    /// # Panics
    ///
    /// Panics when `k >= chunk_count()` (programmer invariant violation).
    #[must_use]
    pub fn chunk_at(&self, k: usize) -> &[Item] {
        if k < self.sealed.len() {
            self.sealed[k].items()
        } else {
            assert!(
                k == self.sealed.len() && !self.tail.is_empty(),
                "snapshot chunk index {k} out of range"
            );
            self.tail.items()
        }
    }

    /// Item at global index `i`, if present.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<Item> {
        if i >= self.count {
            return None;
        }
        let (chunk, slot) = (i / CHUNK_CAPACITY, i % CHUNK_CAPACITY);
        Some(self.chunk_at(chunk)[slot])
    }

    /// Iterate all items in ingestion order.
    pub fn iter(&self) -> impl Iterator<Item = Item> + '_ {
        self.sealed
            .iter()
            .flat_map(|chunk| chunk.items().iter().copied())
            .chain(self.tail.items().iter().copied())
    }
}

// =============================================================================
// CandidateStore
// =============================================================================

/// Façade owning the arena and the chunked store. Serialises "bytes + Item"
/// appends so that any item visible outside the façade has its bytes
/// present in the arena.
pub struct CandidateStore {
    arena: Arc<TextArena>,
    inner: Mutex<ChunkedStore>,
    total: AtomicUsize,
}

impl Default for CandidateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateStore {
    /// Create an empty store with a fresh arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            arena: Arc::new(TextArena::new()),
            inner: Mutex::new(ChunkedStore::new()),
            total: AtomicUsize::new(0),
        }
    }

    /// The shared arena.
    #[must_use]
    pub fn arena(&self) -> &TextArena {
        &self.arena
    }

    /// A cloneable handle to the arena.
    #[must_use]
    pub fn arena_handle(&self) -> Arc<TextArena> {
        Arc::clone(&self.arena)
    }

    /// Fast path: the caller already appended the bytes to this store's
    /// arena; register the window as the next item. Returns its index.
    pub fn register(&self, window: Window) -> u32 {
        debug_assert!(
            window.end() <= self.arena.len(),
            "item registered before its bytes were published"
        );
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let index = inner.total_count() as u32;
        inner.append(Item {
            index,
            offset: window.offset,
            length: window.length,
        });
        self.total.store(inner.total_count(), Ordering::Release);
        index
    }

    /// Slow path: append text bytes and register the item in one call.
    pub fn append(&self, text: &str) -> u32 {
        let window = self.arena.append(text.as_bytes());
        self.register(window)
    }

    /// Lock-free total item count (for the pipeline's growth tick).
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// Point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().expect("store lock poisoned").snapshot()
    }

    /// Reclaim headroom after ingest completes.
    pub fn seal_and_shrink(&self) {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .shrink_to_fit();
        self.arena.shrink_to_fit();
    }
}

impl std::fmt::Debug for CandidateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateStore")
            .field("total", &self.total_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: u32) -> Item {
        Item {
            index,
            offset: index * 8,
            length: 8,
        }
    }

    // -- ChunkedStore -----------------------------------------------------------

    #[test]
    fn empty_store() {
        let store = ChunkedStore::new();
        assert_eq!(store.total_count(), 0);
        let snap = store.snapshot();
        assert!(snap.is_empty());
        assert_eq!(snap.chunk_count(), 0);
    }

    #[test]
    fn tail_fills_before_sealing() {
        let mut store = ChunkedStore::new();
        for i in 0..CHUNK_CAPACITY as u32 {
            store.append(item(i));
        }
        let snap = store.snapshot();
        // Exactly full: sealing happens lazily on the next append.
        assert_eq!(snap.sealed_chunk_count(), 0);
        assert_eq!(snap.chunk_count(), 1);
        assert_eq!(snap.count(), CHUNK_CAPACITY);
    }

    #[test]
    fn rollover_seals_cleanly() {
        let mut store = ChunkedStore::new();
        for i in 0..(3 * CHUNK_CAPACITY + 1) as u32 {
            store.append(item(i));
        }
        let snap = store.snapshot();
        assert_eq!(snap.sealed_chunk_count(), 3);
        assert_eq!(snap.chunk_count(), 4);
        assert_eq!(snap.chunk_at(3).len(), 1);
        // Sealed chunk k holds exactly indices [k*C, (k+1)*C).
        for k in 0..3 {
            let chunk = snap.chunk_at(k);
            assert_eq!(chunk.len(), CHUNK_CAPACITY);
            assert_eq!(chunk[0].index as usize, k * CHUNK_CAPACITY);
            assert_eq!(
                chunk[CHUNK_CAPACITY - 1].index as usize,
                (k + 1) * CHUNK_CAPACITY - 1
            );
        }
    }

    #[test]
    fn exact_multiple_of_capacity() {
        let mut store = ChunkedStore::new();
        for i in 0..(2 * CHUNK_CAPACITY) as u32 {
            store.append(item(i));
        }
        let snap = store.snapshot();
        assert_eq!(snap.count(), 2 * CHUNK_CAPACITY);
        assert_eq!(snap.chunk_count(), 2);
    }

    // -- Snapshot ---------------------------------------------------------------

    #[test]
    fn snapshot_is_isolated_from_writes() {
        let mut store = ChunkedStore::new();
        for i in 0..150 {
            store.append(item(i));
        }
        let snap = store.snapshot();
        for i in 150..400 {
            store.append(item(i));
        }
        assert_eq!(snap.count(), 150);
        assert_eq!(store.total_count(), 400);
        assert_eq!(snap.get(149).unwrap().index, 149);
        assert_eq!(snap.get(150), None);
    }

    #[test]
    fn snapshot_indexing_matches_ingestion_order() {
        let mut store = ChunkedStore::new();
        for i in 0..257 {
            store.append(item(i));
        }
        let snap = store.snapshot();
        for i in 0..snap.count() {
            assert_eq!(snap.get(i).unwrap().index as usize, i);
        }
        let collected: Vec<u32> = snap.iter().map(|it| it.index).collect();
        assert_eq!(collected.len(), 257);
        assert!(collected.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn snapshot_count_equals_chunk_sum() {
        let mut store = ChunkedStore::new();
        for i in 0..321 {
            store.append(item(i));
        }
        let snap = store.snapshot();
        let sum: usize = (0..snap.chunk_count()).map(|k| snap.chunk_at(k).len()).sum();
        assert_eq!(snap.count(), sum);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn chunk_index_out_of_range_panics() {
        let mut store = ChunkedStore::new();
        store.append(item(0));
        let snap = store.snapshot();
        let _ = snap.chunk_at(5);
    }

    // -- CandidateStore façade --------------------------------------------------

    #[test]
    fn append_text_publishes_bytes_and_item() {
        let store = CandidateStore::new();
        let idx = store.append("hello world");
        assert_eq!(idx, 0);
        assert_eq!(store.total_count(), 1);
        let snap = store.snapshot();
        let it = snap.get(0).unwrap();
        assert_eq!(store.arena().string_of(it.window()), "hello world");
    }

    #[test]
    fn register_fast_path() {
        let store = CandidateStore::new();
        let window = store.arena().append(b"raw bytes");
        let idx = store.register(window);
        assert_eq!(idx, 0);
        let snap = store.snapshot();
        assert_eq!(store.arena().string_of(snap.get(0).unwrap().window()), "raw bytes");
    }

    #[test]
    fn indices_are_monotonic() {
        let store = CandidateStore::new();
        for i in 0..250 {
            let idx = store.append(&format!("line {i}"));
            assert_eq!(idx as usize, i);
        }
        assert_eq!(store.total_count(), 250);
    }

    #[test]
    fn snapshot_readable_from_other_threads() {
        let store = Arc::new(CandidateStore::new());
        for i in 0..120 {
            store.append(&format!("row-{i}"));
        }
        let snap = store.snapshot();
        let arena = store.arena_handle();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let snap = snap.clone();
                let arena = Arc::clone(&arena);
                scope.spawn(move || {
                    for (i, it) in snap.iter().enumerate() {
                        assert_eq!(arena.string_of(it.window()), format!("row-{i}"));
                    }
                });
            }
        });
    }

    #[test]
    fn seal_and_shrink_keeps_content() {
        let store = CandidateStore::new();
        for i in 0..42 {
            store.append(&format!("keep-{i}"));
        }
        store.seal_and_shrink();
        let snap = store.snapshot();
        assert_eq!(snap.count(), 42);
        assert_eq!(store.arena().string_of(snap.get(41).unwrap().window()), "keep-41");
    }
}
