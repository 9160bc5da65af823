//! Append-only byte arena for candidate line text.
//!
//! Every ingested line lives in one contiguous grow-only buffer. Scorers
//! address text through `(offset, length)` windows that stay byte-stable for
//! the arena's lifetime; the buffer only ever extends at the tail.
//!
//! # Concurrency contract
//!
//! Single writer (the ingest loop), many readers (scorer workers). A
//! reader-writer lock is held for the duration of each append and each read
//! borrow, so a reader can never observe a torn append even while the ingest
//! loop is still running. Borrows are closure-scoped: `read_with` hands the
//! callback a slice that is valid exactly until it returns, so no reference
//! can outlive the lock.

use std::sync::RwLock;

/// Initial buffer reservation. Covers most interactive inputs without a
/// single reallocation.
const INITIAL_RESERVATION: usize = 1024 * 1024;

// =============================================================================
// Window
// =============================================================================

/// A byte window into the arena: `[offset, offset + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    /// Start offset into the arena buffer.
    pub offset: u32,
    /// Window length in bytes.
    pub length: u16,
}

impl Window {
    /// End offset (exclusive).
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset as usize + self.length as usize
    }
}

// =============================================================================
// TextArena
// =============================================================================

/// Append-only UTF-8 byte store shared between the ingest loop and scorer
/// workers.
pub struct TextArena {
    bytes: RwLock<Vec<u8>>,
}

impl Default for TextArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TextArena {
    /// Create an empty arena with the initial reservation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: RwLock::new(Vec::with_capacity(INITIAL_RESERVATION)),
        }
    }

    /// Append bytes verbatim and return their window.
    ///
    /// Appends are atomic from a reader's perspective: the write lock is
    /// held until the bytes are fully copied in.
    ///
    /// # Panics
    ///
    /// Panics when `bytes` exceeds the window length field (the ingest loop
    /// truncates lines well below this), or when the arena would grow past
    /// `u32` addressing. Running out of address space here is unrecoverable
    /// resource exhaustion.
    pub fn append(&self, bytes: &[u8]) -> Window {
        assert!(
            bytes.len() <= u16::MAX as usize,
            "arena append of {} bytes exceeds the maximum line length",
            bytes.len()
        );
        let mut buf = self.bytes.write().expect("arena lock poisoned");
        let offset = buf.len();
        assert!(
            offset + bytes.len() <= u32::MAX as usize,
            "arena exhausted: cannot address past 4 GiB of candidate text"
        );
        buf.extend_from_slice(bytes);
        Window {
            offset: offset as u32,
            length: bytes.len() as u16,
        }
    }

    /// Run `f` with the slice covering `window`.
    ///
    /// The slice is valid until `f` returns; the read lock is held for the
    /// whole call, so concurrent appends cannot move the buffer under it.
    ///
    /// # Panics
    ///
    /// Panics if the window was never published by this arena (out of
    /// bounds), which is a programmer invariant violation.
    pub fn read_with<R>(&self, window: Window, f: impl FnOnce(&[u8]) -> R) -> R {
        let buf = self.bytes.read().expect("arena lock poisoned");
        let slice = &buf[window.offset as usize..window.end()];
        f(slice)
    }

    /// Decode a window to owned text. Cold path (final output, not scoring);
    /// invalid UTF-8 sequences become replacement characters.
    #[must_use]
    pub fn string_of(&self, window: Window) -> String {
        self.read_with(window, |bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Total bytes stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.read().expect("arena lock poisoned").len()
    }

    /// Whether the arena holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reclaim growth headroom. Called once after ingest completes.
    pub fn shrink_to_fit(&self) {
        let mut buf = self.bytes.write().expect("arena lock poisoned");
        buf.shrink_to_fit();
        tracing::debug!(bytes = buf.len(), "arena sealed");
    }
}

impl std::fmt::Debug for TextArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextArena").field("len", &self.len()).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
