//! Ingest loop: byte-chunk reader and line splitter.
//!
//! Drains a byte source into the candidate store: read into a fixed buffer,
//! split on `0x0A`, trim ASCII whitespace at both edges, drop empty lines,
//! append the bytes to the arena and register the item. Bytes that straddle
//! a read boundary are carried to the buffer head before the next read.
//!
//! Lines longer than [`MAX_LINE_LENGTH`] are truncated there and the
//! remainder is discarded up to the next newline; the item length field
//! cannot represent more.

use std::io::Read;
use std::sync::Arc;

use memchr::memchr;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::CandidateStore;

/// Read buffer size.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;
/// Longest publishable line in bytes.
pub const MAX_LINE_LENGTH: usize = u16::MAX as usize;

// =============================================================================
// IngestStats
// =============================================================================

/// Counters for one completed ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Lines published to the store.
    pub lines: u64,
    /// Bytes published (after trimming and truncation).
    pub bytes: u64,
    /// Lines cut at [`MAX_LINE_LENGTH`].
    pub truncated: u64,
    /// Lines dropped because trimming left nothing.
    pub dropped_empty: u64,
}

// =============================================================================
// Ingest loop
// =============================================================================

/// Drain `reader` to EOF into `store`, then ask the façade to
/// `seal_and_shrink`. I/O failures propagate; partial results up to the
/// failure stay in the store and are discarded by the caller.
pub fn ingest_reader<R: Read>(mut reader: R, store: &CandidateStore) -> Result<IngestStats> {
    let mut stats = IngestStats::default();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut filled = 0usize;
    // Inside an overlong line whose prefix was already published.
    let mut skipping = false;

    loop {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled > 0 && !skipping {
                publish(&buf[..filled], store, &mut stats);
            }
            break;
        }
        let end = filled + n;

        let mut start = 0usize;
        while let Some(nl) = memchr(b'\n', &buf[start..end]) {
            let line_end = start + nl;
            if skipping {
                skipping = false;
            } else {
                publish(&buf[start..line_end], store, &mut stats);
            }
            start = line_end + 1;
        }

        if skipping {
            // Still inside the discarded remainder of an overlong line.
            filled = 0;
        } else if start == 0 && end == buf.len() {
            // No newline in a full buffer: the line cannot fit. Publish the
            // truncated prefix and discard until the next newline.
            publish_truncated(&buf[..end], store, &mut stats);
            skipping = true;
            filled = 0;
        } else {
            buf.copy_within(start..end, 0);
            filled = end - start;
        }
    }

    store.seal_and_shrink();
    tracing::debug!(
        lines = stats.lines,
        bytes = stats.bytes,
        truncated = stats.truncated,
        dropped_empty = stats.dropped_empty,
        "ingest complete"
    );
    Ok(stats)
}

/// Drain stdin on the blocking pool.
pub async fn ingest_stdin(store: Arc<CandidateStore>) -> Result<IngestStats> {
    tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        ingest_reader(stdin.lock(), &store)
    })
    .await
    .map_err(|join_error| Error::Runtime(format!("ingest task failed: {join_error}")))?
}

fn publish(line: &[u8], store: &CandidateStore, stats: &mut IngestStats) {
    let trimmed = trim_ascii_edges(line);
    if trimmed.is_empty() {
        stats.dropped_empty += 1;
        return;
    }
    let window = store.arena().append(trimmed);
    store.register(window);
    stats.lines += 1;
    stats.bytes += trimmed.len() as u64;
}

fn publish_truncated(bytes: &[u8], store: &CandidateStore, stats: &mut IngestStats) {
    stats.truncated += 1;
    let mut head = bytes;
    while let [first, rest @ ..] = head {
        if is_trim_byte(*first) {
            head = rest;
        } else {
            break;
        }
    }
    let cut = &head[..head.len().min(MAX_LINE_LENGTH)];
    if cut.is_empty() {
        stats.dropped_empty += 1;
        return;
    }
    let window = store.arena().append(cut);
    store.register(window);
    stats.lines += 1;
    stats.bytes += cut.len() as u64;
}

/// Trim `SP`, `HT`, `CR`, `LF` from both edges.
fn trim_ascii_edges(mut line: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = line {
        if is_trim_byte(*first) {
            line = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = line {
        if is_trim_byte(*last) {
            line = rest;
        } else {
            break;
        }
    }
    line
}

fn is_trim_byte(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

// =============================================================================
// Tests
// =============================================================================
