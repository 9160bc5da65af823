//! Byte-oriented fuzzy scorer.
//!
//! A Smith-Waterman-style dynamic program over pattern bytes and candidate
//! text bytes, with positional bonuses at word/path/case boundaries. Two
//! entry points share the algorithm: [`score`] computes the best score only
//! (the hot path), [`score_with_positions`] additionally reconstructs the
//! matched byte offsets for highlighting.
//!
//! Case folding is ASCII-only (`'A'..'Z' → 'a'..'z'`); all other bytes are
//! compared verbatim, so non-ASCII text is matched opaquely.

// =============================================================================
// Score constants
// =============================================================================

/// Base score for one matched byte.
pub const SCORE_MATCH: i32 = 16;
/// Penalty for opening a gap between matches.
pub const SCORE_GAP_START: i32 = -3;
/// Penalty for extending an already-open gap by one byte.
pub const SCORE_GAP_EXTEND: i32 = -1;
/// Boundary bonus when the previous byte is whitespace.
pub const BONUS_BOUNDARY_WHITE: i32 = 8;
/// Boundary bonus when the previous byte is a delimiter.
pub const BONUS_BOUNDARY_DELIMITER: i32 = 7;
/// Boundary bonus for a lower/number → upper transition.
pub const BONUS_CAMEL: i32 = 7;
/// Boundary bonus for a non-word → word transition.
pub const BONUS_NON_WORD: i32 = 6;
/// Bonus when a match immediately follows the previous matched position.
pub const BONUS_CONSECUTIVE: i32 = 4;
/// The boundary bonus at the pattern's first matched byte is doubled.
pub const BONUS_FIRST_CHAR_MULTIPLIER: i32 = 2;

/// Sentinel for unreachable DP cells. Far enough from `i32::MIN` that the
/// small per-cell additions cannot wrap.
const SCORE_INVALID: i32 = i32::MIN / 2;

// =============================================================================
// Character classes
// =============================================================================

/// Byte classification driving the boundary-bonus table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    /// `' '` or `'\t'`.
    White,
    /// Path/word separators: `_ - . , ; : ! ? / \ |`.
    Delimiter,
    /// `a..z`.
    Lower,
    /// `A..Z`.
    Upper,
    /// `0..9`.
    Number,
    /// Everything else, including all non-ASCII bytes.
    NonWord,
}

const fn classify(b: u8) -> CharClass {
    match b {
        b' ' | b'\t' => CharClass::White,
        b'_' | b'-' | b'.' | b',' | b';' | b':' | b'!' | b'?' | b'/' | b'\\' | b'|' => {
            CharClass::Delimiter
        }
        b'a'..=b'z' => CharClass::Lower,
        b'A'..=b'Z' => CharClass::Upper,
        b'0'..=b'9' => CharClass::Number,
        _ => CharClass::NonWord,
    }
}

static CLASSES: [CharClass; 256] = {
    let mut table = [CharClass::NonWord; 256];
    let mut b = 0usize;
    while b < 256 {
        table[b] = classify(b as u8);
        b += 1;
    }
    table
};

/// Class of one text byte.
#[must_use]
pub fn char_class(b: u8) -> CharClass {
    CLASSES[b as usize]
}

/// Whether `b` is a path/word delimiter (used by the `path` ordering scheme).
#[must_use]
pub fn is_delimiter(b: u8) -> bool {
    matches!(char_class(b), CharClass::Delimiter)
}

/// Boundary bonus for a match at a position whose predecessor has class
/// `prev`. The first byte of a text carries a synthetic `White` predecessor.
fn bonus(prev: CharClass, cur: CharClass) -> i32 {
    let cur_is_word = matches!(cur, CharClass::Lower | CharClass::Upper | CharClass::Number);
    match prev {
        CharClass::White => BONUS_BOUNDARY_WHITE,
        CharClass::Delimiter => BONUS_BOUNDARY_DELIMITER,
        CharClass::Lower | CharClass::Number if matches!(cur, CharClass::Upper) => BONUS_CAMEL,
        CharClass::NonWord if cur_is_word => BONUS_NON_WORD,
        _ => 0,
    }
}

// =============================================================================
// PreparedPattern
// =============================================================================

/// One query token, prepared once per query: pre-folded bytes plus a
/// required-character bitmask over ASCII for cheap rejection.
#[derive(Debug, Clone)]
pub struct PreparedPattern {
    bytes: Box<[u8]>,
    case_sensitive: bool,
    ascii_mask: u128,
}

impl PreparedPattern {
    /// Prepare a token. Folds to lowercase unless `case_sensitive`.
    #[must_use]
    pub fn new(token: &str, case_sensitive: bool) -> Self {
        let bytes: Vec<u8> = if case_sensitive {
            token.bytes().collect()
        } else {
            token.bytes().map(|b| b.to_ascii_lowercase()).collect()
        };
        let mut ascii_mask = 0u128;
        for &b in &bytes {
            if b < 128 {
                ascii_mask |= 1 << b;
            }
        }
        Self {
            bytes: bytes.into_boxed_slice(),
            case_sensitive,
            ascii_mask,
        }
    }

    /// Pattern length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the pattern is empty (matches everything with score 0).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The prepared (possibly folded) pattern bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn fold(&self, b: u8) -> u8 {
        if self.case_sensitive {
            b
        } else {
            b.to_ascii_lowercase()
        }
    }
}

// =============================================================================
// MatcherScratch
// =============================================================================

/// Reusable per-worker DP buffers, grown on demand to the widest window
/// encountered. Never shared between workers.
#[derive(Debug, Default)]
pub struct MatcherScratch {
    h_prev: Vec<i32>,
    h_cur: Vec<i32>,
    ends_prev: Vec<bool>,
    ends_cur: Vec<bool>,
    bonus: Vec<i32>,
    // Per-cell match-path record, populated only for the highlight pass.
    ends_rows: Vec<bool>,
}

impl MatcherScratch {
    /// Create empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self, width: usize) {
        self.h_prev.clear();
        self.h_prev.resize(width, 0);
        self.h_cur.clear();
        self.h_cur.resize(width, SCORE_INVALID);
        self.ends_prev.clear();
        self.ends_prev.resize(width, false);
        self.ends_cur.clear();
        self.ends_cur.resize(width, false);
        self.bonus.clear();
        self.bonus.resize(width, 0);
    }
}

// =============================================================================
// Scoring
// =============================================================================

/// A successful match: the DP score and the first matched byte offset from
/// the greedy containment pass (the anchor for the `path` ordering scheme).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    /// Total match score. Strictly positive for non-empty patterns.
    pub score: i32,
    /// Leftmost feasible match position of the pattern's first byte.
    pub first_pos: u16,
}

/// Score `pattern` against `text`. Returns `None` when the pattern bytes
/// cannot be found in order, or the best alignment is not strictly positive.
#[must_use]
pub fn score(
    pattern: &PreparedPattern,
    text: &[u8],
    scratch: &mut MatcherScratch,
) -> Option<MatchResult> {
    if pattern.is_empty() {
        return Some(MatchResult {
            score: 0,
            first_pos: 0,
        });
    }
    let (first, last) = prefilter(pattern, text)?;
    let (best, _) = run_dp(pattern, text, first, last, scratch, false)?;
    Some(MatchResult {
        score: best,
        first_pos: first as u16,
    })
}

/// Score `pattern` against `text` and reconstruct the matched byte offsets,
/// ascending. The highlight path; costs a full DP matrix.
#[must_use]
pub fn score_with_positions(
    pattern: &PreparedPattern,
    text: &[u8],
    scratch: &mut MatcherScratch,
) -> Option<(MatchResult, Vec<u16>)> {
    if pattern.is_empty() {
        return Some((
            MatchResult {
                score: 0,
                first_pos: 0,
            },
            Vec::new(),
        ));
    }
    let (first, last) = prefilter(pattern, text)?;
    let (best, best_pos) = run_dp(pattern, text, first, last, scratch, true)?;
    let width = last - first + 1;
    let positions = backtrack(&scratch.ends_rows, pattern.len(), width, first, best_pos);
    Some((
        MatchResult {
            score: best,
            first_pos: first as u16,
        },
        positions,
    ))
}

/// Greedy containment pre-filter.
///
/// Returns the DP window `(first, last)`: `first` is the leftmost feasible
/// position of the pattern's first byte (forward pass), `last` the
/// rightmost feasible position of its last byte (backward pass). `None`
/// when the pattern bytes do not occur in order.
fn prefilter(pattern: &PreparedPattern, text: &[u8]) -> Option<(usize, usize)> {
    let pat = pattern.bytes();
    let n = pat.len();
    if text.len() < n {
        return None;
    }

    // Required-character rejection: every ASCII pattern byte must occur
    // somewhere in the folded text.
    let mut seen = 0u128;
    for &b in text {
        let f = pattern.fold(b);
        if f < 128 {
            seen |= 1 << f;
        }
    }
    if pattern.ascii_mask & !seen != 0 {
        return None;
    }

    // Forward pass: seek the first byte with memchr, then walk greedily.
    let head = pat[0];
    let first = if !pattern.case_sensitive && head.is_ascii_alphabetic() {
        memchr::memchr2(head, head.to_ascii_uppercase(), text)?
    } else {
        memchr::memchr(head, text)?
    };
    let mut pi = 1;
    for &b in &text[first + 1..] {
        if pi == n {
            break;
        }
        if pattern.fold(b) == pat[pi] {
            pi += 1;
        }
    }
    if pi < n {
        return None;
    }

    // Backward pass: rightmost feasible end of the window.
    let mut k = n;
    let mut last = first;
    for pos in (first..text.len()).rev() {
        if k == 0 {
            break;
        }
        if pattern.fold(text[pos]) == pat[k - 1] {
            if k == n {
                last = pos;
            }
            k -= 1;
        }
    }
    debug_assert_eq!(k, 0, "backward pass must succeed when forward pass did");
    Some((first, last))
}

/// Row-major DP over the clamped window. Returns the best score of the last
/// row and the text position it was reached at.
///
/// Recurrence per cell, with `j` the text position and `i` the pattern row:
/// the match path extends `H[i-1][j-1]` by `SCORE_MATCH` plus the boundary
/// bonus at `j` (doubled on row 1) plus `BONUS_CONSECUTIVE` when row `i-1`
/// ended in a match at `j-1`; the gap path extends `H[i][j-1]` by the gap
/// penalty, tracked with a per-row open-gap flag. The match path wins ties
/// so backtracks stay deterministic.
fn run_dp(
    pattern: &PreparedPattern,
    text: &[u8],
    first: usize,
    last: usize,
    scratch: &mut MatcherScratch,
    record: bool,
) -> Option<(i32, usize)> {
    let pat = pattern.bytes();
    let p = pat.len();
    let width = last - first + 1;
    scratch.reset(width);

    for (col, slot) in scratch.bonus.iter_mut().enumerate() {
        let pos = first + col;
        let prev = if pos == 0 {
            CharClass::White
        } else {
            char_class(text[pos - 1])
        };
        *slot = bonus(prev, char_class(text[pos]));
    }

    if record {
        scratch.ends_rows.clear();
        scratch.ends_rows.resize(p * width, false);
    }

    for i in 1..=p {
        let pb = pat[i - 1];
        let mut in_gap = false;
        for col in 0..width {
            let pos = first + col;

            let gap = if col > 0 && scratch.h_cur[col - 1] > SCORE_INVALID {
                let penalty = if in_gap { SCORE_GAP_EXTEND } else { SCORE_GAP_START };
                scratch.h_cur[col - 1] + penalty
            } else {
                SCORE_INVALID
            };

            let mut matched = SCORE_INVALID;
            if pattern.fold(text[pos]) == pb {
                let diag = if col > 0 {
                    scratch.h_prev[col - 1]
                } else if i == 1 {
                    0
                } else {
                    SCORE_INVALID
                };
                if diag > SCORE_INVALID {
                    let mut b = scratch.bonus[col];
                    if i == 1 {
                        b *= BONUS_FIRST_CHAR_MULTIPLIER;
                    }
                    let consecutive = col > 0 && scratch.ends_prev[col - 1];
                    matched = diag
                        + SCORE_MATCH
                        + b
                        + if consecutive { BONUS_CONSECUTIVE } else { 0 };
                }
            }

            let match_won = matched > SCORE_INVALID && matched >= gap;
            let cell = if match_won { matched } else { gap };
            scratch.h_cur[col] = cell;
            scratch.ends_cur[col] = match_won;
            in_gap = !match_won && cell > SCORE_INVALID;
        }
        if record {
            let row = (i - 1) * width;
            scratch.ends_rows[row..row + width].copy_from_slice(&scratch.ends_cur[..width]);
        }
        std::mem::swap(&mut scratch.h_prev, &mut scratch.h_cur);
        std::mem::swap(&mut scratch.ends_prev, &mut scratch.ends_cur);
    }

    // Last row now lives in h_prev. A gap cell is always dominated by the
    // match cell it extends, so the row maximum lands on a match.
    let mut best = SCORE_INVALID;
    let mut best_col = 0;
    for (col, &cell) in scratch.h_prev.iter().enumerate() {
        if cell > best {
            best = cell;
            best_col = col;
        }
    }
    if best <= 0 {
        return None;
    }
    Some((best, first + best_col))
}

/// Walk the recorded match-path flags backwards from the winning cell.
fn backtrack(
    ends_rows: &[bool],
    rows: usize,
    width: usize,
    first: usize,
    best_pos: usize,
) -> Vec<u16> {
    let mut positions = Vec::with_capacity(rows);
    let mut i = rows;
    let mut col = best_pos - first;
    while i > 0 {
        if ends_rows[(i - 1) * width + col] {
            positions.push((first + col) as u16);
            i -= 1;
            if col == 0 {
                break;
            }
            col -= 1;
        } else {
            debug_assert!(col > 0, "gap cell with no predecessor");
            col -= 1;
        }
    }
    debug_assert_eq!(i, 0, "backtrack must consume every pattern row");
    positions.reverse();
    positions
}

// =============================================================================
// Tests
// =============================================================================
