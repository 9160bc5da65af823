//! End-to-end matching scenarios over real stores.
//!
//! Golden inputs with pinned expectations, plus property tests comparing
//! the partitioned engine against a naive single-threaded reference.

use std::sync::atomic::AtomicBool;

use proptest::prelude::*;

use sift_core::engine::{MatchOptions, MatchingEngine};
use sift_core::rank::MatchedItem;
use sift_core::score::{self, MatcherScratch, PreparedPattern};
use sift_core::store::{CHUNK_CAPACITY, CandidateStore};

// =============================================================================
// Helpers
// =============================================================================

fn store_of<S: AsRef<str>>(lines: &[S]) -> CandidateStore {
    let store = CandidateStore::new();
    for line in lines {
        store.append(line.as_ref());
    }
    store
}

fn run(store: &CandidateStore, query: &str, options: &MatchOptions) -> Vec<MatchedItem> {
    let engine = MatchingEngine::new();
    let cancel = AtomicBool::new(false);
    engine
        .run(query, &store.snapshot(), store.arena(), options, &cancel)
        .expect("not cancelled")
}

fn texts(store: &CandidateStore, matches: &[MatchedItem]) -> Vec<String> {
    matches
        .iter()
        .map(|m| store.arena().string_of(m.item.window()))
        .collect()
}

fn wide(top_k: usize) -> MatchOptions {
    MatchOptions {
        top_k,
        ..MatchOptions::default()
    }
}

/// Single-threaded reference: score every item, AND the tokens, order by
/// (score desc, length asc, index asc).
fn naive(store: &CandidateStore, query: &str, options: &MatchOptions) -> Vec<(u32, i32)> {
    let mut scratch = MatcherScratch::new();
    let patterns: Vec<PreparedPattern> = query
        .split_ascii_whitespace()
        .map(|t| PreparedPattern::new(t, options.case_sensitive))
        .collect();
    let snapshot = store.snapshot();
    let mut rows: Vec<(u32, i32, u16)> = Vec::new();
    'items: for item in snapshot.iter() {
        let mut total = 0;
        for pattern in &patterns {
            let result = store
                .arena()
                .read_with(item.window(), |text| score::score(pattern, text, &mut scratch));
            match result {
                Some(r) => total += r.score,
                None => continue 'items,
            }
        }
        rows.push((item.index, total, item.length));
    }
    rows.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| a.2.cmp(&b.2))
            .then_with(|| a.0.cmp(&b.0))
    });
    rows.truncate(options.top_k);
    rows.into_iter().map(|(index, score, _)| (index, score)).collect()
}

// =============================================================================
// Golden scenarios
// =============================================================================

#[test]
fn prefix_query_keeps_only_containing_lines() {
    let store = store_of(&["apple", "apricot", "banana", "cherry"]);
    let result = run(&store, "ap", &MatchOptions::default());
    assert_eq!(texts(&store, &result), vec!["apple", "apricot"]);
}

#[test]
fn delimiter_boundary_outranks_flat_text() {
    let store = store_of(&["foo_bar", "foobar"]);
    let result = run(&store, "fb", &MatchOptions::default());
    assert_eq!(texts(&store, &result), vec!["foo_bar", "foobar"]);
    assert!(result[0].score > result[1].score);
}

#[test]
fn license_files_fill_the_podium() {
    let store = store_of(&[
        "LICENSE",
        "LICENSE.md",
        "LICENSE.txt",
        "lib/license_checker.rb",
        "src/licensing/models.py",
        "docs/licensing_guide.md",
    ]);
    let result = run(&store, "LICENSE", &MatchOptions::default());
    assert!(result.len() >= 3);
    let mut top3 = texts(&store, &result[..3]);
    top3.sort();
    assert_eq!(top3, vec!["LICENSE", "LICENSE.md", "LICENSE.txt"]);
}

#[test]
fn extending_the_query_only_narrows() {
    let lines = [
        "hello-world",
        "hello",
        "helium",
        "help",
        "hero",
        "halo",
        "world-hello",
    ];
    let store = store_of(&lines);
    let queries = [
        "h", "he", "hel", "hell", "hello", "hello-", "hello-w", "hello-world",
    ];
    let mut previous: Option<Vec<u32>> = None;
    for query in queries {
        let result = run(&store, query, &wide(100));
        let mut indices: Vec<u32> = result.iter().map(|m| m.item.index).collect();
        indices.sort_unstable();
        if let Some(prev) = &previous {
            for index in &indices {
                assert!(
                    prev.contains(index),
                    "query {query:?}: index {index} appeared out of nowhere"
                );
            }
        }
        previous = Some(indices);
    }
    let final_result = run(&store, "hello-world", &wide(100));
    assert_eq!(texts(&store, &final_result)[0], "hello-world");
}

#[test]
fn exact_file_name_outranks_lookalikes() {
    let store = store_of(&[
        "README.md",
        "src/lib/readme/parser.md",
        "docs/read_me_first.md",
        "tests/reader_model_demo.md",
    ]);
    let result = run(&store, "README.md", &MatchOptions::default());
    assert_eq!(texts(&store, &result)[0], "README.md");
    for m in &result[1..] {
        assert!(m.score < result[0].score);
    }
}

// =============================================================================
// Invariants
// =============================================================================

#[test]
fn reruns_are_deterministic() {
    let lines: Vec<String> = (0..300)
        .map(|i| format!("src/module_{i}/file_{}.rs", i % 7))
        .collect();
    let store = store_of(&lines);
    let engine = MatchingEngine::new();
    let cancel = AtomicBool::new(false);
    let snapshot = store.snapshot();
    let options = MatchOptions::default();

    let first = engine
        .run("file rs", &snapshot, store.arena(), &options, &cancel)
        .unwrap();
    let second = engine
        .run("file rs", &snapshot, store.arena(), &options, &cancel)
        .unwrap();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.item.index, b.item.index);
        assert_eq!(a.score, b.score);
        assert_eq!(a.points, b.points);
    }
}

#[test]
fn scores_equal_a_fresh_scorer_evaluation() {
    let lines: Vec<String> = (0..150).map(|i| format!("path/to/entry_{i}.txt")).collect();
    let store = store_of(&lines);
    let result = run(&store, "entry", &wide(50));
    assert!(!result.is_empty());

    let mut scratch = MatcherScratch::new();
    let pattern = PreparedPattern::new("entry", false);
    for m in &result {
        let fresh = store
            .arena()
            .read_with(m.item.window(), |text| score::score(&pattern, text, &mut scratch))
            .expect("engine said it matches");
        assert_eq!(m.score, fresh.score);
    }
}

#[test]
fn cached_chunks_agree_with_fresh_engines() {
    // Three sealed chunks plus a tail; the warm engine answers from its
    // memo, the cold one scans. Results must be identical.
    let lines: Vec<String> = (0..(3 * CHUNK_CAPACITY + 17))
        .map(|i| format!("record-{i:04}"))
        .collect();
    let store = store_of(&lines);
    let warm = MatchingEngine::new();
    let cancel = AtomicBool::new(false);
    let snapshot = store.snapshot();
    let options = wide(400);

    let first = warm
        .run("record-01", &snapshot, store.arena(), &options, &cancel)
        .unwrap();
    assert!(warm.cache().entry_count() > 0);
    let memoised = warm
        .run("record-01", &snapshot, store.arena(), &options, &cancel)
        .unwrap();
    let cold = MatchingEngine::new()
        .run("record-01", &snapshot, store.arena(), &options, &cancel)
        .unwrap();

    let key = |ms: &[MatchedItem]| -> Vec<(u32, i32, u64)> {
        ms.iter().map(|m| (m.item.index, m.score, m.points)).collect()
    };
    assert_eq!(key(&first), key(&memoised));
    assert_eq!(key(&first), key(&cold));
}

#[test]
fn sub_query_reuse_agrees_with_full_scan() {
    // Warm the memo with the narrower query first, so the longer query
    // takes the superset-rescore path on every sealed chunk.
    let lines: Vec<String> = (0..(2 * CHUNK_CAPACITY))
        .map(|i| {
            if i % 50 == 0 {
                format!("needle_file_{i}.rs")
            } else {
                format!("haystack_{i}.rs")
            }
        })
        .collect();
    let store = store_of(&lines);
    let warm = MatchingEngine::new();
    let cancel = AtomicBool::new(false);
    let snapshot = store.snapshot();
    let options = wide(50);

    let _ = warm
        .run("needle", &snapshot, store.arena(), &options, &cancel)
        .unwrap();
    let reused = warm
        .run("needle_f", &snapshot, store.arena(), &options, &cancel)
        .unwrap();
    let cold = MatchingEngine::new()
        .run("needle_f", &snapshot, store.arena(), &options, &cancel)
        .unwrap();
    assert_eq!(
        texts(&store, &reused),
        texts(&store, &cold),
        "superset rescoring must not change results"
    );
    for (a, b) in reused.iter().zip(&cold) {
        assert_eq!(a.points, b.points);
    }
}

#[test]
fn empty_query_lists_everything_shortest_first() {
    let store = store_of(&["omega", "mu", "zeta9", "xi"]);
    let result = run(&store, "", &wide(10));
    assert_eq!(texts(&store, &result), vec!["mu", "xi", "omega", "zeta9"]);
    assert!(result.iter().all(|m| m.score == 0));
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn engine_agrees_with_naive_reference(
        lines in prop::collection::vec("[a-zA-Z0-9_/. -]{0,24}", 1..80),
        query in "[a-zA-Z0-9 ]{0,8}",
    ) {
        let store = store_of(&lines);
        let options = wide(lines.len());
        let result = run(&store, &query, &options);
        let got: Vec<(u32, i32)> = result.iter().map(|m| (m.item.index, m.score)).collect();
        prop_assert_eq!(got, naive(&store, &query, &options));
    }

    #[test]
    fn appending_a_character_never_adds_matches(
        lines in prop::collection::vec("[a-z0-9_./]{0,16}", 1..50),
        query in "[a-z]{1,5}",
        extra in prop::sample::select(&b"abcxyz019._"[..]),
    ) {
        let store = store_of(&lines);
        let options = wide(lines.len());
        let base: Vec<u32> = run(&store, &query, &options)
            .iter()
            .map(|m| m.item.index)
            .collect();
        let extended = format!("{query}{}", extra as char);
        for m in run(&store, &extended, &options) {
            prop_assert!(
                base.contains(&m.item.index),
                "{:?} matched {:?} but not the prefix {:?}",
                m.item.index, extended, query
            );
        }
    }

    #[test]
    fn positive_scores_imply_ordered_containment(
        text in "[ -~]{0,40}",
        token in "[a-zA-Z0-9]{1,6}",
    ) {
        let pattern = PreparedPattern::new(&token, false);
        let mut scratch = MatcherScratch::new();
        if let Some(result) = score::score(&pattern, text.as_bytes(), &mut scratch) {
            prop_assert!(result.score > 0);
            // Greedy containment must hold on the folded bytes.
            let folded: Vec<u8> = text.bytes().map(|b| b.to_ascii_lowercase()).collect();
            let mut at = 0usize;
            for pb in token.bytes().map(|b| b.to_ascii_lowercase()) {
                match folded[at..].iter().position(|&b| b == pb) {
                    Some(offset) => at += offset + 1,
                    None => prop_assert!(false, "scored but not contained"),
                }
            }
        }
    }
}
