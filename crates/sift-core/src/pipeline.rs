//! Input-to-matches pipeline: debouncing, incremental narrowing, growth.
//!
//! A single cooperative event loop owns the query stream. Keystroke bursts
//! are collapsed inside a debounce window (latest value wins), matching
//! passes run off-loop on the blocking pool, and a background tick reruns
//! the current query when ingest grew the store while the user was idle.
//!
//! # State machine
//!
//! ```text
//! Idle ──keystroke──► Debouncing ──timer──► Matching ──delivered──► Idle
//!         ▲                │ keystroke resets the timer   │
//!         └────────────────┴── keystroke cancels the pass ┘
//! ```
//!
//! Cancellation is honoured at the engine's chunk boundaries; a cancelled
//! pass is discarded without an update.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::engine::{MatchOptions, MatchingEngine};
use crate::rank::MatchedItem;
use crate::store::CandidateStore;

/// Default keystroke debounce window.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);
/// Default interval for observing store growth.
pub const GROWTH_TICK: Duration = Duration::from_millis(100);

// =============================================================================
// Types
// =============================================================================

/// Pipeline phase, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing pending, nothing running.
    Idle,
    /// A keystroke is waiting out the debounce window.
    Debouncing,
    /// A matching pass is running.
    Matching,
}

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Keystroke debounce window; bursts inside it collapse to the latest.
    pub debounce: Duration,
    /// Growth observation interval.
    pub growth_tick: Duration,
    /// Options handed to every matching pass.
    pub matching: MatchOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            debounce: DEBOUNCE_WINDOW,
            growth_tick: GROWTH_TICK,
            matching: MatchOptions::default(),
        }
    }
}

/// One delivered result set.
#[derive(Debug, Clone)]
pub struct MatchUpdate {
    /// The query this result answers.
    pub query: String,
    /// Ranked matches, best first.
    pub matches: Arc<Vec<MatchedItem>>,
    /// Store size the pass ran against.
    pub total: usize,
}

/// A previous delivery, kept for incremental narrowing.
struct LastResult {
    query: String,
    matches: Arc<Vec<MatchedItem>>,
    total: usize,
    /// Whether the result holds every match (was not truncated at top-K).
    /// Narrowing from a truncated pool would drop candidates.
    complete: bool,
}

/// A matching pass in flight on the blocking pool.
struct InFlight {
    handle: JoinHandle<Option<Vec<MatchedItem>>>,
    cancel: Arc<AtomicBool>,
    query: String,
    total: usize,
}

// =============================================================================
// MatchPipeline
// =============================================================================

/// Owns the query-stream event loop for one finder session.
pub struct MatchPipeline {
    store: Arc<CandidateStore>,
    engine: Arc<MatchingEngine>,
    options: PipelineOptions,
}

impl MatchPipeline {
    /// Create a pipeline over a store and a shared engine.
    #[must_use]
    pub fn new(
        store: Arc<CandidateStore>,
        engine: Arc<MatchingEngine>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            engine,
            options,
        }
    }

    /// Drive the loop until the query stream closes or the update receiver
    /// hangs up. Each keystroke on `queries` carries the full new query
    /// string; every completed pass emits one [`MatchUpdate`].
    pub async fn run(
        self,
        mut queries: mpsc::Receiver<String>,
        updates: mpsc::Sender<MatchUpdate>,
    ) {
        let mut pending: Option<String> = None;
        let mut deadline: Option<Instant> = None;
        let mut in_flight: Option<InFlight> = None;
        let mut last: Option<LastResult> = None;
        let mut current_query = String::new();
        let mut seen_total = 0usize;

        let mut tick = time::interval(self.options.growth_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Guards are precomputed so select! branches borrow nothing.
            let matching = in_flight.is_some();
            let debouncing = !matching && deadline.is_some();
            let idle = !matching && pending.is_none();
            let sleep_at = deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                maybe = queries.recv() => {
                    let Some(query) = maybe else { break };
                    if let Some(flight) = &in_flight {
                        flight.cancel.store(true, Ordering::Release);
                    }
                    tracing::trace!(query = %query, state = ?PipelineState::Debouncing, "keystroke");
                    pending = Some(query);
                    deadline = Some(Instant::now() + self.options.debounce);
                }

                () = time::sleep_until(sleep_at), if debouncing => {
                    let query = pending.take().expect("debounce fired without a pending query");
                    deadline = None;
                    tracing::trace!(query = %query, state = ?PipelineState::Matching, "debounce elapsed");
                    in_flight = Some(self.spawn_pass(query, last.as_ref()));
                }

                result = async { (&mut in_flight.as_mut().expect("guarded").handle).await },
                        if matching => {
                    let flight = in_flight.take().expect("guarded");
                    match result {
                        Ok(Some(matches)) => {
                            let matches = Arc::new(matches);
                            current_query = flight.query.clone();
                            seen_total = flight.total;
                            last = Some(LastResult {
                                query: flight.query.clone(),
                                matches: Arc::clone(&matches),
                                total: flight.total,
                                complete: matches.len() < self.options.matching.top_k,
                            });
                            let update = MatchUpdate {
                                query: flight.query,
                                matches,
                                total: flight.total,
                            };
                            if updates.send(update).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {
                            tracing::trace!(query = %flight.query, "pass cancelled");
                        }
                        Err(join_error) => {
                            if join_error.is_panic() {
                                std::panic::resume_unwind(join_error.into_panic());
                            }
                            break;
                        }
                    }
                }

                _ = tick.tick(), if idle => {
                    let total = self.store.total_count();
                    if total > seen_total {
                        tracing::trace!(total, seen_total, "store grew; rerunning");
                        // Growth reruns bypass the debounce and never narrow:
                        // the new items are not in any previous pool.
                        in_flight = Some(self.spawn_pass(current_query.clone(), None));
                    }
                }
            }
        }

        if let Some(flight) = &in_flight {
            flight.cancel.store(true, Ordering::Release);
        }
    }

    /// Launch one matching pass on the blocking pool. Narrows to the
    /// previous result's items when the new query strictly extends the
    /// previous one, the previous result was complete, and the store has
    /// not grown since.
    fn spawn_pass(&self, query: String, last: Option<&LastResult>) -> InFlight {
        let snapshot = self.store.snapshot();
        let total = snapshot.count();
        let pool = last.and_then(|prev| {
            let extends = prev.complete
                && !prev.query.is_empty()
                && query.len() > prev.query.len()
                && query.starts_with(&prev.query)
                && prev.total == total;
            extends.then(|| Arc::clone(&prev.matches))
        });

        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = Arc::clone(&cancel);
        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&self.store);
        let options = self.options.matching.clone();
        let task_query = query.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let arena = store.arena();
            match pool {
                Some(pool) => {
                    engine.run_narrowed(&task_query, &pool, arena, &options, &task_cancel)
                }
                None => engine.run(&task_query, &snapshot, arena, &options, &task_cancel),
            }
        });

        InFlight {
            handle,
            cancel,
            query,
            total,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_documented_windows() {
        let options = PipelineOptions::default();
        assert_eq!(options.debounce, Duration::from_millis(100));
        assert_eq!(options.growth_tick, Duration::from_millis(100));
    }

    #[test]
    fn state_is_observable() {
        assert_ne!(PipelineState::Idle, PipelineState::Matching);
        let state = PipelineState::Debouncing;
        assert_eq!(format!("{state:?}"), "Debouncing");
    }
}
