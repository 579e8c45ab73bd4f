//! Synthetic progress while a conversion request is outstanding.
//!
//! The conversion service reports nothing until it answers, so progress is
//! estimated: every tick adds a random increment from `[0, max_increment)`,
//! capped at a ceiling below 100. Only the terminal transition reports 100.
//!
//! Three pieces live here:
//!
//! * [`ProgressEstimator`]: draws increments; pure apart from its RNG.
//! * [`spawn_ticker`]: drives the estimator on a fixed cadence inside a
//!   tokio task owned by a [`TickerGuard`]. Dropping the guard aborts the
//!   task, so the ticker cannot outlive the episode that started it.
//! * [`ConversionProgressCallback`]: lets the presentation layer observe
//!   episode start, every progress sample, and the terminal outcome.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2xlsx::{ConversionProgressCallback, ConversionError};
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct Recorder {
//!     samples: Mutex<Vec<f64>>,
//! }
//!
//! impl ConversionProgressCallback for Recorder {
//!     fn on_progress(&self, percent: f64) {
//!         self.samples.lock().unwrap().push(percent);
//!     }
//!
//!     fn on_conversion_failed(&self, error: &ConversionError) {
//!         eprintln!("failed: {error}");
//!     }
//! }
//! ```

use crate::error::ConversionError;
use crate::state::Artifact;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Observer of a conversion episode.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Methods are invoked while the orchestrator holds its
/// state lock, which keeps samples ordered: no `on_progress` call can follow
/// the terminal callback of the same episode. Implementations must therefore
/// be quick and must not call back into the orchestrator.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called when an episode enters `InFlight`.
    fn on_conversion_start(&self, file_name: &str, size_bytes: u64) {
        let _ = (file_name, size_bytes);
    }

    /// Called with every progress sample, including the initial 0 and final 100.
    fn on_progress(&self, percent: f64) {
        let _ = percent;
    }

    /// Called once when the episode ends with a spreadsheet.
    fn on_conversion_succeeded(&self, artifact: &Artifact) {
        let _ = artifact;
    }

    /// Called once when the episode ends with an error.
    fn on_conversion_failed(&self, error: &ConversionError) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias for the shared callback handle.
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

/// Draws the random increments applied on each tick.
#[derive(Debug)]
pub struct ProgressEstimator {
    max_increment: f64,
    rng: StdRng,
}

impl ProgressEstimator {
    pub fn new(max_increment: f64) -> Self {
        Self {
            max_increment,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic estimator for tests and reproducible demos.
    pub fn with_seed(max_increment: f64, seed: u64) -> Self {
        Self {
            max_increment,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Next increment, uniformly drawn from `[0, max_increment)`.
    ///
    /// Always 0 when `max_increment` is not a positive finite number.
    pub fn next_increment(&mut self) -> f64 {
        if !(self.max_increment > 0.0 && self.max_increment.is_finite()) {
            return 0.0;
        }
        self.rng.gen_range(0.0..self.max_increment)
    }
}

const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Whether the ticker should keep running after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// Owns a running ticker task; aborts it on drop.
#[derive(Debug)]
pub struct TickerGuard {
    handle: Option<JoinHandle<()>>,
}

impl TickerGuard {
    /// Abort the ticker now. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            trace!("Progress ticker aborted");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TickerGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn a task that calls `on_tick` with a fresh increment every `period`.
///
/// The first tick fires one full `period` after spawning. The task ends on
/// its own when `on_tick` returns [`TickControl::Stop`], and is aborted when
/// the returned guard is stopped or dropped.
///
/// A zero `period` is raised to one millisecond. Must be called from within
/// a tokio runtime.
pub fn spawn_ticker<F>(period: Duration, mut estimator: ProgressEstimator, mut on_tick: F) -> TickerGuard
where
    F: FnMut(f64) -> TickControl + Send + 'static,
{
    let period = period.max(MIN_TICK_PERIOD);
    let handle = tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let increment = estimator.next_increment();
            if on_tick(increment) == TickControl::Stop {
                trace!("Progress ticker stopped by its episode");
                break;
            }
        }
    });
    TickerGuard {
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn increments_stay_in_range() {
        let mut est = ProgressEstimator::with_seed(10.0, 7);
        for _ in 0..1_000 {
            let inc = est.next_increment();
            assert!((0.0..10.0).contains(&inc), "increment out of range: {inc}");
        }
    }

    #[test]
    fn empty_increment_range_yields_zero() {
        for max in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let mut est = ProgressEstimator::with_seed(max, 1);
            assert_eq!(est.next_increment(), 0.0, "max_increment {max}");
        }
    }

    #[test]
    fn seeded_estimators_agree() {
        let mut a = ProgressEstimator::with_seed(10.0, 3);
        let mut b = ProgressEstimator::with_seed(10.0, 3);
        for _ in 0..10 {
            assert_eq!(a.next_increment(), b.next_increment());
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start("a.pdf", 10);
        cb.on_progress(42.0);
        cb.on_conversion_failed(&ConversionError::network("down"));
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_fires_on_cadence() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _guard = spawn_ticker(
            Duration::from_millis(500),
            ProgressEstimator::with_seed(10.0, 1),
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                TickControl::Continue
            },
        );

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(1_002)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_still_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let guard = spawn_ticker(
            Duration::ZERO,
            ProgressEstimator::with_seed(10.0, 1),
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                TickControl::Continue
            },
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(guard.is_running());
        assert!(count.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_guard_cancels_ticker() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let guard = spawn_ticker(
            Duration::from_millis(100),
            ProgressEstimator::with_seed(10.0, 1),
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                TickControl::Continue
            },
        );
        tokio::time::sleep(Duration::from_millis(350)).await;
        drop(guard);
        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_stops_itself_on_request() {
        let increments = Arc::new(Mutex::new(Vec::new()));
        let rec = Arc::clone(&increments);
        let guard = spawn_ticker(
            Duration::from_millis(100),
            ProgressEstimator::with_seed(10.0, 9),
            move |inc| {
                let mut v = rec.lock().unwrap();
                v.push(inc);
                if v.len() == 2 {
                    TickControl::Stop
                } else {
                    TickControl::Continue
                }
            },
        );
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(increments.lock().unwrap().len(), 2);
        assert!(!guard.is_running());
    }
}
