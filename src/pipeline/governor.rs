//! # Concurrency Governor
//!
//! Bounds concurrent handler work and adapts that bound to observed throughput.
//!
//! ## Backpressure
//!
//! The dispatch stage polls `in_flight` against `ceiling` every
//! [`BACKPRESSURE_POLL_INTERVAL`] before each launch. Polling keeps the ceiling
//! freely adjustable from the tuning loop without any wake-up bookkeeping; the
//! cost is launch latency of at most one poll interval.
//!
//! ## Tuning
//!
//! Hill climbing with a single direction-flip rule. Every window the
//! [`Tuner`] swaps the completion counter with zero and:
//!
//! ```text
//! curr == 0          → skip (keep direction and ceiling)
//! curr <  previous   → flip direction
//! upscale            → ceiling + 1   (unless at max_concurrency)
//! downscale          → ceiling - 1   (only while ceiling > min_concurrency)
//! previous = curr
//! ```
//!
//! The ceiling always moves by at most one per window and keeps hunting
//! around the handler's saturation point.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ConcurrencySettings;
use crate::metrics::PipelineMetrics;

/// Interval between capacity checks while the ceiling is reached
pub const BACKPRESSURE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared concurrency state for one worker
#[derive(Debug)]
pub struct ConcurrencyGovernor {
    in_flight: AtomicUsize,
    ceiling: AtomicUsize,
    window_count: AtomicU64,
    min_concurrency: usize,
    max_concurrency: Option<usize>,
    dynamic: bool,
    window: Duration,
}

/// Point-in-time view of the governor counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorSnapshot {
    pub in_flight: usize,
    pub ceiling: usize,
}

impl ConcurrencyGovernor {
    pub fn new(settings: &ConcurrencySettings) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            ceiling: AtomicUsize::new(settings.starting),
            window_count: AtomicU64::new(0),
            min_concurrency: settings.min,
            max_concurrency: settings.max,
            dynamic: !settings.fixed_rate,
            window: settings.window(),
        }
    }

    /// Handler invocations currently executing
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Current concurrency limit
    pub fn ceiling(&self) -> usize {
        self.ceiling.load(Ordering::Acquire)
    }

    /// Completions recorded in the current tuning window
    pub fn window_count(&self) -> u64 {
        self.window_count.load(Ordering::Acquire)
    }

    /// False in fixed-rate mode
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn min_concurrency(&self) -> usize {
        self.min_concurrency
    }

    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    pub fn snapshot(&self) -> GovernorSnapshot {
        GovernorSnapshot {
            in_flight: self.in_flight(),
            ceiling: self.ceiling(),
        }
    }

    /// Whether another handler invocation may launch right now
    pub fn has_capacity(&self) -> bool {
        self.in_flight() < self.ceiling()
    }

    /// Poll until there is capacity for one more invocation.
    ///
    /// Returns false if `cancellation` fired first.
    pub async fn wait_for_capacity(&self, cancellation: &CancellationToken) -> bool {
        loop {
            if cancellation.is_cancelled() {
                return false;
            }
            if self.has_capacity() {
                return true;
            }
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return false,
                _ = tokio::time::sleep(BACKPRESSURE_POLL_INTERVAL) => {}
            }
        }
    }

    /// Count one invocation as in flight until the returned guard drops.
    ///
    /// Dropping the guard releases the slot and, in dynamic mode, records a
    /// completion for the current tuning window. The guard also releases the
    /// slot when a handler panics.
    pub fn begin(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            governor: Arc::clone(self),
        }
    }

    /// Tuning loop state machine for this governor
    pub fn tuner(self: &Arc<Self>) -> Tuner {
        Tuner {
            governor: Arc::clone(self),
            previous: 0,
            upscale: true,
        }
    }

    fn complete(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        if self.dynamic {
            self.window_count.fetch_add(1, Ordering::AcqRel);
        }
    }
}

/// RAII marker for one executing handler invocation
#[derive(Debug)]
pub struct InFlightGuard {
    governor: Arc<ConcurrencyGovernor>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.governor.complete();
    }
}

/// Outcome of one tuning window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningDecision {
    /// No completions in the window; nothing changed
    Idle,
    Upscaled { ceiling: usize },
    Downscaled { ceiling: usize },
    /// Direction wanted a change but the floor or the maximum blocked it
    Held { ceiling: usize },
}

/// One tuning step: what was observed and what changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningStep {
    /// Completions observed in the window
    pub observed: u64,
    /// Direction after this step
    pub upscaling: bool,
    pub decision: TuningDecision,
}

/// Hill-climbing controller adjusting the governor's ceiling
///
/// Owned by the single tuning task, so its own state needs no synchronization.
#[derive(Debug)]
pub struct Tuner {
    governor: Arc<ConcurrencyGovernor>,
    previous: u64,
    upscale: bool,
}

impl Tuner {
    /// Close the current window and adjust the ceiling
    pub fn step(&mut self) -> TuningStep {
        let curr = self.governor.window_count.swap(0, Ordering::AcqRel);

        if curr == 0 {
            return TuningStep {
                observed: 0,
                upscaling: self.upscale,
                decision: TuningDecision::Idle,
            };
        }

        if curr < self.previous {
            self.upscale = !self.upscale;
        }

        let ceiling = self.governor.ceiling();
        let decision = if self.upscale {
            match self.governor.max_concurrency {
                Some(max) if ceiling >= max => TuningDecision::Held { ceiling },
                _ => TuningDecision::Upscaled {
                    ceiling: self.governor.ceiling.fetch_add(1, Ordering::AcqRel) + 1,
                },
            }
        } else if ceiling > self.governor.min_concurrency {
            TuningDecision::Downscaled {
                ceiling: self.governor.ceiling.fetch_sub(1, Ordering::AcqRel) - 1,
            }
        } else {
            TuningDecision::Held { ceiling }
        };

        self.previous = curr;

        TuningStep {
            observed: curr,
            upscaling: self.upscale,
            decision,
        }
    }

    /// Run one step per window until cancelled, publishing observations
    pub async fn run(
        mut self,
        cancellation: CancellationToken,
        metrics: Arc<dyn PipelineMetrics>,
        worker: Arc<str>,
    ) {
        let window = self.governor.window;
        debug!(
            worker = %worker,
            concurrency = self.governor.ceiling(),
            window_ms = window.as_millis() as u64,
            "Using dynamic concurrency"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                _ = tokio::time::sleep(window) => {}
            }

            let step = self.step();
            metrics.set_batch_size(&worker, step.observed);

            if step.decision == TuningDecision::Idle {
                continue;
            }

            let ceiling = self.governor.ceiling();
            metrics.set_max_concurrency(&worker, ceiling);
            debug!(
                worker = %worker,
                concurrency = ceiling,
                rate = step.observed as f64 / window.as_secs_f64(),
                upscaling = step.upscaling,
                "Tuning concurrency"
            );
        }

        info!(worker = %worker, concurrency = self.governor.ceiling(), "Concurrency tuner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamic(starting: usize, min: usize) -> Arc<ConcurrencyGovernor> {
        Arc::new(ConcurrencyGovernor::new(&ConcurrencySettings {
            starting,
            min,
            max: None,
            fixed_rate: false,
            window_ms: 100,
        }))
    }

    fn complete_n(governor: &Arc<ConcurrencyGovernor>, n: u64) {
        for _ in 0..n {
            drop(governor.begin());
        }
    }

    #[test]
    fn test_guard_tracks_in_flight() {
        let governor = dynamic(2, 1);
        let first = governor.begin();
        let second = governor.begin();
        assert_eq!(governor.in_flight(), 2);
        assert!(!governor.has_capacity());

        drop(first);
        assert_eq!(governor.in_flight(), 1);
        assert!(governor.has_capacity());
        drop(second);

        assert_eq!(governor.in_flight(), 0);
        assert_eq!(governor.window_count(), 2);
    }

    #[test]
    fn test_fixed_rate_does_not_count_window() {
        let governor = Arc::new(ConcurrencyGovernor::new(&ConcurrencySettings::fixed(3)));
        complete_n(&governor, 5);
        assert_eq!(governor.window_count(), 0);
        assert_eq!(governor.ceiling(), 3);
        assert!(!governor.is_dynamic());
    }

    #[test]
    fn test_idle_window_keeps_ceiling() {
        let governor = dynamic(4, 1);
        let mut tuner = governor.tuner();
        let step = tuner.step();
        assert_eq!(step.decision, TuningDecision::Idle);
        assert_eq!(governor.ceiling(), 4);
    }

    #[test]
    fn test_monotonic_throughput_upscales_each_window() {
        let governor = dynamic(2, 1);
        let mut tuner = governor.tuner();

        complete_n(&governor, 10);
        assert_eq!(tuner.step().decision, TuningDecision::Upscaled { ceiling: 3 });
        complete_n(&governor, 15);
        assert_eq!(tuner.step().decision, TuningDecision::Upscaled { ceiling: 4 });
        complete_n(&governor, 20);
        assert_eq!(tuner.step().decision, TuningDecision::Upscaled { ceiling: 5 });
        assert_eq!(governor.window_count(), 0);
    }

    #[test]
    fn test_throughput_drop_flips_direction() {
        let governor = dynamic(2, 2);
        let mut tuner = governor.tuner();

        complete_n(&governor, 10);
        tuner.step(); // 3
        complete_n(&governor, 12);
        tuner.step(); // 4

        complete_n(&governor, 8);
        let step = tuner.step();
        assert!(!step.upscaling);
        assert_eq!(step.decision, TuningDecision::Downscaled { ceiling: 3 });

        // 9 >= 8, so the downscale direction is kept.
        complete_n(&governor, 9);
        assert_eq!(tuner.step().decision, TuningDecision::Downscaled { ceiling: 2 });

        // At the floor the downscale is held.
        complete_n(&governor, 9);
        assert_eq!(tuner.step().decision, TuningDecision::Held { ceiling: 2 });
        assert_eq!(governor.ceiling(), 2);
    }

    #[test]
    fn test_max_concurrency_caps_upscale() {
        let governor = Arc::new(ConcurrencyGovernor::new(&ConcurrencySettings {
            starting: 2,
            min: 1,
            max: Some(3),
            fixed_rate: false,
            window_ms: 100,
        }));
        let mut tuner = governor.tuner();

        complete_n(&governor, 5);
        assert_eq!(tuner.step().decision, TuningDecision::Upscaled { ceiling: 3 });
        complete_n(&governor, 6);
        assert_eq!(tuner.step().decision, TuningDecision::Held { ceiling: 3 });
    }

    #[tokio::test]
    async fn test_wait_for_capacity_observes_cancellation() {
        let governor = dynamic(1, 1);
        let _busy = governor.begin();
        let token = CancellationToken::new();

        let waiter = {
            let governor = Arc::clone(&governor);
            let token = token.clone();
            tokio::spawn(async move { governor.wait_for_capacity(&token).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_capacity_resumes_when_slot_frees() {
        let governor = dynamic(1, 1);
        let busy = governor.begin();
        let token = CancellationToken::new();

        let waiter = {
            let governor = Arc::clone(&governor);
            let token = token.clone();
            tokio::spawn(async move { governor.wait_for_capacity(&token).await })
        };

        tokio::time::sleep(Duration::from_millis(25)).await;
        drop(busy);
        assert!(waiter.await.unwrap());
    }
}
