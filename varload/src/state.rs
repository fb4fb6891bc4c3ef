//! Runtime state owned by a single attack.
//!
//! [`PacerState`] tracks the active segment and accumulates metrics per segment and for the whole
//! attack. It is created for each attack and shared between the pacer and the dispatch workers, so
//! consecutive or concurrent attacks never observe each other's segments.
//!
//! Whenever the pacer observes a different active segment, the metrics of the previous segment
//! are closed and handed to the configured [`Reporter`] before new hits are attributed to the new
//! segment.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::locator::Location;
use crate::metrics::{Hit, Metrics, Summary};
use crate::profile::RateSegment;
use crate::report::{Reporter, fmt_duration};

#[derive(Debug, Default)]
struct SegmentState {
    active: Option<RateSegment>,
    metrics: Metrics,
    remainder_announced: bool,
}

/// Per-attack pacing state: the active segment and its metrics.
#[derive(Debug)]
pub struct PacerState {
    reporter: Arc<dyn Reporter>,
    segment: Mutex<SegmentState>,
    total: Mutex<Metrics>,
}

impl PacerState {
    /// Creates fresh state that reports segment snapshots to `reporter`.
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter,
            segment: Mutex::default(),
            total: Mutex::default(),
        }
    }

    fn segment(&self) -> MutexGuard<'_, SegmentState> {
        self.segment.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn total(&self) -> MutexGuard<'_, Metrics> {
        self.total.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The segment most recently observed by the pacer.
    pub fn active(&self) -> Option<RateSegment> {
        self.segment().active
    }

    /// Observes the active segment at `elapsed`.
    ///
    /// If it differs from the previously active segment, the previous segment's metrics are
    /// reported and reset. Returns `true` if a transition happened. Concurrent callers observing
    /// the same transition report it exactly once.
    pub fn observe(&self, location: &Location, elapsed: Duration) -> bool {
        let mut state = self.segment();

        if location.remainder && !state.remainder_announced {
            state.remainder_announced = true;
            tracing::info!(
                rate = location.segment.rate,
                "setting default rate of {} req/s for remainder of attack",
                location.segment.rate
            );
        }

        if state.active == Some(location.segment) {
            return false;
        }

        if let Some(previous) = state.active
            && !state.metrics.is_empty()
        {
            let metrics = std::mem::take(&mut state.metrics);
            self.reporter.report(&previous, &metrics.close());
        }

        state.active = Some(location.segment);
        if elapsed.as_secs() > 0 {
            tracing::info!(
                segment = %location.segment,
                index = location.index,
                "attacking at a rate of {} ({} elapsed)",
                location.segment,
                fmt_duration(elapsed)
            );
        } else {
            tracing::info!(
                segment = %location.segment,
                index = location.index,
                "attacking at a rate of {}",
                location.segment
            );
        }

        true
    }

    /// Attributes a completed hit to the active segment and to the attack totals.
    pub fn record(&self, hit: &Hit) {
        self.segment().metrics.add(hit);
        self.total().add(hit);
    }

    /// Reports the metrics of the active segment and returns the summary of the whole attack.
    pub fn finish(&self) -> Summary {
        {
            let mut state = self.segment();
            if let Some(active) = state.active
                && !state.metrics.is_empty()
            {
                let metrics = std::mem::take(&mut state.metrics);
                self.reporter.report(&active, &metrics.close());
            }
        }

        self.total().close()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;

    /// Collects all reported snapshots in memory.
    #[derive(Debug, Default)]
    pub(crate) struct CollectingReporter {
        pub(crate) snapshots: Mutex<Vec<(RateSegment, Summary)>>,
    }

    impl CollectingReporter {
        pub(crate) fn segments(&self) -> Vec<RateSegment> {
            let snapshots = self.snapshots.lock().unwrap();
            snapshots.iter().map(|(segment, _)| *segment).collect()
        }
    }

    impl Reporter for CollectingReporter {
        fn report(&self, segment: &RateSegment, summary: &Summary) {
            self.snapshots
                .lock()
                .unwrap()
                .push((*segment, summary.clone()));
        }
    }

    fn location(rate: u32, remainder: bool) -> Location {
        Location {
            segment: RateSegment::new(rate, Duration::from_secs(10)),
            index: 0,
            end: Duration::from_secs(11),
            remainder,
        }
    }

    fn hit() -> Hit {
        Hit {
            timestamp: Instant::now(),
            latency: Duration::from_millis(5),
            status: Some(200),
            bytes_in: 0,
            error: None,
        }
    }

    #[test]
    fn reports_previous_segment_on_transition() {
        let reporter = Arc::new(CollectingReporter::default());
        let state = PacerState::new(reporter.clone());

        assert!(state.observe(&location(10, false), Duration::ZERO));
        state.record(&hit());
        state.record(&hit());

        assert!(!state.observe(&location(10, false), Duration::from_secs(1)));
        assert!(reporter.segments().is_empty());

        assert!(state.observe(&location(50, false), Duration::from_secs(12)));
        state.record(&hit());

        let snapshots = reporter.snapshots.lock().unwrap().clone();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].0.rate, 10);
        assert_eq!(snapshots[0].1.requests, 2);
        drop(snapshots);

        let total = state.finish();
        assert_eq!(total.requests, 3);
        assert_eq!(
            reporter.segments(),
            [location(10, false).segment, location(50, false).segment]
        );
    }

    #[test]
    fn skips_snapshot_for_segments_without_hits() {
        let reporter = Arc::new(CollectingReporter::default());
        let state = PacerState::new(reporter.clone());

        state.observe(&location(10, false), Duration::ZERO);
        state.observe(&location(50, false), Duration::from_secs(12));
        state.observe(&location(50, true), Duration::from_secs(25));

        assert!(reporter.segments().is_empty());
        assert_eq!(state.active(), Some(location(50, true).segment));
        assert_eq!(state.finish().requests, 0);
    }

    /// Log output captured by a scoped subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn capture(&self, f: impl FnOnce()) {
            let logs = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || logs.clone())
                .with_ansi(false)
                .finish();
            tracing::subscriber::with_default(subscriber, f);
        }

        fn count(&self, needle: &str) -> usize {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .matches(needle)
                .count()
        }
    }

    #[test]
    fn announces_remainder_rate_once_per_attack() {
        const NOTICE: &str = "for remainder of attack";

        let reporter = Arc::new(CollectingReporter::default());
        let logs = CapturedLogs::default();

        logs.capture(|| {
            let state = PacerState::new(reporter.clone());
            state.observe(&location(10, false), Duration::ZERO);
            for secs in 12..40 {
                state.observe(&location(50, true), Duration::from_secs(secs));
            }
        });
        assert_eq!(logs.count(NOTICE), 1);
        assert_eq!(logs.count("attacking at a rate of 50 req/s"), 1);

        // The next attack starts over with its own state.
        logs.capture(|| {
            let state = PacerState::new(reporter.clone());
            state.observe(&location(50, true), Duration::from_secs(12));
            state.observe(&location(50, true), Duration::from_secs(13));
        });
        assert_eq!(logs.count(NOTICE), 2);
    }

    #[test]
    fn concurrent_observers_report_once() {
        let reporter = Arc::new(CollectingReporter::default());
        let state = Arc::new(PacerState::new(reporter.clone()));

        state.observe(&location(10, false), Duration::ZERO);
        state.record(&hit());

        let transitions: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let state = &state;
                    scope.spawn(move || {
                        (0..100)
                            .filter(|_| state.observe(&location(50, false), Duration::from_secs(12)))
                            .count()
                    })
                })
                .collect();

            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(transitions, 1);
        assert_eq!(reporter.segments(), [location(10, false).segment]);
    }

    #[test]
    fn separate_attacks_do_not_share_state() {
        let reporter = Arc::new(CollectingReporter::default());
        let first = PacerState::new(reporter.clone());
        let second = PacerState::new(reporter.clone());

        first.observe(&location(10, false), Duration::ZERO);

        assert_eq!(second.active(), None);
        assert!(second.observe(&location(10, false), Duration::ZERO));
    }
}
