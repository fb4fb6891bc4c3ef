use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{IDLE_POLL, Pace, nanos};
use crate::locator::locate;
use crate::profile::{LoadProfile, WARMUP_PAD};
use crate::state::PacerState;

/// Paces an attack with specific request rates for specific durations.
///
/// The rate is constant within every segment, so the expected number of hits is the integral of a
/// step function over the elapsed time.
#[derive(Debug)]
pub struct StepFunctionPacer {
    profile: LoadProfile,
    state: Arc<PacerState>,
}

impl StepFunctionPacer {
    /// Creates a pacer playing back `profile`, tracking segments in `state`.
    pub fn new(profile: LoadProfile, state: Arc<PacerState>) -> Self {
        Self { profile, state }
    }

    /// The profile played back by this pacer.
    pub fn profile(&self) -> &LoadProfile {
        &self.profile
    }

    /// The number of hits that should have been sent after `elapsed`.
    ///
    /// The first segment's rate applies from the start of the attack, the last segment's rate
    /// applies indefinitely once the profile is exhausted.
    pub fn expected_hits(&self, elapsed: Duration) -> f64 {
        let segments = self.profile.segments();
        let mut hits = 0.0;
        let mut start = Duration::ZERO;
        let mut end = WARMUP_PAD;

        for (index, segment) in segments.iter().enumerate() {
            end += segment.duration;
            let rate = f64::from(segment.rate);

            if elapsed <= end || index == segments.len() - 1 {
                return hits + rate * elapsed.saturating_sub(start).as_secs_f64();
            }

            hits += rate * (end - start).as_secs_f64();
            start = end;
        }

        hits
    }

    /// Determines how long to wait until the next hit is sent.
    pub fn pace(&self, elapsed: Duration, hits: u64) -> Pace {
        let location = locate(&self.profile, elapsed);
        self.state.observe(&location, elapsed);

        let expected_hits = self.expected_hits(elapsed);
        if hits == 0 || (hits as f64) < expected_hits {
            // Running behind, send next hit immediately.
            return Pace::now();
        }

        let segment = location.segment;
        if segment.rate == 0 {
            return match location.end.checked_sub(elapsed) {
                Some(rest) if !location.remainder && !rest.is_zero() => Pace::wait(rest),
                _ => Pace::wait(IDLE_POLL),
            };
        }

        let ns_per_hit = (1.0 / segment.hits_per_ns()).round();
        let hits_to_wait = (hits + 1) as f64 - expected_hits;
        Pace::wait(nanos(ns_per_hit * hits_to_wait))
    }
}

impl fmt::Display for StepFunctionPacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StepFunctionPacer Rates{{{}}}", self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::RateSegment;
    use crate::state::tests::CollectingReporter;

    const fn secs(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    fn pacer(segments: Vec<RateSegment>) -> (StepFunctionPacer, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::default());
        let state = Arc::new(PacerState::new(reporter.clone()));
        let profile = LoadProfile::new("test", segments).unwrap();
        (StepFunctionPacer::new(profile, state), reporter)
    }

    fn two_step() -> (StepFunctionPacer, Arc<CollectingReporter>) {
        pacer(vec![
            RateSegment::new(10, secs(10)),
            RateSegment::new(50, secs(10)),
        ])
    }

    #[test]
    fn expected_hits_integrates_the_step_function() {
        let (pacer, _) = two_step();

        assert_eq!(pacer.expected_hits(Duration::ZERO), 0.0);
        assert_eq!(pacer.expected_hits(secs(5)), 50.0);
        assert_eq!(pacer.expected_hits(secs(11)), 110.0);
        assert_eq!(pacer.expected_hits(secs(15)), 110.0 + 200.0);
        assert_eq!(pacer.expected_hits(secs(21)), 110.0 + 500.0);
        // remainder rate
        assert_eq!(pacer.expected_hits(secs(25)), 110.0 + 700.0);
    }

    #[test]
    fn expected_hits_is_continuous_and_non_decreasing() {
        let (pacer, _) = pacer(vec![
            RateSegment::new(100, secs(2)),
            RateSegment::new(0, secs(3)),
            RateSegment::new(7, secs(1)),
            RateSegment::new(250, secs(4)),
        ]);

        let step = Duration::from_millis(1);
        let mut previous = pacer.expected_hits(Duration::ZERO);
        for millis in 1..15_000 {
            let current = pacer.expected_hits(Duration::from_millis(millis));
            assert!(current >= previous, "decreased at {millis}ms");
            // no jumps: the steepest segment adds 250 hits/s
            assert!(current - previous <= 250.0 * step.as_secs_f64() + 1e-9);
            previous = current;
        }
    }

    #[test]
    fn dispatches_immediately_when_behind() {
        let (pacer, _) = two_step();

        for (elapsed, hits) in [(0, 0), (5, 0), (5, 49), (15, 300), (25, 800), (100, 1000)] {
            let pace = pacer.pace(secs(elapsed), hits);
            assert_eq!(pace, Pace::now(), "at {elapsed}s with {hits} hits");
        }
    }

    #[test]
    fn waits_for_the_next_hit_when_on_schedule() {
        let (pacer, _) = two_step();

        // 50 hits expected after 5s at 10 req/s: the 51st hit is due in 100ms.
        assert_eq!(pacer.pace(secs(5), 50), Pace::wait(Duration::from_millis(100)));
        // Two hits ahead of schedule.
        assert_eq!(pacer.pace(secs(5), 52), Pace::wait(Duration::from_millis(300)));
        // 50 req/s in the second segment.
        assert_eq!(pacer.pace(secs(15), 310), Pace::wait(Duration::from_millis(20)));
    }

    #[test]
    fn never_stops() {
        let (pacer, _) = pacer(vec![RateSegment::new(1, secs(1))]);

        let pace = pacer.pace(secs(1), u64::MAX / 2);
        assert!(!pace.stop);
        assert!(pace.delay > Duration::ZERO);
    }

    #[test]
    fn idles_through_zero_rate_segments() {
        let (pacer, _) = pacer(vec![
            RateSegment::new(10, secs(1)),
            RateSegment::new(0, secs(5)),
            RateSegment::new(10, secs(1)),
        ]);

        // 20 hits are due by the end of the first segment; nothing during the pause.
        assert_eq!(pacer.pace(secs(4), 20), Pace::wait(secs(3)));
    }

    #[test]
    fn tracks_segment_transitions() {
        let (pacer, _) = two_step();

        pacer.pace(secs(5), 0);
        assert_eq!(pacer.state.active(), Some(RateSegment::new(10, secs(10))));

        pacer.pace(secs(15), 0);
        assert_eq!(pacer.state.active(), Some(RateSegment::new(50, secs(10))));

        pacer.pace(secs(25), 0);
        assert_eq!(pacer.state.active(), Some(RateSegment::new(50, secs(10))));
    }
}
