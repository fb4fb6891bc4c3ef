use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{IDLE_POLL, Pace, nanos};
use crate::locator::locate;
use crate::profile::{LoadProfile, RateSegment};
use crate::state::PacerState;

/// The default slope of the rate ramp, in hits per second squared.
pub const DEFAULT_SLOPE: f64 = 1.0;

/// Chases a set of target rates spread out over a total duration.
///
/// Instead of holding each rate constant, the instantaneous rate grows linearly with elapsed time:
/// `rate(t) = a·t + b`, where `a` is the slope and `b` the rate of the active rate point. The
/// expected number of hits is the closed-form integral `a·t²/2 + b·t`.
#[derive(Debug)]
pub struct CurveFittingPacer {
    profile: LoadProfile,
    duration: Duration,
    slope: f64,
    state: Arc<PacerState>,
}

impl CurveFittingPacer {
    /// Creates a pacer for the rate points of `profile`, spread out over `duration`.
    pub fn new(profile: LoadProfile, duration: Duration, state: Arc<PacerState>) -> Self {
        Self {
            profile,
            duration,
            slope: DEFAULT_SLOPE,
            state,
        }
    }

    /// Sets the slope `a` of the rate ramp.
    pub fn with_slope(mut self, slope: f64) -> Self {
        self.slope = slope;
        self
    }

    /// The rate points chased by this pacer.
    pub fn profile(&self) -> &LoadProfile {
        &self.profile
    }

    /// The total duration the rate points are spread across.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The number of hits that should have been sent after `t`, chasing `point`.
    ///
    /// Returns a float so the deficit against the target is exact when solving for the next wait.
    pub fn expected_hits(&self, t: Duration, point: &RateSegment) -> f64 {
        let a = self.slope;
        let b = f64::from(point.rate);
        let x = t.as_secs_f64();

        (a * x.powi(2)) / 2.0 + b * x
    }

    /// The instantaneous rate in hits per second at `t`, chasing `point`.
    pub fn rate(&self, t: Duration, point: &RateSegment) -> f64 {
        self.slope * t.as_secs_f64() + f64::from(point.rate)
    }

    /// Determines how long to wait until the next hit is sent.
    ///
    /// Signals [`Pace::stop`] when the wait for the next hit would overflow.
    pub fn pace(&self, elapsed: Duration, hits: u64) -> Pace {
        let location = locate(&self.profile, elapsed);
        self.state.observe(&location, elapsed);

        let point = location.segment;
        let expected_hits = self.expected_hits(elapsed, &point);
        if hits == 0 || (hits as f64) < expected_hits {
            // Running behind, send next hit immediately.
            return Pace::now();
        }

        let rate = self.rate(elapsed, &point);
        if rate <= 0.0 {
            return match location.end.checked_sub(elapsed) {
                Some(rest) if !location.remainder && !rest.is_zero() => Pace::wait(rest),
                _ => Pace::wait(IDLE_POLL),
            };
        }

        let interval = (1e9 / rate).round();
        let n = interval as u64;
        if n != 0 && (i64::MAX as u64) / n < hits {
            // We would overflow the wait if we continued, so stop the attack.
            return Pace::stop();
        }

        let delta = (hits + 1) as f64 - expected_hits;
        Pace::wait(nanos(interval * delta))
    }
}

impl fmt::Display for CurveFittingPacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurveFittingPacer Rates{{{}}}", self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::parse_curve_str;
    use crate::state::tests::CollectingReporter;

    const fn secs(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    fn pacer(points: &str, total: Duration) -> CurveFittingPacer {
        let reporter = Arc::new(CollectingReporter::default());
        let state = Arc::new(PacerState::new(reporter));
        let segments = parse_curve_str(points, total).unwrap();
        let profile = LoadProfile::new("test", segments).unwrap();
        CurveFittingPacer::new(profile, total, state)
    }

    fn assert_close(actual: f64, expected: f64) {
        let tolerance = 1e-6 * expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn rate_points_split_the_total_duration() {
        let pacer = pacer("10, 100", secs(20));

        let segments = pacer.profile().segments();
        assert_eq!(segments[0], RateSegment::new(10, secs(10)));
        assert_eq!(segments[1], RateSegment::new(100, secs(10)));
    }

    #[test]
    fn expected_hits_follow_the_closed_form() {
        let pacer = pacer("10, 100", secs(20));
        let point = pacer.profile().segments()[0];

        assert_eq!(pacer.expected_hits(Duration::ZERO, &point), 0.0);
        // a·t²/2 + b·t = 100/2 + 10·10
        assert_close(pacer.expected_hits(secs(10), &point), 150.0);
        assert_close(pacer.rate(secs(10), &point), 20.0);
    }

    #[test]
    fn zero_slope_degenerates_to_constant_rate() {
        let pacer = pacer("40", secs(10)).with_slope(0.0);
        let point = pacer.profile().segments()[0];

        for millis in [0, 1, 250, 1_000, 7_777, 60_000] {
            let t = Duration::from_millis(millis);
            assert_close(pacer.expected_hits(t, &point), 40.0 * t.as_secs_f64());
            assert_close(pacer.rate(t, &point), 40.0);
        }
    }

    #[test]
    fn dispatches_immediately_when_behind() {
        let pacer = pacer("10, 100", secs(20));

        for (elapsed, hits) in [(0, 0), (1, 5), (10, 149), (15, 1000), (30, 3000)] {
            let pace = pacer.pace(secs(elapsed), hits);
            assert_eq!(pace, Pace::now(), "at {elapsed}s with {hits} hits");
        }
    }

    #[test]
    fn waits_on_the_instantaneous_rate() {
        let pacer = pacer("10, 100", secs(20));

        // 150 hits expected at 10s, the rate is 20 req/s.
        assert_eq!(pacer.pace(secs(10), 150), Pace::wait(Duration::from_millis(50)));
    }

    #[test]
    fn stops_instead_of_overflowing() {
        let pacer = pacer("1", secs(1)).with_slope(0.0);

        // One hit per second: the wait for hit 10^10 does not fit into an i64 of nanoseconds.
        let pace = pacer.pace(secs(1), 10_000_000_000);
        assert!(pace.stop);

        let pace = pacer.pace(secs(1), 1_000);
        assert!(!pace.stop);
        assert_eq!(pace.delay, secs(1000));
    }

    #[test]
    fn tracks_rate_points() {
        let pacer = pacer("10, 100", secs(20));

        pacer.pace(secs(5), 0);
        assert_eq!(pacer.state.active().map(|p| p.rate), Some(10));

        pacer.pace(secs(15), 0);
        assert_eq!(pacer.state.active().map(|p| p.rate), Some(100));
    }
}
