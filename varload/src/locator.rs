//! Finds the segment of a [`LoadProfile`] that is active at a given point of an attack.

use std::time::Duration;

use crate::profile::{LoadProfile, RateSegment, WARMUP_PAD};

/// The segment active at some elapsed time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Location {
    /// The active segment.
    pub segment: RateSegment,
    /// Position of the segment within the profile.
    pub index: usize,
    /// Elapsed time at which the segment's window closes.
    ///
    /// For the remainder segment this is the profile's total duration, which has already passed.
    pub end: Duration,
    /// Whether the profile's nominal duration is exhausted and the last rate carries on.
    pub remainder: bool,
}

/// Locates the active segment at `elapsed`.
///
/// Segments are walked in order, accumulating their durations on top of [`WARMUP_PAD`]. The first
/// segment whose aggregate end is at or after `elapsed` is active. Once `elapsed` exceeds the total
/// duration, the last segment applies as the remainder rate.
///
/// The unset `0 req/s for 0s` segment never matches.
pub fn locate(profile: &LoadProfile, elapsed: Duration) -> Location {
    let mut aggregate = WARMUP_PAD;
    for (index, segment) in profile.segments().iter().enumerate() {
        aggregate += segment.duration;
        if elapsed <= aggregate && !segment.is_zero() {
            return Location {
                segment: *segment,
                index,
                end: aggregate,
                remainder: false,
            };
        }
    }

    Location {
        segment: profile.remainder(),
        index: profile.segments().len() - 1,
        end: aggregate,
        remainder: true,
    }
}
