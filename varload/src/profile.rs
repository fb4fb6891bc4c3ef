//! Load profiles: the ordered rate segments an attack plays back.
//!
//! A [`LoadProfile`] is built from either a tabular (CSV) description or a compact inline string.
//! The accepted grammar depends on the pacer:
//!
//! - **Step function**: rows of `rate, duration` or inline `duration@rate` tokens, for example
//!   `"30s@50,1m@200"`.
//! - **Curve fitting**: rows of `rate` or inline bare integers, for example `"50,100,200"`. The
//!   duration of every rate point is derived by splitting the total attack duration evenly.
//!
//! Parsing is all-or-nothing: the first malformed token aborts with a [`ProfileError`] naming it.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::error::ProfileError;

/// Time added in front of every profile to absorb warm-up and measurement skew.
pub const WARMUP_PAD: Duration = Duration::from_secs(1);

/// A target rate held for a duration.
///
/// Two segments are equal iff both rate and duration are equal. The pacers rely on this exact
/// comparison to detect when the active segment changes.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct RateSegment {
    /// Requests per second.
    pub rate: u32,
    /// How long the rate is held.
    pub duration: Duration,
}

impl RateSegment {
    /// Creates a new segment.
    pub const fn new(rate: u32, duration: Duration) -> Self {
        Self { rate, duration }
    }

    /// Returns `true` for the unset `0 req/s for 0s` segment.
    pub fn is_zero(&self) -> bool {
        self.rate == 0 && self.duration.is_zero()
    }

    /// The rate expressed in hits per nanosecond.
    pub fn hits_per_ns(&self) -> f64 {
        f64::from(self.rate) / Duration::from_secs(1).as_nanos() as f64
    }
}

impl fmt::Display for RateSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} req/s for {}",
            self.rate,
            humantime::format_duration(self.duration)
        )
    }
}

/// A named, ordered sequence of rate segments.
///
/// The order of the segments is playback order. A profile always has at least one segment.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadProfile {
    name: String,
    segments: Vec<RateSegment>,
}

impl LoadProfile {
    /// Creates a profile, rejecting an empty segment list.
    ///
    /// The total duration, including [`WARMUP_PAD`], must be representable as a [`Duration`], so
    /// that every running sum over the segments is too.
    pub fn new(name: impl Into<String>, segments: Vec<RateSegment>) -> Result<Self, ProfileError> {
        if segments.is_empty() {
            return Err(ProfileError::Empty);
        }

        let total = segments
            .iter()
            .try_fold(WARMUP_PAD, |total, segment| total.checked_add(segment.duration));
        if total.is_none() {
            return Err(ProfileError::DurationOverflow {
                segments: segments.len(),
            });
        }

        Ok(Self {
            name: name.into(),
            segments,
        })
    }

    /// The human readable name of this profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All segments in playback order.
    pub fn segments(&self) -> &[RateSegment] {
        &self.segments
    }

    /// The final segment, whose rate applies once the profile's nominal duration has elapsed.
    pub fn remainder(&self) -> RateSegment {
        // `new` guarantees at least one segment.
        self.segments[self.segments.len() - 1]
    }

    /// The aggregate duration: [`WARMUP_PAD`] plus the duration of every segment.
    pub fn total_duration(&self) -> Duration {
        self.segments
            .iter()
            .fold(WARMUP_PAD, |total, segment| total + segment.duration)
    }
}

impl fmt::Display for LoadProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} rates", self.name, self.segments.len())
    }
}

/// Duration of each rate point when `total` is split evenly across `points` points.
///
/// The result is rounded up to whole seconds.
pub fn duration_per_point(total: Duration, points: usize) -> Duration {
    if points == 0 {
        return Duration::ZERO;
    }
    let secs = (total.as_secs_f64() / points as f64).ceil();
    Duration::from_secs(secs as u64)
}

/// Parses step-function CSV rows of the form `rate, duration`.
pub fn parse_step_csv<R: io::Read>(reader: R) -> Result<Vec<RateSegment>, ProfileError> {
    let mut segments = Vec::new();
    for record in csv_reader(reader).records() {
        let record = record?;
        let row = record_text(&record);

        let (Some(rate), Some(duration)) = (record.get(0), record.get(1)) else {
            return Err(ProfileError::MissingColumn { row });
        };

        let segment = RateSegment::new(parse_rate(rate)?, parse_duration(duration)?);
        if segment.is_zero() {
            return Err(ProfileError::ZeroSegment { token: row });
        }
        segments.push(segment);
    }

    non_empty(segments)
}

/// Parses curve-fitting CSV rows holding a single `rate` column.
///
/// Every rate point receives an equal share of `total`.
pub fn parse_curve_csv<R: io::Read>(
    reader: R,
    total: Duration,
) -> Result<Vec<RateSegment>, ProfileError> {
    let mut rates = Vec::new();
    for record in csv_reader(reader).records() {
        let record = record?;
        let Some(rate) = record.get(0) else {
            return Err(ProfileError::MissingColumn {
                row: record_text(&record),
            });
        };
        rates.push(parse_rate(rate)?);
    }

    spread_points(rates, total)
}

/// Parses a step-function string of the form `duration1@rate1, duration2@rate2, ...`.
pub fn parse_step_str(pacing: &str) -> Result<Vec<RateSegment>, ProfileError> {
    let mut segments = Vec::new();
    for token in pacing.split(',') {
        let token = token.trim();
        let Some((duration, rate)) = token.split_once('@') else {
            return Err(ProfileError::MissingSeparator {
                token: token.to_owned(),
            });
        };

        let segment = RateSegment::new(parse_rate(rate)?, parse_duration(duration)?);
        if segment.is_zero() {
            return Err(ProfileError::ZeroSegment {
                token: token.to_owned(),
            });
        }
        segments.push(segment);
    }

    non_empty(segments)
}

/// Parses a curve-fitting string of the form `rate1, rate2, ...`.
pub fn parse_curve_str(pacing: &str, total: Duration) -> Result<Vec<RateSegment>, ProfileError> {
    let rates = pacing
        .split(',')
        .map(parse_rate)
        .collect::<Result<Vec<_>, _>>()?;

    spread_points(rates, total)
}

fn spread_points(rates: Vec<u32>, total: Duration) -> Result<Vec<RateSegment>, ProfileError> {
    let duration = duration_per_point(total, rates.len());
    let segments = rates
        .into_iter()
        .map(|rate| RateSegment::new(rate, duration))
        .collect();

    non_empty(segments)
}

fn non_empty(segments: Vec<RateSegment>) -> Result<Vec<RateSegment>, ProfileError> {
    if segments.is_empty() {
        return Err(ProfileError::Empty);
    }
    Ok(segments)
}

fn csv_reader<R: io::Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader)
}

fn record_text(record: &csv::StringRecord) -> String {
    record.iter().collect::<Vec<_>>().join(",")
}

fn parse_rate(token: &str) -> Result<u32, ProfileError> {
    let token = token.trim();
    token.parse().map_err(|source| ProfileError::InvalidRate {
        token: token.to_owned(),
        source,
    })
}

fn parse_duration(token: &str) -> Result<Duration, ProfileError> {
    let token = token.trim();
    humantime::parse_duration(token).map_err(|source| ProfileError::InvalidDuration {
        token: token.to_owned(),
        source,
    })
}
