//! Pacing strategies that decide when the next hit of an attack is sent.
//!
//! Both strategies are driven by the dispatch engine through [`Pacer::pace`], which receives the
//! time elapsed since the attack began and the number of hits sent so far. The pacer answers with
//! a [`Pace`]: the delay until the next hit, or a signal to stop the attack.
//!
//! - [`StepFunctionPacer`] holds a constant rate within every segment of the profile.
//! - [`CurveFittingPacer`] ramps the rate linearly while chasing evenly spaced rate points.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::profile::{self, LoadProfile};
use crate::state::PacerState;

mod curve;
mod step;

pub use self::curve::{CurveFittingPacer, DEFAULT_SLOPE};
pub use self::step::StepFunctionPacer;

/// How long to idle before asking again when the active rate is zero.
const IDLE_POLL: Duration = Duration::from_secs(1);

/// The answer of a pacer: wait for `delay`, then send the next hit, or stop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Pace {
    /// Time to wait before the next hit. Zero means the next hit is due now.
    pub delay: Duration,
    /// Cease issuing further hits.
    pub stop: bool,
}

impl Pace {
    /// Send the next hit immediately.
    pub const fn now() -> Self {
        Self::wait(Duration::ZERO)
    }

    /// Send the next hit after `delay`.
    pub const fn wait(delay: Duration) -> Self {
        Self { delay, stop: false }
    }

    /// Stop the attack.
    pub const fn stop() -> Self {
        Self {
            delay: Duration::ZERO,
            stop: true,
        }
    }
}

/// Converts fractional nanoseconds into a duration, saturating at both ends.
fn nanos(ns: f64) -> Duration {
    // Float to integer casts saturate, and map NaN to zero.
    Duration::from_nanos(ns as u64)
}

/// The available pacing strategies.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PacerKind {
    /// Constant rates for specific durations.
    StepFunction,
    /// A linear ramp chasing rate points spread over a total duration.
    CurveFitting,
}

impl PacerKind {
    /// All known pacer names.
    pub const NAMES: [&'static str; 2] = ["step-function", "curve-fitting"];

    /// The name used to select this pacer.
    pub fn as_str(&self) -> &'static str {
        match self {
            PacerKind::StepFunction => "step-function",
            PacerKind::CurveFitting => "curve-fitting",
        }
    }

    /// Parses a profile from `source` in the grammar of this pacer.
    ///
    /// The curve-fitting pacer requires the total `duration` its rate points are spread across.
    pub fn parse_profile(
        &self,
        name: &str,
        source: &ProfileSource,
        duration: Option<Duration>,
    ) -> Result<LoadProfile, ConfigError> {
        let segments = match (self, source) {
            (PacerKind::StepFunction, ProfileSource::Inline(pacing)) => {
                profile::parse_step_str(pacing)?
            }
            (PacerKind::StepFunction, ProfileSource::File(path)) => {
                profile::parse_step_csv(open(path)?)?
            }
            (PacerKind::CurveFitting, source) => {
                let total = duration
                    .filter(|d| !d.is_zero())
                    .ok_or(ConfigError::MissingDuration(self.as_str()))?;
                match source {
                    ProfileSource::Inline(pacing) => profile::parse_curve_str(pacing, total)?,
                    ProfileSource::File(path) => profile::parse_curve_csv(open(path)?, total)?,
                }
            }
        };

        Ok(LoadProfile::new(name, segments)?)
    }
}

fn open(path: &Path) -> Result<BufReader<File>, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::ProfileFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

impl fmt::Display for PacerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PacerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "step-function" => Ok(PacerKind::StepFunction),
            "curve-fitting" => Ok(PacerKind::CurveFitting),
            other => Err(ConfigError::UnknownPacer(other.to_owned())),
        }
    }
}

/// Where a profile description comes from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProfileSource {
    /// A CSV file.
    File(PathBuf),
    /// An inline description string.
    Inline(String),
}

impl ProfileSource {
    /// Selects the profile source, requiring exactly one of `file` and `pacing`.
    pub fn select(file: Option<PathBuf>, pacing: Option<String>) -> Result<Self, ConfigError> {
        match (file, pacing) {
            (Some(file), None) => Ok(ProfileSource::File(file)),
            (None, Some(pacing)) => Ok(ProfileSource::Inline(pacing)),
            (None, None) => Err(ConfigError::MissingProfile),
            (Some(_), Some(_)) => Err(ConfigError::ConflictingProfile),
        }
    }
}

/// A pacer for a single attack.
#[derive(Debug)]
pub enum Pacer {
    /// See [`StepFunctionPacer`].
    StepFunction(StepFunctionPacer),
    /// See [`CurveFittingPacer`].
    CurveFitting(CurveFittingPacer),
}

impl Pacer {
    /// Creates a pacer of `kind` for `profile`.
    ///
    /// `slope` only applies to the curve-fitting pacer, whose rate points are spread across the
    /// profile's duration without the warm-up pad.
    pub fn new(kind: PacerKind, profile: LoadProfile, slope: f64, state: Arc<PacerState>) -> Self {
        match kind {
            PacerKind::StepFunction => Pacer::StepFunction(StepFunctionPacer::new(profile, state)),
            PacerKind::CurveFitting => {
                let duration = profile.total_duration() - profile::WARMUP_PAD;
                Pacer::CurveFitting(
                    CurveFittingPacer::new(profile, duration, state).with_slope(slope),
                )
            }
        }
    }

    /// Determines how long to wait until the next hit is sent.
    ///
    /// `elapsed` is the time since the attack began, `hits` the number of hits sent so far.
    pub fn pace(&self, elapsed: Duration, hits: u64) -> Pace {
        match self {
            Pacer::StepFunction(pacer) => pacer.pace(elapsed, hits),
            Pacer::CurveFitting(pacer) => pacer.pace(elapsed, hits),
        }
    }

    /// The profile played back by this pacer.
    pub fn profile(&self) -> &LoadProfile {
        match self {
            Pacer::StepFunction(pacer) => pacer.profile(),
            Pacer::CurveFitting(pacer) => pacer.profile(),
        }
    }

    /// How long an attack driven by this pacer runs.
    pub fn duration(&self) -> Duration {
        self.profile().total_duration()
    }
}

impl fmt::Display for Pacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pacer::StepFunction(pacer) => fmt::Display::fmt(pacer, f),
            Pacer::CurveFitting(pacer) => fmt::Display::fmt(pacer, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::ProfileError;
    use crate::profile::RateSegment;
    use crate::state::tests::CollectingReporter;

    #[test]
    fn parses_pacer_names() {
        assert_eq!(
            "step-function".parse::<PacerKind>().unwrap(),
            PacerKind::StepFunction
        );
        assert_eq!(
            "curve-fitting".parse::<PacerKind>().unwrap(),
            PacerKind::CurveFitting
        );
        assert!(matches!(
            "sawtooth".parse::<PacerKind>(),
            Err(ConfigError::UnknownPacer(name)) if name == "sawtooth"
        ));

        let err = "sawtooth".parse::<PacerKind>().unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"unknown pacer type "sawtooth", expected one of: step-function, curve-fitting"#
        );

        for name in PacerKind::NAMES {
            assert_eq!(name.parse::<PacerKind>().unwrap().as_str(), name);
        }
    }

    #[test]
    fn requires_exactly_one_profile_source() {
        assert!(matches!(
            ProfileSource::select(None, None),
            Err(ConfigError::MissingProfile)
        ));
        assert!(matches!(
            ProfileSource::select(Some("a.csv".into()), Some("1s@1".into())),
            Err(ConfigError::ConflictingProfile)
        ));
        assert_eq!(
            ProfileSource::select(None, Some("1s@1".into())).unwrap(),
            ProfileSource::Inline("1s@1".into())
        );
    }

    #[test]
    fn curve_fitting_requires_duration() {
        let source = ProfileSource::Inline("10,20".into());

        let err = PacerKind::CurveFitting
            .parse_profile("test", &source, None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingDuration("curve-fitting")));

        let err = PacerKind::CurveFitting
            .parse_profile("test", &source, Some(Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingDuration(_)));
    }

    #[test]
    fn parses_profile_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"10,5s\n20,5s\n").unwrap();
        let source = ProfileSource::File(file.path().into());

        let profile = PacerKind::StepFunction
            .parse_profile("test", &source, None)
            .unwrap();
        assert_eq!(profile.total_duration(), Duration::from_secs(11));
        assert_eq!(profile.segments()[1], RateSegment::new(20, Duration::from_secs(5)));
    }

    #[test]
    fn reports_malformed_profiles() {
        let source = ProfileSource::Inline("5s@10,oops".into());

        let err = PacerKind::StepFunction
            .parse_profile("test", &source, None)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Profile(ProfileError::MissingSeparator { .. })
        ));
        assert!(err.to_string().contains("oops"));
    }

    #[test]
    fn rejects_profiles_longer_than_a_duration() {
        let source = ProfileSource::Inline("500000000000y@1,500000000000y@1".into());
        let err = PacerKind::StepFunction
            .parse_profile("test", &source, None)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Profile(ProfileError::DurationOverflow { .. })
        ));

        let source = ProfileSource::Inline("10,20".into());
        let err = PacerKind::CurveFitting
            .parse_profile("test", &source, Some(Duration::MAX))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Profile(ProfileError::DurationOverflow { .. })
        ));
    }

    #[test]
    fn missing_profile_file() {
        let source = ProfileSource::File("/nonexistent/profile.csv".into());

        let err = PacerKind::StepFunction
            .parse_profile("test", &source, None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::ProfileFile { .. }));
    }

    #[test]
    fn curve_pacer_spans_the_requested_duration() {
        let source = ProfileSource::Inline("10,100".into());
        let profile = PacerKind::CurveFitting
            .parse_profile("test", &source, Some(Duration::from_secs(20)))
            .unwrap();

        let state = Arc::new(PacerState::new(Arc::new(CollectingReporter::default())));
        let pacer = Pacer::new(PacerKind::CurveFitting, profile, 1.0, state);

        let Pacer::CurveFitting(ref curve) = pacer else {
            panic!("expected curve fitting pacer");
        };
        assert_eq!(curve.duration(), Duration::from_secs(20));
        assert_eq!(pacer.duration(), Duration::from_secs(21));
        assert_eq!(pacer.pace(Duration::ZERO, 0), Pace::now());
    }
}
