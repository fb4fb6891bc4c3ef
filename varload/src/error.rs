//! Error types for profile parsing and attack configuration.

use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing a load profile description.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The profile does not contain a single segment.
    #[error("load profile has no rates")]
    Empty,

    /// A rate is not a non-negative integer.
    #[error("invalid rate {token:?}: {source}")]
    InvalidRate {
        /// The offending token.
        token: String,
        /// The underlying parse error.
        source: ParseIntError,
    },

    /// A duration could not be parsed, for example `30s` or `2m`.
    #[error("invalid duration {token:?}: {source}")]
    InvalidDuration {
        /// The offending token.
        token: String,
        /// The underlying parse error.
        source: humantime::DurationError,
    },

    /// An inline step descriptor lacks the `@` between duration and rate.
    #[error("invalid pacing descriptor {token:?}: expected `duration@rate`")]
    MissingSeparator {
        /// The offending token.
        token: String,
    },

    /// A tabular row is missing a required column.
    #[error("invalid pacing row {row:?}: missing column")]
    MissingColumn {
        /// The offending row.
        row: String,
    },

    /// A segment with neither rate nor duration.
    #[error("invalid pacing descriptor {token:?}: rate and duration are both zero")]
    ZeroSegment {
        /// The offending token.
        token: String,
    },

    /// The segment durations add up to more than a duration can hold.
    #[error("load profile of {segments} rates is too long")]
    DurationOverflow {
        /// Number of segments in the profile.
        segments: usize,
    },

    /// The tabular input is not valid CSV.
    #[error("invalid pacing file: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors in the attack configuration, detected before any request is sent.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The target URL cannot be parsed.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// The URL as given.
        url: String,
        /// Why the URL was rejected.
        reason: String,
    },

    /// The HTTP method is not a valid token.
    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),

    /// The bound of in-flight hits is zero or too large.
    #[error("max_workers must be between 1 and {max}, got {value}")]
    InvalidMaxWorkers {
        /// The configured value.
        value: usize,
        /// The largest supported value.
        max: usize,
    },

    /// Neither a profile file nor an inline profile was given.
    #[error("--file or --pacing must be provided")]
    MissingProfile,

    /// Both a profile file and an inline profile were given.
    #[error("--file and --pacing cannot both be provided")]
    ConflictingProfile,

    /// The pacer name is not one of the known strategies.
    #[error(
        "unknown pacer type {0:?}, expected one of: {names}",
        names = crate::pacer::PacerKind::NAMES.join(", ")
    )]
    UnknownPacer(String),

    /// The curve-fitting pacer requires a total duration.
    #[error("{0:?} pacer requires a --duration be provided")]
    MissingDuration(&'static str),

    /// The profile file could not be opened.
    #[error("failed to open pacing file {path:?}: {source}")]
    ProfileFile {
        /// The path of the file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The profile description is malformed.
    #[error(transparent)]
    Profile(#[from] ProfileError),
}
