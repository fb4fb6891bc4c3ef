//! Configuration for varload.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags
//! 2. Environment variables (prefixed with `VARLOAD__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! Environment variables use double underscores (`__`) to denote nested configuration structures.
//! For example:
//!
//! - `VARLOAD__URL=http://localhost:9000/` sets the attacked URL
//! - `VARLOAD__BREAKER__SLA=500ms` sets the latency SLA of the breaker
//!
//! The same configuration as YAML:
//!
//! ```yaml
//! url: http://localhost:9000/
//! breaker:
//!   sla: 500ms
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::attack::{DEFAULT_MAX_WORKERS, MAX_WORKERS};
use crate::error::ConfigError;
use crate::pacer::DEFAULT_SLOPE;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "VARLOAD__";

/// Main configuration struct.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Name of the attack, used in logs.
    ///
    /// # Default
    ///
    /// `"Variable Load Test"`
    pub name: String,

    /// The URL to attack.
    ///
    /// # Default
    ///
    /// `http://localhost:8080/`
    ///
    /// # Environment Variable
    ///
    /// `VARLOAD__URL`
    pub url: String,

    /// The HTTP method of every hit.
    ///
    /// # Default
    ///
    /// `GET`
    pub method: String,

    /// Timeout of a single hit, including reading the response body.
    ///
    /// # Default
    ///
    /// `30s`
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Upper bound of concurrently in-flight hits.
    ///
    /// When all workers are busy, the attack falls behind its schedule and catches up as soon as
    /// workers become available.
    ///
    /// # Default
    ///
    /// `10000`
    pub max_workers: usize,

    /// Slope of the curve-fitting ramp in hits per second squared.
    ///
    /// # Default
    ///
    /// `1.0`
    pub slope: f64,

    /// Logging configuration.
    pub logging: Logging,

    /// Configuration of the `breaker` command.
    pub breaker: Breaker,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "Variable Load Test".into(),
            url: "http://localhost:8080/".into(),
            method: "GET".into(),
            timeout: Duration::from_secs(30),
            max_workers: DEFAULT_MAX_WORKERS,
            slope: DEFAULT_SLOPE,
            logging: Logging::default(),
            breaker: Breaker::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the environment.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `VARLOAD__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Validates and parses the target URL.
    ///
    /// Only absolute `http` and `https` URLs are accepted.
    pub fn target_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason,
        };

        let url = Url::parse(&self.url).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(invalid(format!("unsupported scheme {scheme:?}"))),
        }
    }

    /// Validates the bound of in-flight hits.
    pub fn target_workers(&self) -> Result<usize, ConfigError> {
        if (1..=MAX_WORKERS).contains(&self.max_workers) {
            Ok(self.max_workers)
        } else {
            Err(ConfigError::InvalidMaxWorkers {
                value: self.max_workers,
                max: MAX_WORKERS,
            })
        }
    }

    /// Validates and parses the HTTP method.
    pub fn target_method(&self) -> Result<Method, ConfigError> {
        Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ConfigError::InvalidMethod(self.method.clone()))
    }
}

/// Configuration of the `breaker` command.
///
/// Used in: [`Config::breaker`]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Breaker {
    /// Maximum p95 latency for a rate to pass.
    ///
    /// # Default
    ///
    /// `1s`
    #[serde(with = "humantime_serde")]
    pub sla: Duration,

    /// The first rate probed, in requests per second.
    ///
    /// # Default
    ///
    /// `20`
    pub start_rate: u32,

    /// The highest rate probed, in requests per second.
    ///
    /// # Default
    ///
    /// `100000`
    pub max_rate: u32,

    /// How long each rate is probed.
    ///
    /// # Default
    ///
    /// `15s`
    #[serde(with = "humantime_serde")]
    pub step_duration: Duration,
}

impl Default for Breaker {
    fn default() -> Self {
        Self {
            sla: Duration::from_secs(1),
            start_rate: 20,
            max_rate: 100_000,
            step_duration: Duration::from_secs(15),
        }
    }
}

/// Where and how log lines are written.
///
/// Logs go to stderr so they never mix with the reports on stdout.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Most verbose level that is logged, `info` by default.
    ///
    /// A `RUST_LOG` environment variable takes precedence, see
    /// [`parse_rust_log`](crate::observability::parse_rust_log).
    #[serde(with = "level_filter")]
    pub level: LevelFilter,

    /// Line format, `auto` by default.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::default(),
        }
    }
}

/// Line format of the logs, e.g. `VARLOAD__LOGGING__FORMAT=json`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `pretty` when stderr is a terminal, `simplified` otherwise.
    #[default]
    Auto,
    /// Multi-line, colored events for interactive runs.
    Pretty,
    /// One compact line per event without colors.
    Simplified,
    /// One JSON object per event.
    Json,
}

mod level_filter {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::level_filters::LevelFilter;

    pub fn serialize<S>(level: &LevelFilter, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(level)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<LevelFilter, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level = String::deserialize(deserializer)?;
        level.parse().map_err(D::Error::custom)
    }
}
