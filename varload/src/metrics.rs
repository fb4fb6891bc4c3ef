//! Aggregation of hit results into request, latency and status metrics.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use sketches_ddsketch::DDSketch;

/// The outcome of a single request against the target.
#[derive(Clone, Debug)]
pub struct Hit {
    /// When the request was dispatched.
    pub timestamp: Instant,
    /// Time until the response body was fully received, or the request failed.
    pub latency: Duration,
    /// Response status, `None` on transport errors.
    pub status: Option<u16>,
    /// Number of response body bytes received.
    pub bytes_in: u64,
    /// Transport or protocol error, if any.
    pub error: Option<String>,
}

impl Hit {
    /// A hit succeeded when it produced a non-error status and no transport error.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && matches!(self.status, Some(200..400))
    }
}

/// Accumulates [`Hit`]s until [`close`](Self::close)d into a [`Summary`].
#[derive(Default)]
pub struct Metrics {
    latencies: DDSketch,
    success: u64,
    bytes_in: u64,
    status_codes: BTreeMap<u16, u64>,
    errors: BTreeSet<String>,

    earliest: Option<Instant>,
    latest: Option<Instant>,
    end: Option<Instant>,
}

impl Metrics {
    /// Number of hits recorded so far.
    pub fn requests(&self) -> u64 {
        self.latencies.count() as u64
    }

    /// Returns `true` if no hits were recorded.
    pub fn is_empty(&self) -> bool {
        self.requests() == 0
    }

    /// Records a hit.
    pub fn add(&mut self, hit: &Hit) {
        self.latencies.add(hit.latency.as_secs_f64());
        self.bytes_in += hit.bytes_in;
        *self.status_codes.entry(hit.status.unwrap_or(0)).or_default() += 1;

        if hit.is_success() {
            self.success += 1;
        }
        if let Some(ref error) = hit.error {
            self.errors.insert(error.clone());
        }

        let completed = hit.timestamp + hit.latency;
        self.earliest = Some(self.earliest.map_or(hit.timestamp, |t| t.min(hit.timestamp)));
        self.latest = Some(self.latest.map_or(hit.timestamp, |t| t.max(hit.timestamp)));
        self.end = Some(self.end.map_or(completed, |t| t.max(completed)));
    }

    /// Computes the derived figures over everything recorded.
    pub fn close(&self) -> Summary {
        let requests = self.requests();
        let (attack, wait) = match (self.earliest, self.latest, self.end) {
            (Some(earliest), Some(latest), Some(end)) => {
                (latest - earliest, end.saturating_duration_since(latest))
            }
            _ => (Duration::ZERO, Duration::ZERO),
        };

        let per_sec = |count: u64, window: Duration| {
            if window.is_zero() {
                0.0
            } else {
                count as f64 / window.as_secs_f64()
            }
        };

        Summary {
            requests,
            rate: per_sec(requests, attack),
            throughput: per_sec(self.success, attack + wait),
            duration: attack,
            wait,
            latencies: Latencies::from_sketch(&self.latencies),
            bytes_in: self.bytes_in,
            success: if requests == 0 {
                0.0
            } else {
                self.success as f64 / requests as f64
            },
            status_codes: self.status_codes.clone(),
            errors: self.errors.iter().cloned().collect(),
        }
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("requests", &self.requests())
            .field("success", &self.success)
            .field("bytes_in", &self.bytes_in)
            .finish_non_exhaustive()
    }
}

/// Latency distribution of a set of hits.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Latencies {
    pub min: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub max: Duration,
}

impl Latencies {
    fn from_sketch(sketch: &DDSketch) -> Self {
        let count = sketch.count();
        if count == 0 {
            return Self::default();
        }

        let secs = |value: Option<f64>| Duration::from_secs_f64(value.unwrap_or(0.0).max(0.0));
        let quantile = |q: f64| secs(sketch.quantile(q).ok().flatten());

        Self {
            min: secs(sketch.min()),
            mean: secs(sketch.sum().map(|sum| sum / count as f64)),
            p50: quantile(0.5),
            p90: quantile(0.9),
            p95: quantile(0.95),
            p99: quantile(0.99),
            max: secs(sketch.max()),
        }
    }
}

/// Closed metrics of a segment or a whole attack.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    /// Number of requests sent.
    pub requests: u64,
    /// Requests sent per second, between the first and last dispatch.
    pub rate: f64,
    /// Successful requests per second, including the wait for the last response.
    pub throughput: f64,
    /// Time between the first and the last dispatch.
    pub duration: Duration,
    /// Time waited for the last response after the last dispatch.
    pub wait: Duration,
    pub latencies: Latencies,
    /// Total response body bytes received.
    pub bytes_in: u64,
    /// Ratio of successful requests, between `0` and `1`.
    pub success: f64,
    /// Count per status code; `0` counts transport errors.
    pub status_codes: BTreeMap<u16, u64>,
    /// Distinct errors, sorted.
    pub errors: Vec<String>,
}
