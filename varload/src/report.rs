//! Human readable rendering of metric summaries.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use yansi::Paint;

use crate::metrics::Summary;
use crate::profile::RateSegment;

/// Receives a snapshot whenever a segment's metrics are closed.
pub trait Reporter: Send + Sync + fmt::Debug {
    /// Reports the closed metrics of `segment`.
    fn report(&self, segment: &RateSegment, summary: &Summary);
}

/// Writes snapshots as text to stdout.
#[derive(Debug, Default)]
pub struct TextReporter;

impl Reporter for TextReporter {
    fn report(&self, segment: &RateSegment, summary: &Summary) {
        let mut stdout = io::stdout().lock();
        let result = writeln!(stdout, "{} {}", "## Segment".bold(), segment.bold().blue())
            .and_then(|()| write_summary(&mut stdout, summary));

        if let Err(error) = result {
            tracing::error!(error = &error as &dyn std::error::Error, "failed to write report");
        }
    }
}

/// Discards all snapshots.
#[derive(Debug, Default)]
pub struct QuietReporter;

impl Reporter for QuietReporter {
    fn report(&self, _segment: &RateSegment, _summary: &Summary) {}
}

/// Renders `summary` in the tabular text layout.
pub fn write_summary(out: &mut impl Write, summary: &Summary) -> io::Result<()> {
    let latencies = &summary.latencies;
    let mean_bytes = if summary.requests == 0 {
        0.0
    } else {
        summary.bytes_in as f64 / summary.requests as f64
    };

    writeln!(
        out,
        "{:<48}{}, {:.2}, {:.2}",
        "Requests      [total, rate, throughput]",
        summary.requests.bold(),
        summary.rate,
        summary.throughput
    )?;
    writeln!(
        out,
        "{:<48}{}, {}, {}",
        "Duration      [total, attack, wait]",
        fmt_duration(summary.duration + summary.wait),
        fmt_duration(summary.duration),
        fmt_duration(summary.wait)
    )?;
    writeln!(
        out,
        "{:<48}{}, {}, {}, {}, {}, {}, {}",
        "Latencies     [min, mean, 50, 90, 95, 99, max]",
        fmt_duration(latencies.min),
        fmt_duration(latencies.mean),
        fmt_duration(latencies.p50),
        fmt_duration(latencies.p90),
        fmt_duration(latencies.p95).bold(),
        fmt_duration(latencies.p99),
        fmt_duration(latencies.max)
    )?;
    writeln!(
        out,
        "{:<48}{}, {:.2}",
        "Bytes In      [total, mean]", summary.bytes_in, mean_bytes
    )?;

    let success = format!("{:.2}%", summary.success * 100.0);
    let success = if summary.success < 1.0 {
        success.red()
    } else {
        success.green()
    };
    writeln!(out, "{:<48}{}", "Success       [ratio]", success.bold())?;

    let codes = summary
        .status_codes
        .iter()
        .map(|(code, count)| format!("{code}:{count}"))
        .collect::<Vec<_>>()
        .join("  ");
    writeln!(out, "{:<48}{}", "Status Codes  [code:count]", codes)?;

    writeln!(out, "Error Set:")?;
    for error in &summary.errors {
        writeln!(out, "{}", error.red())?;
    }

    Ok(())
}

const UNITS: [Duration; 6] = [
    Duration::from_secs(3600),
    Duration::from_secs(60),
    Duration::from_secs(1),
    Duration::from_millis(1),
    Duration::from_micros(1),
    Duration::from_nanos(1),
];

/// Rounds `duration` to the unit below its most significant one, e.g. seconds to milliseconds.
pub fn round(duration: Duration) -> Duration {
    for (unit, next) in UNITS.iter().zip(&UNITS[1..]) {
        if duration >= *unit {
            let step = next.as_nanos();
            let rounded = (duration.as_nanos() + step / 2) / step * step;
            return Duration::from_nanos(rounded as u64);
        }
    }
    duration
}

/// Formats a duration rounded with [`round`].
pub fn fmt_duration(duration: Duration) -> String {
    humantime::format_duration(round(duration)).to_string()
}
