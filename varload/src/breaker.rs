//! Searches for the highest constant rate a target sustains within a latency SLA.
//!
//! The search first doubles the rate until a probe fails, then bisects between the last passing
//! and the first failing rate. Every probe is a separate attack with its own runtime state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use yansi::Paint;

use crate::attack::{Attack, Target};
use crate::config::Breaker;
use crate::pacer::{Pacer, PacerKind};
use crate::profile::{LoadProfile, RateSegment};
use crate::report::{QuietReporter, fmt_duration};
use crate::state::PacerState;

/// Finds the highest rate in `start_rate..=max_rate` for which `probe` passes.
///
/// Returns `0` if no probed rate passes. Errors from `probe` abort the search.
pub async fn search<F, Fut>(start_rate: u32, max_rate: u32, mut probe: F) -> Result<u32>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let max_rate = max_rate.max(1);
    let mut rate = start_rate.clamp(1, max_rate);
    let mut ok_rate = 0;

    // first, find the point at which the system breaks
    let mut nok_rate = loop {
        if !probe(rate).await? {
            break rate;
        }

        ok_rate = rate;
        if rate >= max_rate {
            tracing::info!(max_rate, "maximum rate reached without breaking");
            return Ok(ok_rate);
        }
        rate = rate.saturating_mul(2).min(max_rate);
    };

    // next, do a binary search between the last passing and the first failing rate
    while nok_rate - ok_rate > 1 {
        rate = ok_rate + (nok_rate - ok_rate) / 2;
        if probe(rate).await? {
            ok_rate = rate;
        } else {
            nok_rate = rate;
        }
    }

    Ok(ok_rate)
}

/// Attacks `target` at a constant `rate` and checks the p95 latency against the SLA.
pub async fn probe<T: Target>(
    target: &Arc<T>,
    config: &Breaker,
    rate: u32,
    max_workers: usize,
) -> Result<bool> {
    let segment = RateSegment::new(rate, config.step_duration);
    let profile = LoadProfile::new(format!("breaker@{rate}"), vec![segment])?;
    let state = Arc::new(PacerState::new(Arc::new(QuietReporter)));
    let pacer = Pacer::new(PacerKind::StepFunction, profile, 0.0, Arc::clone(&state));

    let attack = Attack {
        name: format!("breaker@{rate}"),
        target: Arc::clone(target),
        pacer,
        state,
        duration: config.step_duration,
        max_workers,
    };
    let outcome = attack.run().await;

    let latency = outcome.summary.latencies.p95;
    let passed = outcome.summary.success > 0.0 && within_sla(latency, config.sla);
    if passed {
        println!(
            "{} at {} req/s (latency {})",
            "Success".bold().green(),
            rate.bold(),
            fmt_duration(latency)
        );
    } else {
        println!(
            "{} at {} req/s (latency {}, success {:.2}%)",
            "Failed".bold().red(),
            rate.bold(),
            fmt_duration(latency),
            outcome.summary.success * 100.0
        );
    }

    Ok(passed)
}

fn within_sla(latency: Duration, sla: Duration) -> bool {
    latency <= sla
}

/// Runs the full rate search against `target`, returning the maximum working rate.
pub async fn run<T: Target>(target: Arc<T>, config: &Breaker, max_workers: usize) -> Result<u32> {
    let max = search(config.start_rate, config.max_rate, |rate| {
        let target = Arc::clone(&target);
        async move { probe(&target, config, rate, max_workers).await }
    })
    .await?;

    println!("{} {} req/s", "Maximum Working Rate:".bold(), max.bold().blue());
    Ok(max)
}
