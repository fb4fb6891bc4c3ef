//! Runs an attack: asks the pacer when each hit is due and dispatches hits concurrently.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::http::HttpRemote;
use crate::metrics::{Hit, Summary};
use crate::pacer::{Pace, Pacer};
use crate::state::PacerState;

/// Default upper bound of in-flight hits.
pub const DEFAULT_MAX_WORKERS: usize = 10_000;

/// The largest supported bound of in-flight hits.
///
/// Waiting for outstanding hits acquires all permits at once, which takes a `u32`.
pub const MAX_WORKERS: usize = if Semaphore::MAX_PERMITS < u32::MAX as usize {
    Semaphore::MAX_PERMITS
} else {
    u32::MAX as usize
};

/// Something hits can be sent to.
pub trait Target: Send + Sync + 'static {
    /// Sends one hit and reports its outcome.
    fn hit(&self) -> impl Future<Output = Hit> + Send;
}

impl Target for HttpRemote {
    fn hit(&self) -> impl Future<Output = Hit> + Send {
        HttpRemote::hit(self)
    }
}

/// A single attack against a target.
pub struct Attack<T> {
    /// Name of the attack for identification in logs.
    pub name: String,
    /// Where hits are sent.
    pub target: Arc<T>,
    /// Decides when the next hit is due.
    pub pacer: Pacer,
    /// The runtime state shared with the pacer.
    pub state: Arc<PacerState>,
    /// When to stop sending hits.
    pub duration: Duration,
    /// Upper bound of in-flight hits.
    pub max_workers: usize,
}

impl<T> fmt::Debug for Attack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attack")
            .field("name", &self.name)
            .field("pacer", &self.pacer)
            .field("duration", &self.duration)
            .field("max_workers", &self.max_workers)
            .finish_non_exhaustive()
    }
}

/// The result of a finished attack.
#[derive(Debug)]
pub struct AttackOutcome {
    /// Number of hits sent.
    pub hits: u64,
    /// Whether the pacer stopped the attack before its duration elapsed.
    pub stopped: bool,
    /// Wall-clock time from the first hit until all hits completed.
    pub elapsed: Duration,
    /// Metrics of the whole attack.
    pub summary: Summary,
}

impl<T: Target> Attack<T> {
    /// Runs the attack to completion.
    ///
    /// Hits are sent until the duration elapses or the pacer signals a stop. All in-flight hits
    /// are awaited, then the metrics of the last segment are reported.
    pub async fn run(self) -> AttackOutcome {
        let Attack {
            name,
            target,
            pacer,
            state,
            duration,
            max_workers,
        } = self;

        tracing::debug!(%name, %pacer, ?duration, "starting attack");

        let max_workers = max_workers.clamp(1, MAX_WORKERS);
        let semaphore = Arc::new(Semaphore::new(max_workers));
        let began = Instant::now();
        let mut hits = 0u64;
        let mut stopped = false;

        loop {
            let elapsed = began.elapsed();
            if elapsed >= duration {
                break;
            }

            let Pace { delay, stop } = pacer.pace(elapsed, hits);
            if stop {
                tracing::warn!(hits, "next hit would overflow the pacer, stopping attack");
                stopped = true;
                break;
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay.min(duration - elapsed)).await;
                if began.elapsed() >= duration {
                    break;
                }
            }

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            // All workers may have been busy for longer than the rest of the attack.
            if began.elapsed() >= duration {
                break;
            }
            hits += 1;

            let target = Arc::clone(&target);
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                let hit = target.hit().await;
                state.record(&hit);
                drop(permit);
            });
        }

        // by acquiring *all* the permits, we wait for all outstanding hits to finish
        let _permits = semaphore
            .acquire_many(u32::try_from(max_workers).unwrap_or(u32::MAX))
            .await;

        AttackOutcome {
            hits,
            stopped,
            elapsed: began.elapsed(),
            summary: state.finish(),
        }
    }
}
