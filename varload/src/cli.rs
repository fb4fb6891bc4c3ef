//! Command line interface of the `varload` binary.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use argh::FromArgs;
use yansi::Paint;

use crate::attack::Attack;
use crate::config::Config;
use crate::http::HttpRemote;
use crate::pacer::{Pacer, PacerKind, ProfileSource};
use crate::report::{TextReporter, fmt_duration, write_summary};
use crate::state::PacerState;
use crate::{breaker, observability};

/// Sends HTTP load following a variable-rate profile.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Attack(AttackCommand),
    Breaker(BreakerCommand),
    Version(VersionCommand),
}

/// run a variable load attack against a URL
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "attack")]
struct AttackCommand {
    /// pacer to use for governing load rate [step-function, curve-fitting]
    #[argh(option)]
    pacer: PacerKind,

    /// the URL to attack, overrides the configuration
    #[argh(option)]
    url: Option<String>,

    /// CSV file describing the load profile
    #[argh(option)]
    file: Option<PathBuf>,

    /// inline load profile, e.g. `10s@50,30s@100` for step-function or `50,100` for curve-fitting
    #[argh(option)]
    pacing: Option<String>,

    /// total duration of the attack, required for curve-fitting
    #[argh(option, from_str_fn(parse_duration))]
    duration: Option<Duration>,

    /// slope of the curve-fitting ramp in hits per second squared
    #[argh(option)]
    slope: Option<f64>,

    /// upper bound of concurrently in-flight hits
    #[argh(option)]
    max_workers: Option<usize>,
}

/// find the highest constant rate the target sustains within a latency SLA
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "breaker")]
struct BreakerCommand {
    /// the URL to attack, overrides the configuration
    #[argh(option)]
    url: Option<String>,

    /// maximum p95 latency for a rate to pass
    #[argh(option, from_str_fn(parse_duration))]
    sla: Option<Duration>,

    /// the first rate probed, in requests per second
    #[argh(option)]
    start_rate: Option<u32>,

    /// the highest rate probed, in requests per second
    #[argh(option)]
    max_rate: Option<u32>,

    /// how long each rate is probed
    #[argh(option, from_str_fn(parse_duration))]
    step_duration: Option<Duration>,
}

/// print the varload version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| e.to_string())
}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config =
        Config::load(args.config.as_deref()).context("failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("varload-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    match args.command {
        Command::Attack(command) => {
            command.apply(&mut config);
            runtime.block_on(attack(config, command))
        }
        Command::Breaker(command) => {
            command.apply(&mut config);
            runtime.block_on(run_breaker(config))
        }
        Command::Version(_) => unreachable!(),
    }
}

impl AttackCommand {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(slope) = self.slope {
            config.slope = slope;
        }
        if let Some(max_workers) = self.max_workers {
            config.max_workers = max_workers;
        }
    }
}

impl BreakerCommand {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(sla) = self.sla {
            config.breaker.sla = sla;
        }
        if let Some(start_rate) = self.start_rate {
            config.breaker.start_rate = start_rate;
        }
        if let Some(max_rate) = self.max_rate {
            config.breaker.max_rate = max_rate;
        }
        if let Some(step_duration) = self.step_duration {
            config.breaker.step_duration = step_duration;
        }
    }
}

fn remote(config: &Config) -> Result<HttpRemote> {
    let remote = HttpRemote::new(config.target_url()?)
        .with_method(config.target_method()?)
        .with_timeout(config.timeout)
        .context("failed to create HTTP client")?;
    Ok(remote)
}

async fn attack(config: Config, command: AttackCommand) -> Result<()> {
    // Everything is validated before the first hit is sent.
    let remote = remote(&config)?;
    let source = ProfileSource::select(command.file, command.pacing)?;
    let profile = command
        .pacer
        .parse_profile(&config.name, &source, command.duration)?;
    let max_workers = config.target_workers()?;

    let state = Arc::new(PacerState::new(Arc::new(TextReporter)));
    let pacer = Pacer::new(command.pacer, profile, config.slope, Arc::clone(&state));
    let duration = pacer.duration();

    println!(
        "{} {} against {:?} with {} load profiles for {}",
        "Starting".bold(),
        pacer.profile().name().bold(),
        config.url,
        pacer.profile().segments().len(),
        fmt_duration(duration)
    );
    tracing::info!(%pacer, "starting attack");

    let started = Instant::now();
    let outcome = Attack {
        name: config.name.clone(),
        target: Arc::new(remote),
        pacer,
        state,
        duration,
        max_workers,
    }
    .run()
    .await;

    if outcome.stopped {
        tracing::warn!(hits = outcome.hits, "attack stopped before its duration elapsed");
    }

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", "## Total".bold())?;
    write_summary(&mut stdout, &outcome.summary)?;
    writeln!(
        stdout,
        "{} against {:?} completed in {}",
        config.name.bold().green(),
        config.url,
        fmt_duration(started.elapsed())
    )?;

    Ok(())
}

async fn run_breaker(config: Config) -> Result<()> {
    let remote = remote(&config)?;
    let max_workers = config.target_workers()?;

    println!(
        "{} against {:?} with SLA {}",
        "Searching maximum working rate".bold(),
        config.url,
        fmt_duration(config.breaker.sla)
    );

    breaker::run(Arc::new(remote), &config.breaker, max_workers)
        .await
        .context("rate search failed")?;
    Ok(())
}
