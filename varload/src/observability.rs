//! Logging setup for the `varload` binary.

use std::env;
use std::io::IsTerminal as _;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{LogFormat, Logging};

/// Installs the global tracing subscriber writing to stderr.
///
/// Reports go to stdout, so logs never interleave with them when stdout is redirected.
pub fn init_tracing(config: &Logging) {
    let (level, env_filter) = parse_rust_log(config.level);

    let format = match config.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let layer = match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Auto | LogFormat::Simplified => layer.with_ansi(false).compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(level))
        .with(env_filter)
        .try_init()
        .ok();
}

/// Determines the effective log level and module filter.
///
/// `RUST_LOG` takes precedence over the configured level. If it is a plain level, it replaces the
/// configured one. Otherwise it is used literally as filter directives.
pub fn parse_rust_log(configured: LevelFilter) -> (LevelFilter, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => configured,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        hyper=WARN,\
        reqwest=WARN,\
        varload=TRACE,\
        ",
    );

    (level, env_filter)
}
