//! Variable-load HTTP attacks.
//!
//! An attack plays back a [`LoadProfile`](profile::LoadProfile): a sequence of rate segments,
//! each holding a request rate for a duration. A [`Pacer`](pacer::Pacer) decides when every hit
//! is due, either holding each segment's rate as a step function or ramping towards evenly spaced
//! rate points. Metrics are reported per segment whenever the active segment changes.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod attack;
pub mod breaker;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod locator;
pub mod metrics;
pub mod observability;
pub mod pacer;
pub mod profile;
pub mod report;
pub mod state;
