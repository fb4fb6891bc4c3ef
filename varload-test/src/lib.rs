//! Test utilities for varload.
//!
//! This crate provides an in-process HTTP target to attack in integration tests, along with a
//! logger for tests. See the modules for all available utilities.

pub mod server;
pub mod tracing;
