//! Observability setup for Parley.
//!
//! - `tracing_setup` -- global subscriber with optional OpenTelemetry export

pub mod tracing_setup;
