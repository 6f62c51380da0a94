//! Multi-source, multi-sink logging and asynchronous action-reporting core
//! for long-running process software.
//!
//! - [`severity`] / [`mask`] / [`gate`]: severities, bitmasks, and the gate
//!   every emit call is checked against.
//! - [`observer`]: the sequenced publish/observe primitive configuration
//!   changes ride on.
//! - [`record`]: the message payload, reference-counted and optionally
//!   pooled.
//! - [`source`]: the logger façade and its emitters.
//! - [`sink`] / [`sinks`]: the trait every destination implements, plus the
//!   in-memory collecting sink.
//! - [`hub`]: interning, group routing, and fan-out distribution.
//! - [`queue_sink`]: a bounded, drop-oldest buffering adapter around any
//!   sink.
//! - [`file_sink`] / [`compression`]: the rotating-file sink.
//! - [`config`]: JSON configuration loading for the above.
//! - [`action`]: the asynchronous action-reporting state machine.
//! - [`error`]: the crate's error type.

pub mod action;
pub mod compression;
pub mod config;
pub mod error;
pub mod file_sink;
pub mod gate;
pub mod hub;
pub mod mask;
pub mod observer;
pub mod queue_sink;
pub mod record;
pub mod severity;
pub mod sink;
pub mod sinks;
pub mod source;

#[cfg(test)]
mod tests;

pub use error::{LogCoreError, Result};
pub use gate::{LogGate, LoggerConfig};
pub use hub::Hub;
pub use mask::MesgTypeMask;
pub use record::Record;
pub use severity::Severity;
pub use sink::Sink;
pub use source::Logger;

/// Initializes the process-wide hub. Safe to call more than once; later
/// calls are no-ops. Internal diagnostics ride on the `tracing` crate under
/// the fixed target `"logcore::internal"` — wire up a subscriber the same
/// way you would for any `tracing`-instrumented dependency, or call
/// [`install_internal_diagnostics_subscriber`] for a sensible default.
pub fn init_process_logging() -> &'static hub::Hub {
    hub::init()
}

/// Installs an env-filter-driven `fmt` subscriber so this crate's own
/// internal diagnostics (`target: "logcore::internal"`) go somewhere
/// visible. Optional — applications that already run their own `tracing`
/// subscriber don't need this. A no-op if a global subscriber is already
/// set.
pub fn install_internal_diagnostics_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Convenience constructor for a named logger bound to the process-wide hub.
pub fn logger(name: &str) -> Logger {
    Logger::new(hub::hub(), name)
}
