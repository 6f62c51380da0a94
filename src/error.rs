//! Error types for `logcore`.
//!
//! Setup-time failures (bad gate text, an unusable directory) are returned from
//! the call that caused them. Runtime failures that the system is designed to
//! absorb (a dropped record, a queue overflow) are recorded internally and
//! never surface here — see §7 of the design notes for the full policy table.

use std::fmt;

/// Errors raised by configuration and setup paths, and by logic-violation
/// assertions that the caller asked to be surfaced rather than silently
/// corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogCoreError {
    /// A gate/mask text string did not match the grammar in `mask::parse`.
    InvalidGateText(String),
    /// A rotating-file sink could not be set up (bad directory, permissions).
    Configuration(String),
    /// An already-emitted record was mutated, or a state machine was asked
    /// to take a transition that isn't in its table.
    LogicViolation(String),
    /// A pool was asked for a record past its outstanding-record cap.
    PoolExhausted,
}

impl fmt::Display for LogCoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogCoreError::InvalidGateText(text) => write!(f, "invalid gate text: '{text}'"),
            LogCoreError::Configuration(detail) => write!(f, "configuration error: {detail}"),
            LogCoreError::LogicViolation(detail) => write!(f, "logic violation: {detail}"),
            LogCoreError::PoolExhausted => write!(f, "record pool exhausted"),
        }
    }
}

impl std::error::Error for LogCoreError {}

pub type Result<T> = std::result::Result<T, LogCoreError>;
