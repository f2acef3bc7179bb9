//! Error types for the simulation runtime
//!
//! Authoring mistakes and invalid scheduling input are errors and abort the
//! current evaluation. Simulated failures (a request settling in ERROR) are
//! ordinary data and live in [`super::request::Failure`] instead.

use thiserror::Error;

use super::scheduler::Time;

/// Top-level simulation error
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The program is malformed or references something that does not exist
    #[error("Program error: {0}")]
    Program(#[from] ProgramError),

    /// An event was scheduled with an invalid delay
    #[error("Scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),

    /// JSON encoding error (journal fingerprints, reports)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Non-recoverable authoring mistakes in a program
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgramError {
    /// Symbol lookup exhausted every enclosing scope
    #[error("undefined symbol '{0}'")]
    UndefinedSymbol(String),

    /// A call targeted a binding that cannot receive requests
    #[error("'{0}' is not a service")]
    NotAService(String),

    /// The target service has no operation with this name
    #[error("service '{service}' has no operation '{operation}'")]
    UndefinedOperation {
        /// Service that received the request
        service: String,
        /// Operation that was requested
        operation: String,
    },

    /// An operation was defined outside of a service body
    #[error("operation '{0}' must be defined inside a service")]
    NoEnclosingService(String),

    /// Retry needs at least one attempt
    #[error("retry limit must be at least 1, found {0}")]
    InvalidRetryLimit(u32),

    /// Client stubs need a strictly positive, finite period
    #[error("client period must be positive, found {0}")]
    InvalidPeriod(Time),
}

/// Invalid input handed to the scheduler
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulingError {
    /// Events cannot fire in the past
    #[error("cannot schedule an event {0} time units in the past")]
    NegativeDelay(Time),

    /// NaN or infinite delay
    #[error("delay must be finite, found {0}")]
    NonFiniteDelay(Time),
}

/// Result type using SimulationError
pub type Result<T> = std::result::Result<T, SimulationError>;
