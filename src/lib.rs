//! Servsim – a deterministic discrete-event simulator for service architectures
//!
//! This crate implements:
//! - A virtual clock with a time-ordered, FIFO tie-broken event queue
//! - A continuation-passing interpreter for a small call DSL (trigger, query,
//!   sequence, think, retry, ignore-error, fail)
//! - Requests with timeout and first-writer-wins settlement semantics
//! - Periodic client stubs that generate load against services
//! - A journal whose fingerprint makes replays comparable

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// DSL abstract syntax tree and evaluator
pub mod interpreter;
/// Scheduler, requests, services and the simulation driver
pub mod runtime;

// Re-export key types for convenience
pub use interpreter::{Delay, Environment, Expr, Outcome, Value};
pub use runtime::{Simulation, SimulationConfig};

/// Current version of the simulator
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
