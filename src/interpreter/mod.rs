//! Interpreter for the service-architecture DSL.
//!
//! Programs describe services, their operations, and the clients that load
//! them. The evaluator walks the AST in continuation-passing style so that
//! calls which take simulated time suspend without blocking a thread.

/// Abstract syntax tree consumed by the evaluator.
pub mod ast;
/// Chained symbol tables.
pub mod environment;
/// Continuation-passing evaluator.
pub mod evaluator;
/// Runtime values and evaluation outcomes.
pub mod value;

pub use ast::{Delay, DelayKind, Expr};
pub use environment::Environment;
pub use evaluator::{Frame, evaluate};
pub use value::{Continuation, Outcome, Value};
