use serde::{Deserialize, Serialize};

use crate::runtime::retry::{ConstantDelay, DelayPolicy, ExponentialBackoff};
use crate::runtime::scheduler::Time;

/// Nodes of the service-architecture DSL.
///
/// The front-end that produces these from source text lives elsewhere; the
/// evaluator only consumes this closed set of node kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Expr {
    /// Define a service and register the operations in its body.
    DefineService {
        /// Binding name.
        name: String,
        /// Body nodes, usually `DefineOperation`s.
        operations: Vec<Expr>,
    },
    /// Define an operation on the enclosing service.
    DefineOperation {
        /// Operation name.
        name: String,
        /// Body evaluated for every delivered request.
        body: Box<Expr>,
    },
    /// Define a periodic load generator.
    DefineClientStub {
        /// Binding name.
        name: String,
        /// Firing period.
        period: Time,
        /// Body evaluated on every firing.
        body: Box<Expr>,
    },
    /// Fire-and-forget call.
    Trigger {
        /// Service binding.
        target: String,
        /// Operation name.
        operation: String,
    },
    /// Call whose caller waits for the outcome.
    Query {
        /// Service binding.
        target: String,
        /// Operation name.
        operation: String,
        /// Relative deadline, if any.
        timeout: Option<Time>,
    },
    /// Evaluate steps one after another, stopping at the first error.
    Sequence {
        /// Steps in order.
        steps: Vec<Expr>,
    },
    /// Let simulated time pass.
    Think {
        /// Time units to wait.
        duration: Time,
    },
    /// Re-evaluate a body until it succeeds or the limit is reached.
    Retry {
        /// Body to attempt.
        body: Box<Expr>,
        /// Maximum number of attempts.
        limit: u32,
        /// Wait between attempts.
        delay: Delay,
    },
    /// Treat an ERROR outcome of the body as SUCCESS.
    IgnoreError {
        /// Guarded body.
        body: Box<Expr>,
    },
    /// Resolve to ERROR immediately.
    Fail,
}

impl Expr {
    /// `DefineService(name, *ops)`
    pub fn define_service(name: impl Into<String>, operations: Vec<Expr>) -> Self {
        Expr::DefineService {
            name: name.into(),
            operations,
        }
    }

    /// `DefineOperation(name, body)`
    pub fn define_operation(name: impl Into<String>, body: Expr) -> Self {
        Expr::DefineOperation {
            name: name.into(),
            body: Box::new(body),
        }
    }

    /// `DefineClientStub(name, period, body)`
    pub fn client_stub(name: impl Into<String>, period: Time, body: Expr) -> Self {
        Expr::DefineClientStub {
            name: name.into(),
            period,
            body: Box::new(body),
        }
    }

    /// `Trigger(target, op)`
    pub fn trigger(target: impl Into<String>, operation: impl Into<String>) -> Self {
        Expr::Trigger {
            target: target.into(),
            operation: operation.into(),
        }
    }

    /// `Query(target, op)` without a deadline
    pub fn query(target: impl Into<String>, operation: impl Into<String>) -> Self {
        Expr::Query {
            target: target.into(),
            operation: operation.into(),
            timeout: None,
        }
    }

    /// `Query(target, op, timeout)`
    pub fn query_with_timeout(
        target: impl Into<String>,
        operation: impl Into<String>,
        timeout: Time,
    ) -> Self {
        Expr::Query {
            target: target.into(),
            operation: operation.into(),
            timeout: Some(timeout),
        }
    }

    /// `Sequence(*steps)`
    pub fn sequence(steps: Vec<Expr>) -> Self {
        Expr::Sequence { steps }
    }

    /// `Think(duration)`
    pub fn think(duration: Time) -> Self {
        Expr::Think { duration }
    }

    /// `Retry(body, limit, delay)`
    pub fn retry(body: Expr, limit: u32, delay: Delay) -> Self {
        Expr::Retry {
            body: Box::new(body),
            limit,
            delay,
        }
    }

    /// `IgnoreError(body)`
    pub fn ignore_error(body: Expr) -> Self {
        Expr::IgnoreError {
            body: Box::new(body),
        }
    }

    /// `Fail()`
    pub fn fail() -> Self {
        Expr::Fail
    }
}

/// `Delay(value, kind)`: how long a retry waits between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Delay {
    /// Base wait in time units.
    pub value: Time,
    /// Shape of the wait across attempts.
    #[serde(flatten)]
    pub kind: DelayKind,
}

/// Supported delay shapes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelayKind {
    /// Always wait `value`.
    Constant,
    /// Wait `value * factor^(attempt - 1)`, capped at `max` when set.
    Exponential {
        /// Growth factor per attempt.
        factor: f64,
        /// Cap on a single wait.
        max: Option<Time>,
    },
}

impl Delay {
    /// Constant wait.
    pub fn constant(value: Time) -> Self {
        Self {
            value,
            kind: DelayKind::Constant,
        }
    }

    /// Uncapped exponential backoff starting at `initial`.
    pub fn exponential(initial: Time, factor: f64) -> Self {
        Self {
            value: initial,
            kind: DelayKind::Exponential { factor, max: None },
        }
    }

    /// Cap every wait at `max` (exponential delays only).
    pub fn capped(mut self, limit: Time) -> Self {
        if let DelayKind::Exponential { max, .. } = &mut self.kind {
            *max = Some(limit);
        }
        self
    }

    /// Build the runtime policy for this delay.
    pub fn policy(&self) -> Box<dyn DelayPolicy> {
        match self.kind {
            DelayKind::Constant => Box::new(ConstantDelay { value: self.value }),
            DelayKind::Exponential { factor, max } => Box::new(ExponentialBackoff {
                initial: self.value,
                factor,
                max,
            }),
        }
    }
}
