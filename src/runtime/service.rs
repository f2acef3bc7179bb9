//! Services and operations
//!
//! Anything that can receive requests implements [`ServiceLike`]. Services
//! defined in the DSL are [`Service`] values owning a set of [`Operation`]s;
//! hosts and tests can bind their own implementations (instrumented doubles,
//! hand-written models) next to them.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::error::{ProgramError, Result};
use super::request::{Caller, Request};
use super::scheduler::{Callback, EventKind, Scheduler, Time};
use crate::interpreter::environment::Environment;
use crate::interpreter::evaluator::{Frame, evaluate};
use crate::interpreter::value::{Continuation, Outcome};
use crate::interpreter::Expr;

/// Capability shared by every request target
pub trait ServiceLike {
    /// Name used in journals and diagnostics
    fn name(&self) -> &str;

    /// Handle a delivered request. The implementation owns replying to it,
    /// now or later; a request that is never replied to stays pending.
    fn process(&self, scheduler: &mut Scheduler, request: Rc<Request>) -> Result<()>;

    /// Schedule work on behalf of this service
    fn schedule(&self, scheduler: &mut Scheduler, delay: Time, callback: Callback) {
        scheduler.schedule_boxed(delay, EventKind::Delivery, callback);
    }
}

/// A named collection of operations defined by a `DefineService` node
pub struct Service {
    name: String,
    scope: Rc<Environment>,
    operations: RefCell<BTreeMap<String, Rc<Operation>>>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("operations", &self.operation_names())
            .finish()
    }
}

impl Service {
    /// Create an empty service whose operations evaluate under `scope`
    pub fn new(name: impl Into<String>, scope: Rc<Environment>) -> Self {
        Self {
            name: name.into(),
            scope,
            operations: RefCell::new(BTreeMap::new()),
        }
    }

    /// Lexical scope of the service body
    pub fn scope(&self) -> &Rc<Environment> {
        &self.scope
    }

    /// Register an operation, returning the one it replaces
    pub fn register(&self, operation: Rc<Operation>) -> Option<Rc<Operation>> {
        self.operations
            .borrow_mut()
            .insert(operation.name().to_string(), operation)
    }

    /// Look up an operation by name
    pub fn operation(&self, name: &str) -> Option<Rc<Operation>> {
        self.operations.borrow().get(name).cloned()
    }

    /// Names of every registered operation, sorted
    pub fn operation_names(&self) -> Vec<String> {
        self.operations.borrow().keys().cloned().collect()
    }
}

impl ServiceLike for Service {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, scheduler: &mut Scheduler, request: Rc<Request>) -> Result<()> {
        let operation = self.operation(request.operation()).ok_or_else(|| {
            ProgramError::UndefinedOperation {
                service: self.name.clone(),
                operation: request.operation().to_string(),
            }
        })?;
        operation.process(scheduler, request, &self.scope)
    }
}

/// A named operation body owned by one service
#[derive(Debug)]
pub struct Operation {
    name: String,
    service: String,
    body: Expr,
}

impl Operation {
    /// Wrap an operation body
    pub fn new(name: impl Into<String>, service: impl Into<String>, body: Expr) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
            body,
        }
    }

    /// Operation name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning service name
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Operation body
    pub fn body(&self) -> &Expr {
        &self.body
    }

    /// Serve `request`: run the body and reply with its outcome
    pub fn process(
        &self,
        scheduler: &mut Scheduler,
        request: Rc<Request>,
        scope: &Rc<Environment>,
    ) -> Result<()> {
        debug!(service = %self.service, operation = %self.name, request = %request.id(), "operation started");
        self.execute(
            scheduler,
            scope,
            Box::new(move |s: &mut Scheduler, outcome: Outcome| match outcome {
                Outcome::Success(_) => request.reply_success(s),
                Outcome::Error(failure) => request.reply_error(s, failure),
            }),
        )
    }

    /// Evaluate the body in a fresh child of `scope`, resuming `continuation`
    pub fn execute(
        &self,
        scheduler: &mut Scheduler,
        scope: &Rc<Environment>,
        continuation: Continuation,
    ) -> Result<()> {
        let frame = Frame::new(
            Environment::child(scope),
            Caller::Operation {
                service: self.service.clone(),
                operation: self.name.clone(),
            },
        );
        evaluate(scheduler, &self.body, &frame, continuation)
    }
}
