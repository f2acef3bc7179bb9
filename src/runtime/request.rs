//! Requests: one in-flight call and its PENDING → SUCCESS | ERROR lifecycle
//!
//! A request settles exactly once. Whichever of the serving operation's reply
//! or the caller's timeout arrives first wins; later replies are journaled as
//! stale and otherwise ignored. Queued events are never removed, the status
//! guard is what makes them harmless.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::Result;
use super::journal::JournalEntry;
use super::scheduler::{Scheduler, Time};
use super::service::ServiceLike;

/// Sequential request identifier, unique within one simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// The actor that issued a request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Caller {
    /// The host driving the simulation
    Host,
    /// A client stub firing
    Client(String),
    /// An operation body serving another request
    Operation {
        /// Service owning the operation
        service: String,
        /// Operation name
        operation: String,
    },
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::Host => f.write_str("host"),
            Caller::Client(name) => write!(f, "client:{}", name),
            Caller::Operation { service, operation } => write!(f, "{}.{}", service, operation),
        }
    }
}

/// Request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not yet settled
    Pending,
    /// Settled successfully (terminal)
    Success,
    /// Settled with a failure (terminal)
    Error,
}

/// Why a request or evaluation ended in ERROR
///
/// These are simulation outcomes, not Rust errors: they travel down the error
/// continuation and can be absorbed by `IgnoreError` or `Retry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Failure {
    /// The serving operation replied with an error
    Rejected,
    /// The caller's deadline passed before the reply
    TimedOut {
        /// Absolute deadline that expired
        deadline: Time,
    },
    /// Produced by a `Fail` node
    Injected,
    /// A retry used up every attempt
    Exhausted {
        /// Attempts issued
        attempts: u32,
    },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Rejected => f.write_str("rejected"),
            Failure::TimedOut { deadline } => write!(f, "timed out at {}", deadline),
            Failure::Injected => f.write_str("injected failure"),
            Failure::Exhausted { attempts } => write!(f, "gave up after {} attempts", attempts),
        }
    }
}

/// Hook run when a request settles in SUCCESS
pub type SuccessHook = Box<dyn FnOnce(&mut Scheduler) -> Result<()>>;

/// Hook run when a request settles in ERROR
pub type ErrorHook = Box<dyn FnOnce(&mut Scheduler, Failure) -> Result<()>>;

/// One call from a caller to a named operation
pub struct Request {
    id: RequestId,
    caller: Caller,
    operation: String,
    created_at: Time,
    status: Cell<Status>,
    failure: RefCell<Option<Failure>>,
    deadline: Cell<Option<Time>>,
    settled_at: Cell<Option<Time>>,
    on_success: RefCell<Option<SuccessHook>>,
    on_error: RefCell<Option<ErrorHook>>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("caller", &self.caller)
            .field("operation", &self.operation)
            .field("created_at", &self.created_at)
            .field("status", &self.status.get())
            .field("deadline", &self.deadline.get())
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Create a pending request with no continuations attached
    pub fn new(
        id: RequestId,
        caller: Caller,
        operation: impl Into<String>,
        created_at: Time,
    ) -> Self {
        Self {
            id,
            caller,
            operation: operation.into(),
            created_at,
            status: Cell::new(Status::Pending),
            failure: RefCell::new(None),
            deadline: Cell::new(None),
            settled_at: Cell::new(None),
            on_success: RefCell::new(None),
            on_error: RefCell::new(None),
        }
    }

    /// Attach the success continuation
    pub fn with_on_success<F>(self, hook: F) -> Self
    where
        F: FnOnce(&mut Scheduler) -> Result<()> + 'static,
    {
        *self.on_success.borrow_mut() = Some(Box::new(hook));
        self
    }

    /// Attach the error continuation
    pub fn with_on_error<F>(self, hook: F) -> Self
    where
        F: FnOnce(&mut Scheduler, Failure) -> Result<()> + 'static,
    {
        *self.on_error.borrow_mut() = Some(Box::new(hook));
        self
    }

    /// Request identifier
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Issuing actor
    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    /// Target operation name
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Simulated creation time
    pub fn created_at(&self) -> Time {
        self.created_at
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Whether the request is still awaiting a reply
    pub fn is_pending(&self) -> bool {
        self.status.get() == Status::Pending
    }

    /// Failure reason once settled in ERROR
    pub fn failure(&self) -> Option<Failure> {
        self.failure.borrow().clone()
    }

    /// Absolute deadline, if the caller set a timeout
    pub fn deadline(&self) -> Option<Time> {
        self.deadline.get()
    }

    /// Record the absolute deadline
    pub fn set_deadline(&self, deadline: Time) {
        self.deadline.set(Some(deadline));
    }

    /// Simulated time at which the request settled
    pub fn settled_at(&self) -> Option<Time> {
        self.settled_at.get()
    }

    /// Hand this request to a service.
    ///
    /// Delivery goes through the service's own `schedule` capability with zero
    /// delay, so the service never runs inside the caller's evaluation step.
    pub fn send_to(self: &Rc<Self>, scheduler: &mut Scheduler, service: Rc<dyn ServiceLike>) {
        let now = scheduler.now();
        debug!(request = %self.id, caller = %self.caller, service = service.name(), operation = %self.operation, "request issued");
        scheduler.journal_mut().record(JournalEntry::Issued {
            time: now,
            request: self.id,
            caller: self.caller.clone(),
            service: service.name().to_string(),
            operation: self.operation.clone(),
        });

        let request = Rc::clone(self);
        let target = Rc::clone(&service);
        service.schedule(
            scheduler,
            0.0,
            Box::new(move |s: &mut Scheduler| target.process(s, request)),
        );
    }

    /// Settle in SUCCESS and resume the caller. No-op once settled.
    pub fn reply_success(&self, scheduler: &mut Scheduler) -> Result<()> {
        if !self.settle(scheduler, Status::Success, None) {
            return Ok(());
        }

        self.on_error.borrow_mut().take();
        let hook = self.on_success.borrow_mut().take();
        match hook {
            Some(hook) => hook(scheduler),
            None => Ok(()),
        }
    }

    /// Settle in ERROR and resume the caller's error path. No-op once settled.
    pub fn reply_error(&self, scheduler: &mut Scheduler, failure: Failure) -> Result<()> {
        if !self.settle(scheduler, Status::Error, Some(failure.clone())) {
            return Ok(());
        }

        self.on_success.borrow_mut().take();
        let hook = self.on_error.borrow_mut().take();
        match hook {
            Some(hook) => hook(scheduler, failure),
            None => Ok(()),
        }
    }

    /// First writer wins; returns false for a stale reply
    fn settle(&self, scheduler: &mut Scheduler, status: Status, failure: Option<Failure>) -> bool {
        let now = scheduler.now();
        if !self.is_pending() {
            debug!(request = %self.id, current = ?self.status.get(), attempted = ?status, "stale reply ignored");
            scheduler.journal_mut().record(JournalEntry::StaleReply {
                time: now,
                request: self.id,
                attempted: status,
            });
            return false;
        }

        self.status.set(status);
        self.settled_at.set(Some(now));
        *self.failure.borrow_mut() = failure.clone();
        debug!(request = %self.id, ?status, time = now, "request settled");
        scheduler.journal_mut().record(JournalEntry::Settled {
            time: now,
            request: self.id,
            status,
            failure,
        });
        true
    }
}
