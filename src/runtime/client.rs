//! Client stubs: periodic load generators
//!
//! A stub fires every `period` time units, starting at `period`. Each firing
//! evaluates the stub body on its own; firings never wait for earlier ones.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::error::Result;
use super::request::{Caller, Failure};
use super::scheduler::{EventKind, Scheduler, Time};
use crate::interpreter::environment::Environment;
use crate::interpreter::evaluator::{Frame, evaluate};
use crate::interpreter::value::Outcome;
use crate::interpreter::Expr;

/// Hook run once per successful body evaluation
pub type SuccessObserver = Box<dyn FnMut(&mut Scheduler)>;

/// Hook run once per failed body evaluation
pub type ErrorObserver = Box<dyn FnMut(&mut Scheduler, &Failure)>;

/// Periodic client bound by a `DefineClientStub` node
pub struct ClientStub {
    name: String,
    period: Time,
    body: Expr,
    firings: Cell<u64>,
    successes: Cell<u64>,
    errors: Cell<u64>,
    on_success: RefCell<Option<SuccessObserver>>,
    on_error: RefCell<Option<ErrorObserver>>,
}

impl fmt::Debug for ClientStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientStub")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("firings", &self.firings.get())
            .field("successes", &self.successes.get())
            .field("errors", &self.errors.get())
            .finish_non_exhaustive()
    }
}

impl ClientStub {
    /// Create an idle stub; call [`ClientStub::start`] to begin firing
    pub fn new(name: impl Into<String>, period: Time, body: Expr) -> Self {
        Self {
            name: name.into(),
            period,
            body,
            firings: Cell::new(0),
            successes: Cell::new(0),
            errors: Cell::new(0),
            on_success: RefCell::new(None),
            on_error: RefCell::new(None),
        }
    }

    /// Stub name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Firing period
    pub fn period(&self) -> Time {
        self.period
    }

    /// Number of firings so far
    pub fn firings(&self) -> u64 {
        self.firings.get()
    }

    /// Number of body evaluations that resolved SUCCESS
    pub fn successes(&self) -> u64 {
        self.successes.get()
    }

    /// Number of body evaluations that resolved ERROR
    pub fn errors(&self) -> u64 {
        self.errors.get()
    }

    /// Replace the success hook
    pub fn set_on_success<F>(&self, hook: F)
    where
        F: FnMut(&mut Scheduler) + 'static,
    {
        *self.on_success.borrow_mut() = Some(Box::new(hook));
    }

    /// Replace the error hook
    pub fn set_on_error<F>(&self, hook: F)
    where
        F: FnMut(&mut Scheduler, &Failure) + 'static,
    {
        *self.on_error.borrow_mut() = Some(Box::new(hook));
    }

    /// Schedule the first firing one period from now
    pub fn start(self: &Rc<Self>, scheduler: &mut Scheduler, env: Rc<Environment>) -> Result<()> {
        self.schedule_next(scheduler, env)
    }

    fn schedule_next(self: &Rc<Self>, scheduler: &mut Scheduler, env: Rc<Environment>) -> Result<()> {
        let stub = Rc::clone(self);
        scheduler.try_schedule(
            self.period,
            EventKind::ClientFiring,
            Box::new(move |s: &mut Scheduler| stub.fire(s, env)),
        )?;
        Ok(())
    }

    fn fire(self: Rc<Self>, scheduler: &mut Scheduler, env: Rc<Environment>) -> Result<()> {
        self.firings.set(self.firings.get() + 1);
        debug!(client = %self.name, firing = self.firings.get(), time = scheduler.now(), "client firing");
        self.schedule_next(scheduler, Rc::clone(&env))?;

        let frame = Frame::new(env, Caller::Client(self.name.clone()));
        let stub = Rc::clone(&self);
        evaluate(
            scheduler,
            &self.body,
            &frame,
            Box::new(move |s: &mut Scheduler, outcome: Outcome| {
                stub.complete(s, outcome);
                Ok(())
            }),
        )
    }

    fn complete(&self, scheduler: &mut Scheduler, outcome: Outcome) {
        match outcome {
            Outcome::Success(_) => {
                self.successes.set(self.successes.get() + 1);
                let hook = self.on_success.borrow_mut().take();
                if let Some(mut hook) = hook {
                    hook(scheduler);
                    let mut slot = self.on_success.borrow_mut();
                    if slot.is_none() {
                        *slot = Some(hook);
                    }
                }
            }
            Outcome::Error(failure) => {
                self.errors.set(self.errors.get() + 1);
                debug!(client = %self.name, %failure, "client request failed");
                let hook = self.on_error.borrow_mut().take();
                if let Some(mut hook) = hook {
                    hook(scheduler, &failure);
                    let mut slot = self.on_error.borrow_mut();
                    if slot.is_none() {
                        *slot = Some(hook);
                    }
                }
            }
        }
    }
}
