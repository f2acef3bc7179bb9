//! Shared helpers for integration tests: tracing setup and instrumented
//! services.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Once;

use servsim::runtime::error::Result;
use servsim::runtime::request::{Failure, Request, Status};
use servsim::runtime::scheduler::{EventKind, Scheduler, Time};
use servsim::runtime::service::ServiceLike;
use servsim::{Outcome, Simulation, Value};

static TRACING: Once = Once::new();

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// How an instrumented service answers
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Reply SUCCESS immediately
    Succeed,
    /// Reply ERROR immediately
    Fail,
    /// Never reply
    Silent,
    /// Reply ERROR until the n-th call (1-based), SUCCESS from then on
    SucceedOnCall(usize),
    /// Reply SUCCESS after the given delay
    SucceedAfter(Time),
}

/// Service double that counts calls and answers per its behavior
pub struct CountingService {
    name: String,
    behavior: Behavior,
    calls: Cell<usize>,
    call_times: RefCell<Vec<Time>>,
}

impl CountingService {
    pub fn new(name: &str, behavior: Behavior) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            behavior,
            calls: Cell::new(0),
            call_times: RefCell::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn call_times(&self) -> Vec<Time> {
        self.call_times.borrow().clone()
    }
}

impl ServiceLike for CountingService {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, scheduler: &mut Scheduler, request: Rc<Request>) -> Result<()> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        self.call_times.borrow_mut().push(scheduler.now());

        match self.behavior {
            Behavior::Succeed => request.reply_success(scheduler),
            Behavior::Fail => request.reply_error(scheduler, Failure::Rejected),
            Behavior::Silent => Ok(()),
            Behavior::SucceedOnCall(n) if call >= n => request.reply_success(scheduler),
            Behavior::SucceedOnCall(_) => request.reply_error(scheduler, Failure::Rejected),
            Behavior::SucceedAfter(delay) => {
                scheduler.schedule_event(delay, EventKind::Reply, move |s| {
                    request.reply_success(s)
                });
                Ok(())
            }
        }
    }
}

/// Bind a counting service in the simulation's root scope
pub fn bind(sim: &Simulation, name: &str, behavior: Behavior) -> Rc<CountingService> {
    let service = CountingService::new(name, behavior);
    sim.environment()
        .define(name, Value::endpoint(Rc::clone(&service)));
    service
}

/// Outcomes observed by a top-level continuation, with their times
pub type Observed = Rc<RefCell<Vec<(Time, Status)>>>;

/// Continuation that records `(now, status)` into `observed`
pub fn observe(observed: &Observed) -> impl FnOnce(&mut Scheduler, Outcome) -> Result<()> + 'static {
    let observed = Rc::clone(observed);
    move |s: &mut Scheduler, outcome: Outcome| {
        observed.borrow_mut().push((s.now(), outcome.status()));
        Ok(())
    }
}
