//! Continuation-passing evaluator
//!
//! Every node is evaluated against a [`Frame`] and hands its [`Outcome`] to an
//! explicit continuation instead of returning it. Nodes that take simulated
//! time (`Query`, `Think`, the wait between `Retry` attempts) park their
//! continuation on a request or a scheduled event and return immediately;
//! all other nodes resume synchronously.
//!
//! The `Result` returned by [`evaluate`] only carries program and scheduling
//! errors. Simulated failures always travel through the continuation.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::runtime::client::ClientStub;
use crate::runtime::error::{ProgramError, Result};
use crate::runtime::request::{Caller, ErrorHook, Failure, Request, SuccessHook};
use crate::runtime::retry::RetryState;
use crate::runtime::scheduler::{EventKind, Scheduler, Time, validate_delay};
use crate::runtime::service::{Operation, Service, ServiceLike};

use super::ast::{Delay, Expr};
use super::environment::Environment;
use super::value::{Continuation, Outcome, Value};

/// Evaluation context for one node
#[derive(Debug, Clone)]
pub struct Frame {
    /// Scope used for symbol resolution and definitions
    pub env: Rc<Environment>,
    /// Service whose body is being evaluated, if any
    pub service: Option<Rc<Service>>,
    /// Actor recorded as the caller of requests issued here
    pub caller: Caller,
}

impl Frame {
    /// Frame outside of any service body
    pub fn new(env: Rc<Environment>, caller: Caller) -> Self {
        Self {
            env,
            service: None,
            caller,
        }
    }

    /// Frame for top-level host evaluation
    pub fn top_level(env: Rc<Environment>) -> Self {
        Self::new(env, Caller::Host)
    }

    fn within_service(&self, service: Rc<Service>) -> Self {
        Self {
            env: Rc::clone(service.scope()),
            service: Some(service),
            caller: self.caller.clone(),
        }
    }
}

/// Evaluate `expr` in `frame`, resuming `k` with its outcome
pub fn evaluate(scheduler: &mut Scheduler, expr: &Expr, frame: &Frame, k: Continuation) -> Result<()> {
    match expr {
        Expr::DefineService { name, operations } => {
            define_service(scheduler, name, operations, frame, k)
        }
        Expr::DefineOperation { name, body } => define_operation(scheduler, name, body, frame, k),
        Expr::DefineClientStub { name, period, body } => {
            define_client_stub(scheduler, name, *period, body, frame, k)
        }
        Expr::Trigger { target, operation } => trigger(scheduler, target, operation, frame, k),
        Expr::Query {
            target,
            operation,
            timeout,
        } => query(scheduler, target, operation, *timeout, frame, k),
        Expr::Sequence { steps } => {
            evaluate_steps(scheduler, Rc::from(steps.as_slice()), 0, frame.clone(), Value::Unit, k)
        }
        Expr::Think { duration } => {
            scheduler.try_schedule(
                *duration,
                EventKind::Think,
                Box::new(move |s: &mut Scheduler| k(s, Outcome::Success(Value::Unit))),
            )?;
            Ok(())
        }
        Expr::Retry { body, limit, delay } => retry(scheduler, body, *limit, delay, frame, k),
        Expr::IgnoreError { body } => evaluate(
            scheduler,
            body,
            frame,
            Box::new(move |s: &mut Scheduler, outcome: Outcome| match outcome {
                Outcome::Success(value) => k(s, Outcome::Success(value)),
                Outcome::Error(failure) => {
                    debug!(%failure, "error ignored");
                    k(s, Outcome::Success(Value::Unit))
                }
            }),
        ),
        Expr::Fail => k(scheduler, Outcome::Error(Failure::Injected)),
    }
}

fn define_service(
    scheduler: &mut Scheduler,
    name: &str,
    operations: &[Expr],
    frame: &Frame,
    k: Continuation,
) -> Result<()> {
    let service = Rc::new(Service::new(name, Environment::child(&frame.env)));
    let value = frame.env.define(name, Value::Service(Rc::clone(&service)));
    debug!(service = name, "service defined");

    let inner = frame.within_service(service);
    evaluate_steps(
        scheduler,
        Rc::from(operations),
        0,
        inner,
        Value::Unit,
        Box::new(move |s: &mut Scheduler, outcome: Outcome| match outcome {
            Outcome::Success(_) => k(s, Outcome::Success(value)),
            error => k(s, error),
        }),
    )
}

fn define_operation(
    scheduler: &mut Scheduler,
    name: &str,
    body: &Expr,
    frame: &Frame,
    k: Continuation,
) -> Result<()> {
    let service = frame
        .service
        .as_ref()
        .ok_or_else(|| ProgramError::NoEnclosingService(name.to_string()))?;

    let operation = Rc::new(Operation::new(name, service.name(), body.clone()));
    if service.register(Rc::clone(&operation)).is_some() {
        debug!(service = service.name(), operation = name, "operation redefined");
    }
    k(scheduler, Outcome::Success(Value::Operation(operation)))
}

fn define_client_stub(
    scheduler: &mut Scheduler,
    name: &str,
    period: Time,
    body: &Expr,
    frame: &Frame,
    k: Continuation,
) -> Result<()> {
    if !period.is_finite() || period <= 0.0 {
        return Err(ProgramError::InvalidPeriod(period).into());
    }

    let client = Rc::new(ClientStub::new(name, period, body.clone()));
    let value = frame.env.define(name, Value::Client(Rc::clone(&client)));
    client.start(scheduler, Rc::clone(&frame.env))?;
    debug!(client = name, period, "client stub defined");
    k(scheduler, Outcome::Success(value))
}

fn resolve_target(frame: &Frame, target: &str) -> Result<Rc<dyn ServiceLike>> {
    let value = frame.env.look_up(target)?;
    value
        .as_service_like()
        .ok_or_else(|| ProgramError::NotAService(target.to_string()).into())
}

fn trigger(
    scheduler: &mut Scheduler,
    target: &str,
    operation: &str,
    frame: &Frame,
    k: Continuation,
) -> Result<()> {
    let service = resolve_target(frame, target)?;
    let request = Rc::new(Request::new(
        scheduler.allocate_request_id(),
        frame.caller.clone(),
        operation,
        scheduler.now(),
    ));
    request.send_to(scheduler, service);
    k(scheduler, Outcome::Success(Value::Unit))
}

fn query(
    scheduler: &mut Scheduler,
    target: &str,
    operation: &str,
    timeout: Option<Time>,
    frame: &Frame,
    k: Continuation,
) -> Result<()> {
    let service = resolve_target(frame, target)?;
    if let Some(timeout) = timeout {
        validate_delay(timeout)?;
    }
    let (on_success, on_error) = split_continuation(k);
    let request = Rc::new(
        Request::new(
            scheduler.allocate_request_id(),
            frame.caller.clone(),
            operation,
            scheduler.now(),
        )
        .with_on_success(on_success)
        .with_on_error(on_error),
    );
    request.send_to(scheduler, service);

    if let Some(timeout) = timeout {
        let deadline = scheduler.now() + timeout;
        request.set_deadline(deadline);
        let watched = Rc::clone(&request);
        scheduler.try_schedule(
            timeout,
            EventKind::Timeout,
            Box::new(move |s: &mut Scheduler| {
                if !watched.is_pending() {
                    return Ok(());
                }
                debug!(request = %watched.id(), deadline, "request timed out");
                watched.reply_error(s, Failure::TimedOut { deadline })
            }),
        )?;
    }
    Ok(())
}

/// Share one continuation between a request's success and error hooks
fn split_continuation(k: Continuation) -> (SuccessHook, ErrorHook) {
    let slot = Rc::new(RefCell::new(Some(k)));
    let error_slot = Rc::clone(&slot);

    let on_success: SuccessHook = Box::new(move |s: &mut Scheduler| {
        let k = slot.borrow_mut().take();
        match k {
            Some(k) => k(s, Outcome::Success(Value::Unit)),
            None => Ok(()),
        }
    });
    let on_error: ErrorHook = Box::new(move |s: &mut Scheduler, failure: Failure| {
        let k = error_slot.borrow_mut().take();
        match k {
            Some(k) => k(s, Outcome::Error(failure)),
            None => Ok(()),
        }
    });
    (on_success, on_error)
}

/// Hand-off between a sequence step and the loop that started it
enum StepState {
    /// `evaluate` for the step has not returned yet
    Running,
    /// The step resolved before `evaluate` returned
    Done(Outcome, Continuation),
    /// `evaluate` returned with the step still suspended
    Detached,
}

/// Run `steps[index..]` in order, stopping at the first ERROR.
///
/// Steps that resolve synchronously hand their outcome back to this loop
/// instead of starting the next step from inside their own continuation, so
/// the stack depth does not grow with the length of the sequence.
fn evaluate_steps(
    scheduler: &mut Scheduler,
    steps: Rc<[Expr]>,
    mut index: usize,
    frame: Frame,
    mut last: Value,
    mut k: Continuation,
) -> Result<()> {
    loop {
        let Some(step) = steps.get(index) else {
            return k(scheduler, Outcome::Success(last));
        };

        let state = Rc::new(RefCell::new(StepState::Running));
        let handoff = Rc::clone(&state);
        let rest = Rc::clone(&steps);
        let next_frame = frame.clone();
        evaluate(
            scheduler,
            step,
            &frame,
            Box::new(move |s: &mut Scheduler, outcome: Outcome| {
                let mut current = handoff.borrow_mut();
                if matches!(*current, StepState::Running) {
                    *current = StepState::Done(outcome, k);
                    return Ok(());
                }
                drop(current);
                match outcome {
                    Outcome::Success(value) => {
                        evaluate_steps(s, rest, index + 1, next_frame, value, k)
                    }
                    error => k(s, error),
                }
            }),
        )?;

        let resolved = state.replace(StepState::Detached);
        match resolved {
            StepState::Done(Outcome::Success(value), next) => {
                index += 1;
                last = value;
                k = next;
            }
            StepState::Done(error, next) => return next(scheduler, error),
            StepState::Running | StepState::Detached => return Ok(()),
        }
    }
}

fn retry(
    scheduler: &mut Scheduler,
    body: &Expr,
    limit: u32,
    delay: &Delay,
    frame: &Frame,
    k: Continuation,
) -> Result<()> {
    validate_delay(delay.value)?;
    let state = RetryState::new(limit, delay.policy())?;
    attempt(
        scheduler,
        Rc::new(body.clone()),
        frame.clone(),
        Rc::new(RefCell::new(state)),
        k,
    )
}

fn attempt(
    scheduler: &mut Scheduler,
    body: Rc<Expr>,
    frame: Frame,
    state: Rc<RefCell<RetryState>>,
    k: Continuation,
) -> Result<()> {
    let number = state.borrow_mut().begin_attempt();
    debug!(attempt = number, time = scheduler.now(), "retry attempt");

    let next_body = Rc::clone(&body);
    let next_frame = frame.clone();
    evaluate(
        scheduler,
        &body,
        &frame,
        Box::new(move |s: &mut Scheduler, outcome: Outcome| {
            let failure = match outcome {
                Outcome::Success(value) => return k(s, Outcome::Success(value)),
                Outcome::Error(failure) => failure,
            };

            let (exhausted, attempts, wait) = {
                let state = state.borrow();
                (state.exhausted(), state.attempts(), state.next_delay())
            };
            if exhausted {
                debug!(attempts, last = %failure, "retry gave up");
                return k(s, Outcome::Error(Failure::Exhausted { attempts }));
            }

            s.try_schedule(
                wait,
                EventKind::Retry,
                Box::new(move |s: &mut Scheduler| attempt(s, next_body, next_frame, state, k)),
            )?;
            Ok(())
        }),
    )
}
