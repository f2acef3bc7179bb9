//! Integration tests for periodic client stubs

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use common::{Behavior, bind, init_tracing};
use servsim::runtime::request::Failure;
use servsim::runtime::{ProgramError, SimulationError};
use servsim::{Expr, Simulation};

fn define_backend(sim: &mut Simulation) {
    sim.evaluate_top_level(&Expr::define_service(
        "backend",
        vec![Expr::define_operation("work", Expr::think(2.0))],
    ))
    .unwrap();
}

#[test]
fn test_client_stub_definition() {
    init_tracing();
    let mut sim = Simulation::default();
    define_backend(&mut sim);

    sim.evaluate_top_level(&Expr::client_stub("load", 5.0, Expr::query("backend", "work")))
        .unwrap();

    let client = sim
        .environment()
        .look_up("load")
        .unwrap()
        .as_client()
        .cloned()
        .expect("client stub bound");
    let completions = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&completions);
    client.set_on_success(move |s| sink.borrow_mut().push(s.now()));

    sim.run_until(24.0).unwrap();

    assert_eq!(*completions.borrow(), vec![7.0, 12.0, 17.0, 22.0]);
    assert_eq!(client.firings(), 4);
    assert_eq!(client.successes(), 4);
    assert_eq!(client.errors(), 0);
    // The firing at t=25 is queued but beyond the horizon
    assert_eq!(sim.scheduler().next_fire_time(), Some(25.0));
}

#[test]
fn test_first_firing_is_one_period_in() {
    let mut sim = Simulation::default();
    let target = bind(&sim, "S", Behavior::Succeed);

    sim.evaluate_top_level(&Expr::client_stub("tick", 5.0, Expr::trigger("S", "op")))
        .unwrap();
    sim.run_until(4.0).unwrap();
    assert_eq!(target.calls(), 0);

    sim.run_until(15.0).unwrap();
    assert_eq!(target.call_times(), vec![5.0, 10.0, 15.0]);
}

#[test]
fn test_firings_do_not_wait_for_each_other() {
    let mut sim = Simulation::default();
    let slow = bind(&sim, "slow", Behavior::SucceedAfter(12.0));

    sim.evaluate_top_level(&Expr::client_stub("load", 5.0, Expr::query("slow", "op")))
        .unwrap();
    sim.run_until(20.0).unwrap();

    let client = sim
        .environment()
        .look_up("load")
        .unwrap()
        .as_client()
        .cloned()
        .unwrap();
    assert_eq!(slow.call_times(), vec![5.0, 10.0, 15.0, 20.0]);
    // Only the firing at t=5 has had its reply (t=17)
    assert_eq!(client.successes(), 1);
}

#[test]
fn test_error_hook_sees_failures() {
    let mut sim = Simulation::default();
    bind(&sim, "silent", Behavior::Silent);

    sim.evaluate_top_level(&Expr::client_stub(
        "load",
        4.0,
        Expr::query_with_timeout("silent", "op", 1.0),
    ))
    .unwrap();

    let client = sim
        .environment()
        .look_up("load")
        .unwrap()
        .as_client()
        .cloned()
        .unwrap();
    let timeouts = Rc::new(Cell::new(0));
    let counter = Rc::clone(&timeouts);
    client.set_on_error(move |_, failure| {
        if matches!(failure, Failure::TimedOut { .. }) {
            counter.set(counter.get() + 1);
        }
    });

    sim.run_until(12.0).unwrap();

    assert_eq!(client.firings(), 3);
    assert_eq!(client.errors(), 2);
    assert_eq!(timeouts.get(), 2);
}

#[test]
fn test_invalid_period_is_rejected() {
    let mut sim = Simulation::default();
    let err = sim
        .evaluate_top_level(&Expr::client_stub("load", 0.0, Expr::fail()))
        .unwrap_err();

    assert!(matches!(
        err,
        SimulationError::Program(ProgramError::InvalidPeriod(_))
    ));
}
