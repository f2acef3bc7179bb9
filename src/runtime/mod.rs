//! Simulation driver and public API
//!
//! This module provides the `Simulation` struct that ties the scheduler, the
//! root environment and the interpreter together, and exposes the surface a
//! host uses to load a program and advance simulated time.

use std::rc::Rc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Submodules
pub mod client;
pub mod error;
pub mod journal;
pub mod request;
pub mod retry;
pub mod scheduler;
pub mod service;

use crate::interpreter::{Environment, Expr, Frame, Outcome, evaluate};
use error::Result;
use journal::RequestStats;
use scheduler::{Scheduler, Time};

/// Configuration for a simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Keep a full journal of events and request transitions
    pub journal: bool,

    /// Maximum events dispatched by a single `run_until` call
    pub max_events: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            journal: true,
            max_events: None,
        }
    }
}

impl SimulationConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("Failed to parse simulation config")
    }
}

/// Summary of a simulation at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Identifier of this simulation instance
    pub run_id: Uuid,
    /// Wall-clock creation time (metadata only)
    pub created_at: DateTime<Utc>,
    /// Current simulated time
    pub now: Time,
    /// Events dispatched so far
    pub events_dispatched: u64,
    /// Events still queued
    pub pending_events: usize,
    /// Request counters
    pub requests: RequestStats,
    /// Digest of the journal (empty journal when journaling is off)
    pub fingerprint: String,
}

impl SimulationReport {
    /// Encode the report as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A single simulation: one clock, one root scope
pub struct Simulation {
    config: SimulationConfig,
    scheduler: Scheduler,
    environment: Rc<Environment>,
    run_id: Uuid,
    created_at: DateTime<Utc>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl Simulation {
    /// Create an empty simulation at time zero
    pub fn new(config: SimulationConfig) -> Self {
        let scheduler = Scheduler::with_options(config.journal, config.max_events);
        Self {
            config,
            scheduler,
            environment: Environment::root(),
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Root scope of the program
    pub fn environment(&self) -> &Rc<Environment> {
        &self.environment
    }

    /// Get the scheduler
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Get mutable access to the scheduler
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Current simulated time
    pub fn now(&self) -> Time {
        self.scheduler.now()
    }

    /// Evaluate a top-level node, resuming `continuation` with its outcome
    pub fn evaluate<F>(&mut self, expr: &Expr, continuation: F) -> Result<()>
    where
        F: FnOnce(&mut Scheduler, Outcome) -> Result<()> + 'static,
    {
        let frame = Frame::top_level(Rc::clone(&self.environment));
        evaluate(&mut self.scheduler, expr, &frame, Box::new(continuation))
    }

    /// Evaluate a top-level node and discard its outcome
    pub fn evaluate_top_level(&mut self, expr: &Expr) -> Result<()> {
        self.evaluate(expr, |_, _| Ok(()))
    }

    /// Schedule a host callback `delay` time units from now
    pub fn schedule<F>(&mut self, delay: Time, callback: F) -> scheduler::EventId
    where
        F: FnOnce(&mut Scheduler) -> Result<()> + 'static,
    {
        self.scheduler.schedule(delay, callback)
    }

    /// Advance simulated time to `end_time`, dispatching due events
    pub fn run_until(&mut self, end_time: Time) -> Result<u64> {
        self.scheduler.run_until(end_time)
    }

    /// Snapshot of the simulation's progress
    pub fn report(&self) -> Result<SimulationReport> {
        let journal = self.scheduler.journal();
        Ok(SimulationReport {
            run_id: self.run_id,
            created_at: self.created_at,
            now: self.scheduler.now(),
            events_dispatched: self.scheduler.dispatched(),
            pending_events: self.scheduler.pending(),
            requests: journal.stats(),
            fingerprint: journal.fingerprint()?,
        })
    }
}

// Re-export commonly used types
pub use client::ClientStub;
pub use error::{ProgramError, SchedulingError, SimulationError};
pub use request::{Caller, Failure, Request, RequestId, Status};
pub use retry::{ConstantDelay, DelayPolicy, ExponentialBackoff};
pub use service::{Operation, Service, ServiceLike};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config = SimulationConfig::from_json(r#"{ "max_events": 100 }"#).unwrap();
        assert!(config.journal);
        assert_eq!(config.max_events, Some(100));
    }

    #[test]
    fn test_config_rejects_garbage() {
        let err = SimulationConfig::from_json("not json").unwrap_err();
        assert!(err.to_string().contains("simulation config"));
    }

    #[test]
    fn test_report_serializes() {
        let mut sim = Simulation::default();
        sim.run_until(3.0).unwrap();

        let report = sim.report().unwrap();
        assert_eq!(report.now, 3.0);
        assert_eq!(report.events_dispatched, 0);

        let json = report.to_json().unwrap();
        let back: SimulationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
