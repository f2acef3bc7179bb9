//! Simulated clock and time-ordered event queue
//!
//! The scheduler owns "now" and a min-heap of pending callbacks. Events fire
//! in `fire_time` order; events sharing a fire time fire in the order they
//! were scheduled. Nothing ever sleeps in real time.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::error::{Result, SchedulingError};
use super::journal::{Journal, JournalEntry};
use super::request::RequestId;

/// Simulated time, in abstract time units
pub type Time = f64;

/// Boxed zero-argument event callback
///
/// Callbacks receive the scheduler so they can read the clock and schedule
/// follow-up work. An error aborts the surrounding `run_until`.
pub type Callback = Box<dyn FnOnce(&mut Scheduler) -> Result<()>>;

/// Identifier of a scheduled event (its insertion sequence number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

/// Reason an event was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Scheduled directly by the host
    External,
    /// Request arrival at a service
    Delivery,
    /// Query deadline
    Timeout,
    /// End of a think interval
    Think,
    /// Next retry attempt after a backoff
    Retry,
    /// Periodic client stub firing
    ClientFiring,
    /// Deferred reply from a service implementation
    Reply,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventKind::External => "external",
            EventKind::Delivery => "delivery",
            EventKind::Timeout => "timeout",
            EventKind::Think => "think",
            EventKind::Retry => "retry",
            EventKind::ClientFiring => "client-firing",
            EventKind::Reply => "reply",
        };
        f.write_str(label)
    }
}

/// Callback waiting in the queue
pub struct ScheduledEvent {
    /// Absolute simulated time at which the event fires
    pub fire_time: Time,
    /// Insertion sequence, breaks ties between equal fire times
    pub seq: u64,
    /// Scheduling cause (for observability)
    pub kind: EventKind,
    callback: Callback,
}

impl fmt::Debug for ScheduledEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledEvent")
            .field("fire_time", &self.fire_time)
            .field("seq", &self.seq)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest time, then lowest sequence first)
        other
            .fire_time
            .total_cmp(&self.fire_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Check that `delay` is one the scheduler would accept
pub fn validate_delay(delay: Time) -> std::result::Result<(), SchedulingError> {
    if !delay.is_finite() {
        return Err(SchedulingError::NonFiniteDelay(delay));
    }
    if delay < 0.0 {
        return Err(SchedulingError::NegativeDelay(delay));
    }
    Ok(())
}

/// Deterministic discrete-event scheduler
pub struct Scheduler {
    /// Current simulated time
    now: Time,

    /// Pending events (min-heap by fire time, then sequence)
    queue: BinaryHeap<ScheduledEvent>,

    /// Next insertion sequence number
    next_seq: u64,

    /// Next request identifier handed out to the interpreter
    next_request: u64,

    /// Total events dispatched across all runs
    dispatched: u64,

    /// Upper bound on events dispatched by one `run_until` call
    max_events: Option<u64>,

    /// Record of dispatched events and request transitions
    journal: Journal,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a scheduler at time zero with journaling enabled and no event budget
    pub fn new() -> Self {
        Self::with_options(true, None)
    }

    /// Create a scheduler with explicit journaling and event budget settings
    pub fn with_options(journal: bool, max_events: Option<u64>) -> Self {
        Self {
            now: 0.0,
            queue: BinaryHeap::new(),
            next_seq: 0,
            next_request: 0,
            dispatched: 0,
            max_events,
            journal: Journal::new(journal),
        }
    }

    /// Current simulated time
    pub fn now(&self) -> Time {
        self.now
    }

    /// Schedule a callback `delay` time units from now.
    ///
    /// A zero delay still defers the callback to the event loop.
    ///
    /// # Panics
    ///
    /// Panics if `delay` is negative or not finite.
    pub fn schedule<F>(&mut self, delay: Time, callback: F) -> EventId
    where
        F: FnOnce(&mut Scheduler) -> Result<()> + 'static,
    {
        self.schedule_boxed(delay, EventKind::External, Box::new(callback))
    }

    /// Schedule a callback tagged with an explicit cause.
    ///
    /// # Panics
    ///
    /// Panics if `delay` is negative or not finite.
    pub fn schedule_event<F>(&mut self, delay: Time, kind: EventKind, callback: F) -> EventId
    where
        F: FnOnce(&mut Scheduler) -> Result<()> + 'static,
    {
        self.schedule_boxed(delay, kind, Box::new(callback))
    }

    /// Schedule an already boxed callback.
    ///
    /// # Panics
    ///
    /// Panics if `delay` is negative or not finite.
    pub fn schedule_boxed(&mut self, delay: Time, kind: EventKind, callback: Callback) -> EventId {
        match self.try_schedule(delay, kind, callback) {
            Ok(id) => id,
            Err(err) => panic!("{err}"),
        }
    }

    /// Schedule a callback, reporting invalid delays instead of panicking
    pub fn try_schedule(
        &mut self,
        delay: Time,
        kind: EventKind,
        callback: Callback,
    ) -> std::result::Result<EventId, SchedulingError> {
        validate_delay(delay)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        let fire_time = self.now + delay;
        trace!(seq, fire_time, %kind, "event scheduled");

        self.queue.push(ScheduledEvent {
            fire_time,
            seq,
            kind,
            callback,
        });
        Ok(EventId(seq))
    }

    /// Dispatch every event with `fire_time <= end_time`, in order.
    ///
    /// Returns the number of events dispatched by this call. Events beyond the
    /// horizon stay queued. When the queue runs dry or the next event lies past
    /// the horizon the clock is advanced to `end_time`. The first callback error
    /// stops the run and is returned.
    pub fn run_until(&mut self, end_time: Time) -> Result<u64> {
        let mut count = 0u64;

        loop {
            if let Some(limit) = self.max_events {
                if count >= limit {
                    warn!(limit, now = self.now, "event budget exhausted, stopping early");
                    return Ok(count);
                }
            }

            let due = matches!(self.queue.peek(), Some(next) if next.fire_time <= end_time);
            if !due {
                break;
            }
            let Some(event) = self.queue.pop() else {
                break;
            };

            self.now = event.fire_time;
            self.dispatched += 1;
            count += 1;
            debug!(seq = event.seq, time = self.now, kind = %event.kind, "dispatching event");
            self.journal.record(JournalEntry::Dispatched {
                time: self.now,
                seq: event.seq,
                kind: event.kind,
            });

            (event.callback)(self)?;
        }

        if end_time > self.now {
            self.now = end_time;
        }
        info!(dispatched = count, now = self.now, pending = self.queue.len(), "run complete");
        Ok(count)
    }

    /// Hand out the next request identifier
    pub fn allocate_request_id(&mut self) -> RequestId {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        id
    }

    /// Fire time of the earliest pending event
    pub fn next_fire_time(&self) -> Option<Time> {
        self.queue.peek().map(|event| event.fire_time)
    }

    /// Number of pending events
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is left to dispatch
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total number of events dispatched so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Get the journal
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Get mutable access to the journal
    pub fn journal_mut(&mut self) -> &mut Journal {
        &mut self.journal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> Rc<RefCell<Vec<(Time, &'static str)>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_scheduler_ordering() {
        let mut scheduler = Scheduler::new();
        let log = recorder();

        for (delay, label) in [(3.0, "c"), (1.0, "a"), (2.0, "b")] {
            let log = Rc::clone(&log);
            scheduler.schedule(delay, move |s| {
                log.borrow_mut().push((s.now(), label));
                Ok(())
            });
        }

        assert_eq!(scheduler.run_until(10.0).unwrap(), 3);
        assert_eq!(*log.borrow(), vec![(1.0, "a"), (2.0, "b"), (3.0, "c")]);
    }

    #[test]
    fn test_equal_times_fire_fifo() {
        let mut scheduler = Scheduler::new();
        let log = recorder();

        for label in ["first", "second", "third"] {
            let log = Rc::clone(&log);
            scheduler.schedule(4.0, move |s| {
                log.borrow_mut().push((s.now(), label));
                Ok(())
            });
        }

        scheduler.run_until(4.0).unwrap();
        let labels: Vec<_> = log.borrow().iter().map(|(_, l)| *l).collect();
        assert_eq!(labels, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_zero_delay_is_deferred() {
        let mut scheduler = Scheduler::new();
        let fired = Rc::new(RefCell::new(false));

        let flag = Rc::clone(&fired);
        scheduler.schedule(0.0, move |_| {
            *flag.borrow_mut() = true;
            Ok(())
        });

        assert!(!*fired.borrow());
        assert_eq!(scheduler.pending(), 1);
        scheduler.run_until(0.0).unwrap();
        assert!(*fired.borrow());
    }

    #[test]
    fn test_events_past_horizon_stay_queued() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(5.0, |_| Ok(()));
        scheduler.schedule(15.0, |_| Ok(()));

        assert_eq!(scheduler.run_until(10.0).unwrap(), 1);
        assert_eq!(scheduler.now(), 10.0);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.next_fire_time(), Some(15.0));
    }

    #[test]
    fn test_try_schedule_rejects_invalid_delays() {
        let mut scheduler = Scheduler::new();
        let err = scheduler
            .try_schedule(-1.0, EventKind::External, Box::new(|_| Ok(())))
            .unwrap_err();
        assert_eq!(err, SchedulingError::NegativeDelay(-1.0));

        let err = scheduler
            .try_schedule(f64::NAN, EventKind::External, Box::new(|_| Ok(())))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::NonFiniteDelay(_)));
        assert!(scheduler.is_idle());
    }

    #[test]
    #[should_panic(expected = "in the past")]
    fn test_negative_delay_panics() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(-0.5, |_| Ok(()));
    }

    #[test]
    fn test_event_budget_stops_run() {
        let mut scheduler = Scheduler::with_options(false, Some(2));
        for delay in [1.0, 2.0, 3.0] {
            scheduler.schedule(delay, |_| Ok(()));
        }

        assert_eq!(scheduler.run_until(10.0).unwrap(), 2);
        assert_eq!(scheduler.now(), 2.0);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_validate_delay() {
        assert_eq!(validate_delay(0.0), Ok(()));
        assert_eq!(validate_delay(-0.5), Err(SchedulingError::NegativeDelay(-0.5)));
        assert!(matches!(
            validate_delay(f64::INFINITY),
            Err(SchedulingError::NonFiniteDelay(_))
        ));
    }
}
