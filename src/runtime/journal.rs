//! Event journal, request statistics and run fingerprints
//!
//! The journal is the simulation's observable history: one entry per
//! dispatched event plus one per request issue and settlement. Two runs of the
//! same program to the same horizon produce identical journals, so the blake3
//! digest of the entries doubles as a determinism check.

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use super::request::{Caller, Failure, RequestId, Status};
use super::scheduler::{EventKind, Time};

/// A single journal record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum JournalEntry {
    /// The scheduler invoked an event callback
    Dispatched {
        /// Simulated time of dispatch
        time: Time,
        /// Insertion sequence of the event
        seq: u64,
        /// Scheduling cause
        kind: EventKind,
    },

    /// A request was handed to a service
    Issued {
        /// Simulated time of issue
        time: Time,
        /// Request identifier
        request: RequestId,
        /// Who issued it
        caller: Caller,
        /// Target service
        service: String,
        /// Target operation
        operation: String,
    },

    /// A request left the pending state
    Settled {
        /// Simulated time of settlement
        time: Time,
        /// Request identifier
        request: RequestId,
        /// Terminal status
        status: Status,
        /// Failure reason for ERROR settlements
        failure: Option<Failure>,
    },

    /// A reply arrived for a request that had already settled
    StaleReply {
        /// Simulated time of the ignored reply
        time: Time,
        /// Request identifier
        request: RequestId,
        /// Status the late reply tried to set
        attempted: Status,
    },
}

/// Aggregate request counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStats {
    /// Requests handed to services
    pub issued: u64,
    /// Requests settled in SUCCESS
    pub succeeded: u64,
    /// Requests settled in ERROR (timeouts included)
    pub failed: u64,
    /// Requests settled in ERROR by their deadline
    pub timed_out: u64,
    /// Replies ignored because the request had already settled
    pub stale_replies: u64,
}

/// Append-only simulation journal
#[derive(Debug, Clone, Default)]
pub struct Journal {
    enabled: bool,
    entries: Vec<JournalEntry>,
    stats: RequestStats,
}

impl Journal {
    /// Create a journal; when disabled only statistics are kept
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Vec::new(),
            stats: RequestStats::default(),
        }
    }

    /// Whether entries are retained
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record an entry and update statistics
    pub fn record(&mut self, entry: JournalEntry) {
        match &entry {
            JournalEntry::Dispatched { .. } => {}
            JournalEntry::Issued { .. } => self.stats.issued += 1,
            JournalEntry::Settled {
                status, failure, ..
            } => match status {
                Status::Success => self.stats.succeeded += 1,
                Status::Error => {
                    self.stats.failed += 1;
                    if matches!(failure, Some(Failure::TimedOut { .. })) {
                        self.stats.timed_out += 1;
                    }
                }
                Status::Pending => {}
            },
            JournalEntry::StaleReply { .. } => self.stats.stale_replies += 1,
        }

        if self.enabled {
            self.entries.push(entry);
        }
    }

    /// Retained entries, oldest first
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Request counters
    pub fn stats(&self) -> RequestStats {
        self.stats
    }

    /// Hex-encoded blake3 digest of the retained entries
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let mut hasher = Hasher::new();
        for entry in &self.entries {
            hasher.update(&serde_json::to_vec(entry)?);
        }
        Ok(hasher.finalize().to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled(request: u64, status: Status, failure: Option<Failure>) -> JournalEntry {
        JournalEntry::Settled {
            time: 1.0,
            request: RequestId(request),
            status,
            failure,
        }
    }

    #[test]
    fn test_stats_track_settlements() {
        let mut journal = Journal::new(true);
        journal.record(settled(0, Status::Success, None));
        journal.record(settled(1, Status::Error, Some(Failure::Rejected)));
        journal.record(settled(
            2,
            Status::Error,
            Some(Failure::TimedOut { deadline: 1.0 }),
        ));
        journal.record(JournalEntry::StaleReply {
            time: 2.0,
            request: RequestId(2),
            attempted: Status::Success,
        });

        let stats = journal.stats();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.stale_replies, 1);
        assert_eq!(journal.entries().len(), 4);
    }

    #[test]
    fn test_disabled_journal_keeps_only_stats() {
        let mut journal = Journal::new(false);
        journal.record(settled(0, Status::Success, None));

        assert!(journal.entries().is_empty());
        assert_eq!(journal.stats().succeeded, 1);
    }

    #[test]
    fn test_fingerprint_depends_on_entries() {
        let mut a = Journal::new(true);
        let mut b = Journal::new(true);
        a.record(settled(0, Status::Success, None));
        b.record(settled(0, Status::Success, None));
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        b.record(settled(1, Status::Error, Some(Failure::Injected)));
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }
}
