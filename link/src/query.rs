//! Per-query state machine.
//!
//! A [`LogQuery`] tracks the server-side status and loaded row count of
//! one query, plus the waiters blocked on it. All mutation happens
//! under the client's registry lock: the trap listener writes, caller
//! tasks read and register waiters, so a count update can never slip
//! between a waiter's check and its registration.

use crate::models::QueryStatus;
use std::fmt;
use tokio::sync::oneshot;

/// A blocked caller: woken once when `threshold` is reached or the
/// query ends, whichever comes first. `threshold = None` waits for the
/// end only.
struct Waiter {
    threshold: Option<u64>,
    tx: oneshot::Sender<u64>,
}

/// Outcome of an atomic check-and-register.
pub(crate) enum WaitOutcome {
    /// Condition already satisfied; no need to block.
    Ready(u64),
    /// Resolved with the loaded count at wake time.
    Pending(oneshot::Receiver<u64>),
}

/// Client-side state of one server-side log query.
pub struct LogQuery {
    id: u64,
    query_string: String,
    status: QueryStatus,
    loaded_count: u64,
    waiters: Vec<Waiter>,
}

impl LogQuery {
    pub(crate) fn new(id: u64, query_string: &str) -> Self {
        Self {
            id,
            query_string: query_string.to_string(),
            status: QueryStatus::Created,
            loaded_count: 0,
            waiters: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    pub fn loaded_count(&self) -> u64 {
        self.loaded_count
    }

    /// Record a start/stop acknowledgement. Ignored once Ended.
    pub(crate) fn set_status(&mut self, status: QueryStatus) {
        if self.status != QueryStatus::Ended {
            self.status = status;
        }
    }

    /// Apply a count update from either trap topic.
    ///
    /// The count never decreases, and updates on an Ended query are
    /// no-ops. Wakes every waiter whose threshold is now satisfied.
    pub(crate) fn update_count(&mut self, count: u64) {
        if self.status == QueryStatus::Ended {
            return;
        }
        if count > self.loaded_count {
            self.loaded_count = count;
        }
        let loaded = self.loaded_count;
        let mut pending = Vec::new();
        for waiter in self.waiters.drain(..) {
            match waiter.threshold {
                Some(t) if t <= loaded => {
                    let _ = waiter.tx.send(loaded);
                }
                _ => pending.push(waiter),
            }
        }
        self.waiters = pending;
    }

    /// Finalize the query with the eof event's authoritative total.
    ///
    /// The first eof from either topic wins; later events find the
    /// query Ended and do nothing. All waiters are woken regardless of
    /// threshold.
    pub(crate) fn finalize(&mut self, total: u64) {
        if self.status == QueryStatus::Ended {
            return;
        }
        self.loaded_count = total;
        self.status = QueryStatus::Ended;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.tx.send(total);
        }
    }

    /// Atomically check the wait condition and register a waiter.
    ///
    /// Must be called with the registry lock held so no update can
    /// arrive between the check and the registration.
    pub(crate) fn register_waiter(&mut self, threshold: Option<u64>) -> WaitOutcome {
        let satisfied = self.status == QueryStatus::Ended
            || matches!(threshold, Some(t) if t <= self.loaded_count);
        if satisfied {
            return WaitOutcome::Ready(self.loaded_count);
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.push(Waiter { threshold, tx });
        WaitOutcome::Pending(rx)
    }

    /// Snapshot for listings.
    pub fn info(&self) -> QueryInfo {
        QueryInfo {
            id: self.id,
            status: self.status,
            loaded_count: self.loaded_count,
            query_string: self.query_string.clone(),
        }
    }
}

/// Point-in-time view of a registered query.
#[derive(Debug, Clone)]
pub struct QueryInfo {
    pub id: u64,
    pub status: QueryStatus,
    pub loaded_count: u64,
    pub query_string: String,
}

impl fmt::Display for QueryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}|{}] {}, loaded_count={}",
            self.id, self.status, self.query_string, self.loaded_count
        )
    }
}
