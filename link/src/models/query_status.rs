use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a server-side log query.
///
/// `Created → Running ⇄ Stopped`, and `Running | Stopped → Ended` once
/// the server reports eof. `Ended` is terminal until the query id is
/// removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    /// Registered on the server, not started yet.
    Created,
    /// Producing results.
    Running,
    /// Paused by a stop request; may be started again.
    Stopped,
    /// All results produced; final count is authoritative.
    Ended,
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryStatus::Created => "Created",
            QueryStatus::Running => "Running",
            QueryStatus::Stopped => "Stopped",
            QueryStatus::Ended => "Ended",
        };
        write!(f, "{}", s)
    }
}
