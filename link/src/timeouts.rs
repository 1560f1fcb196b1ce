//! Timeout configuration for logdb client operations.

use std::time::Duration;

/// Timeouts applied to a session's transport activity.
///
/// # Examples
///
/// ```rust
/// use logdb_link::SessionTimeouts;
/// use std::time::Duration;
///
/// // Defaults are fine for most deployments
/// let timeouts = SessionTimeouts::default();
///
/// // Aggressive values for local development
/// let timeouts = SessionTimeouts::fast();
///
/// // Custom request timeout
/// let timeouts = SessionTimeouts {
///     request: Duration::from_secs(60),
///     ..SessionTimeouts::default()
/// };
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    /// Per-RPC timeout (send + receive). Default: 30 seconds.
    pub request: Duration,

    /// TCP connect timeout. Default: 10 seconds.
    pub connect: Duration,

    /// Socket wait for one long-poll cycle; expiry means "no events"
    /// and the receiver re-polls immediately. Default: 5 seconds.
    pub trap_poll: Duration,

    /// Grace period for joining the trap receiver on close; the task is
    /// aborted when the grace period expires. Default: 10 seconds.
    pub shutdown_grace: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            connect: Duration::from_secs(10),
            trap_poll: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl SessionTimeouts {
    /// Aggressive timeouts for local development and tests.
    pub fn fast() -> Self {
        Self {
            request: Duration::from_secs(5),
            connect: Duration::from_secs(2),
            trap_poll: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}
