//! Connection lifecycle states and the events emitted on transitions.

use std::time::Duration;

/// Where a [`Connection`](crate::Connection) is in its lifecycle.
///
/// ```text
/// Idle → Connecting → AwaitingAuth → Authenticated → ClosedClean
///                                  ↘ AuthRejected
/// ClosedUnclean → Reconnecting → Connecting …
///               ↘ ReconnectExhausted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    /// Socket being opened
    Connecting,
    /// Socket open, handshake running
    AwaitingAuth,
    Authenticated,
    /// Caller-initiated (or status 1000) close; no reconnection
    ClosedClean,
    /// Transient state between an unclean close and the retry decision
    ClosedUnclean,
    /// Retry timer armed
    Reconnecting,
    /// Retry cap reached; only an explicit `connect()` resumes
    ReconnectExhausted,
    /// Credential rejected; never retried automatically
    AuthRejected,
}

impl ConnectionState {
    /// A handshake is in flight.
    pub fn is_handshaking(&self) -> bool {
        matches!(self, Self::Connecting | Self::AwaitingAuth)
    }
}

/// Lifecycle notifications, broadcast to anyone holding a receiver from
/// [`Connection::lifecycle`](crate::Connection::lifecycle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// `auth_ok` received
    Authenticated { ha_version: Option<String> },
    /// Authentication succeeded on a connection that had authenticated before
    Reconnected,
    Disconnected { clean: bool },
    ReconnectScheduled { attempt: u32, delay: Duration },
    ReconnectExhausted,
    AuthRejected { message: String },
}
