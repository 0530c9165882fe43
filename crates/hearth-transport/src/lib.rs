//! Hearth Transport Layer
//!
//! Owns the single WebSocket to the Home Assistant backend. The transport
//! layer handles:
//! - Connection lifecycle (connect, close, clean vs unclean closure)
//! - Authentication handshake
//! - Request/response correlation with per-request timeouts
//! - Event subscription fan-out, re-armed after every reconnect
//! - Bounded exponential-backoff reconnection
//!
//! Everything above this crate talks to the backend through [`Connection`].

pub mod backoff;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod pending;
pub mod state;

pub use backoff::ReconnectPolicy;
pub use config::ConnectionConfig;
pub use connection::{Connection, Subscription};
pub use dispatch::EventCallback;
pub use state::{ConnectionState, LifecycleEvent};
