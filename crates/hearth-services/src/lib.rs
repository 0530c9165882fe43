//! Hearth - Services
//!
//! What the dashboard actually calls. [`HAClient`] turns the socket
//! commands into typed methods; [`RestClient`] covers the few plain-HTTP
//! reads used when no socket is wanted; [`EdgeFunctionClient`] talks to the
//! hosted scene and automation managers.

pub mod edge;
pub mod facade;
pub mod rest;

pub use edge::{EdgeAction, EdgeFunctionClient, EdgeOutcome};
pub use facade::HAClient;
pub use rest::RestClient;
