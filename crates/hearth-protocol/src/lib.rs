//! Hearth - Protocol Types
//!
//! Wire types for the Home Assistant WebSocket API as spoken by the
//! dashboard. This crate is the single source of truth for frame shapes,
//! command names, event names, registry models, and the error taxonomy
//! shared by the transport and service layers.

pub mod auth;
pub mod commands;
pub mod error;
pub mod events;
pub mod messages;
pub mod models;

pub use auth::AuthMessage;
pub use commands::Commands;
pub use error::{ErrorKind, HAError, HAResult};
pub use events::Events;
pub use messages::{EventMessage, HAEvent, InboundMessage, ResultError, ResultMessage, command_frame};
pub use models::{
    DeviceEntry, EntityRegistryEntry, HAArea, HAContext, HAEntity, HAFloor, ServiceTarget,
    StateChangedData,
};
