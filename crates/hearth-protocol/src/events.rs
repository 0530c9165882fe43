//! Event type names pushed by the backend.
//!
//! Any string is a valid event type on the wire; these are the ones the
//! dashboard listens to.

/// Well-known event types.
pub struct Events;

impl Events {
    pub const STATE_CHANGED: &str = "state_changed";
    pub const CALL_SERVICE: &str = "call_service";
    pub const AREA_REGISTRY_UPDATED: &str = "area_registry_updated";
    pub const FLOOR_REGISTRY_UPDATED: &str = "floor_registry_updated";
    pub const DEVICE_REGISTRY_UPDATED: &str = "device_registry_updated";
    pub const ENTITY_REGISTRY_UPDATED: &str = "entity_registry_updated";
    pub const AUTOMATION_TRIGGERED: &str = "automation_triggered";
}
