//! Command type constants: the `type` field of every client request.

/// Every command type the service façade sends, grouped by area.
pub struct Commands;

impl Commands {
    // ── State ───────────────────────────────────────────────────────────
    pub const GET_STATES: &str = "get_states";
    pub const GET_CONFIG: &str = "get_config";
    pub const GET_SERVICES: &str = "get_services";

    // ── Registries ──────────────────────────────────────────────────────
    pub const AREA_REGISTRY_LIST: &str = "config/area_registry/list";
    pub const FLOOR_REGISTRY_LIST: &str = "config/floor_registry/list";
    pub const DEVICE_REGISTRY_LIST: &str = "config/device_registry/list";
    pub const ENTITY_REGISTRY_LIST: &str = "config/entity_registry/list";

    // ── Services ────────────────────────────────────────────────────────
    pub const CALL_SERVICE: &str = "call_service";

    // ── Events ──────────────────────────────────────────────────────────
    pub const SUBSCRIBE_EVENTS: &str = "subscribe_events";

    // ── Media ───────────────────────────────────────────────────────────
    pub const MEDIA_BROWSE: &str = "media_player/browse_media";
}
