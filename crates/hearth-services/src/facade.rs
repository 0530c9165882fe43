//! Typed operations over one [`Connection`].

use hearth_protocol::{
    Commands, DeviceEntry, EntityRegistryEntry, Events, HAArea, HAEntity, HAError, HAEvent,
    HAFloor, HAResult, ServiceTarget, StateChangedData,
};
use hearth_transport::{Connection, ConnectionConfig, LifecycleEvent, Subscription};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Client for one Home Assistant instance.
///
/// Cheap to clone. Every clone shares the same socket.
#[derive(Clone)]
pub struct HAClient {
    connection: Connection,
}

impl HAClient {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            connection: Connection::new(config),
        }
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    /// The underlying connection, for state inspection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub async fn connect(&self) -> HAResult<bool> {
        self.connection.connect().await
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.connection.lifecycle()
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub async fn get_states(&self) -> HAResult<Vec<HAEntity>> {
        self.request(Commands::GET_STATES, None).await
    }

    /// Instance configuration (location, units, version, components).
    pub async fn get_config(&self) -> HAResult<Value> {
        self.connection.send(Commands::GET_CONFIG, None).await
    }

    pub async fn list_areas(&self) -> HAResult<Vec<HAArea>> {
        self.request(Commands::AREA_REGISTRY_LIST, None).await
    }

    pub async fn list_floors(&self) -> HAResult<Vec<HAFloor>> {
        self.request(Commands::FLOOR_REGISTRY_LIST, None).await
    }

    pub async fn list_devices(&self) -> HAResult<Vec<DeviceEntry>> {
        self.request(Commands::DEVICE_REGISTRY_LIST, None).await
    }

    pub async fn list_entities(&self) -> HAResult<Vec<EntityRegistryEntry>> {
        self.request(Commands::ENTITY_REGISTRY_LIST, None).await
    }

    /// Service catalogue keyed by domain, then service name.
    pub async fn get_services(&self) -> HAResult<Value> {
        self.connection.send(Commands::GET_SERVICES, None).await
    }

    // ── Actions ─────────────────────────────────────────────────────────

    /// Invoke `domain.service`. Fails with [`HAError::NotConnected`] before
    /// anything is written when the socket is not authenticated.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Option<Value>,
        target: Option<ServiceTarget>,
    ) -> HAResult<Value> {
        if !self.is_connected() {
            warn!("call_service {domain}.{service} while not connected");
            return Err(HAError::NotConnected);
        }
        info!(domain, service, "calling service");
        self.connection
            .send(Commands::CALL_SERVICE, Some(service_call_payload(domain, service, data, target)))
            .await
    }

    /// Browse a media player's library. Without a content id/type pair
    /// this lists the root.
    pub async fn browse_media(
        &self,
        entity_id: &str,
        content_id: Option<&str>,
        content_type: Option<&str>,
    ) -> HAResult<Value> {
        let payload = browse_payload(entity_id, content_id, content_type);
        debug!(%payload, "browse media");
        self.connection.send(Commands::MEDIA_BROWSE, Some(payload)).await
    }

    pub async fn play_media(
        &self,
        entity_id: &str,
        content_id: &str,
        content_type: &str,
    ) -> HAResult<()> {
        self.call_service(
            "media_player",
            "play_media",
            Some(json!({
                "media_content_id": content_id,
                "media_content_type": content_type,
            })),
            Some(ServiceTarget::entity(entity_id)),
        )
        .await?;
        Ok(())
    }

    // ── Events ──────────────────────────────────────────────────────────

    pub async fn subscribe_events<F>(&self, event_type: &str, callback: F) -> HAResult<Subscription>
    where
        F: Fn(&HAEvent) + Send + Sync + 'static,
    {
        self.connection.subscribe(event_type, callback).await
    }

    /// `state_changed` events with their payload already decoded. Events
    /// whose payload does not decode are logged and skipped.
    pub async fn subscribe_state_changes<F>(&self, callback: F) -> HAResult<Subscription>
    where
        F: Fn(&StateChangedData) + Send + Sync + 'static,
    {
        self.connection
            .subscribe(Events::STATE_CHANGED, move |event: &HAEvent| {
                match StateChangedData::deserialize(&event.data) {
                    Ok(change) => callback(&change),
                    Err(e) => warn!("Skipping malformed state_changed payload: {e}"),
                }
            })
            .await
    }

    async fn request<T: DeserializeOwned>(&self, command: &str, payload: Option<Value>) -> HAResult<T> {
        let value = self.connection.send(command, payload).await?;
        decode_result(command, value)
    }
}

/// Decode a successful result into its typed shape. The socket itself was
/// fine, so a mismatch is a [`HAError::Service`] with code `invalid_result`.
fn decode_result<T: DeserializeOwned>(command: &str, value: Value) -> HAResult<T> {
    serde_json::from_value(value)
        .map_err(|e| HAError::service("invalid_result", format!("unexpected {command} result: {e}")))
}

/// `{domain, service, service_data?, target?}`
fn service_call_payload(
    domain: &str,
    service: &str,
    data: Option<Value>,
    target: Option<ServiceTarget>,
) -> Value {
    let mut payload = Map::new();
    payload.insert("domain".into(), domain.into());
    payload.insert("service".into(), service.into());
    if let Some(data) = data {
        payload.insert("service_data".into(), data);
    }
    if let Some(target) = target.filter(|t| !t.is_empty()) {
        payload.insert("target".into(), json!(target));
    }
    Value::Object(payload)
}

/// The backend wants `media_content_id` and `media_content_type` together
/// or not at all.
fn browse_payload(entity_id: &str, content_id: Option<&str>, content_type: Option<&str>) -> Value {
    let mut payload = Map::new();
    payload.insert("entity_id".into(), entity_id.into());
    if content_id.is_some() || content_type.is_some() {
        payload.insert("media_content_id".into(), content_id.unwrap_or_default().into());
        payload.insert("media_content_type".into(), content_type.unwrap_or_default().into());
    }
    Value::Object(payload)
}
