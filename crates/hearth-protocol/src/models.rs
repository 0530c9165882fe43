//! Typed views of state snapshots and registry listings.
//!
//! Fields the dashboard does not read are kept in `extra` so nothing the
//! backend sends is lost when a model is re-serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Origin of a state change or event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HAContext {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// One entity in a `get_states` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HAEntity {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub context: Option<HAContext>,
}

impl HAEntity {
    /// `light` for `light.kitchen`.
    pub fn domain(&self) -> &str {
        self.entity_id.split_once('.').map_or(self.entity_id.as_str(), |(d, _)| d)
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(Value::as_str)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.state.as_str(), "unavailable" | "unknown")
    }
}

/// Payload of a `state_changed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedData {
    pub entity_id: String,
    #[serde(default)]
    pub old_state: Option<HAEntity>,
    #[serde(default)]
    pub new_state: Option<HAEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HAArea {
    pub area_id: String,
    pub name: String,
    #[serde(default)]
    pub floor_id: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HAFloor {
    pub floor_id: String,
    pub name: String,
    #[serde(default)]
    pub level: Option<i32>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Device registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_by_user: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub disabled_by: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceEntry {
    /// The user-assigned name wins over the integration-provided one.
    pub fn display_name(&self) -> Option<&str> {
        self.name_by_user.as_deref().or(self.name.as_deref())
    }
}

/// Entity registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRegistryEntry {
    pub entity_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub area_id: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub disabled_by: Option<String>,
    #[serde(default)]
    pub hidden_by: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityRegistryEntry {
    /// Area of the entity itself, falling back to its device's area.
    pub fn resolved_area<'a>(&'a self, devices: &'a [DeviceEntry]) -> Option<&'a str> {
        self.area_id.as_deref().or_else(|| {
            let device_id = self.device_id.as_deref()?;
            devices
                .iter()
                .find(|d| d.id == device_id)
                .and_then(|d| d.area_id.as_deref())
        })
    }
}

/// Target selector for `call_service`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTarget {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_id: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_id: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub area_id: Vec<String>,
}

impl ServiceTarget {
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: vec![entity_id.into()],
            ..Self::default()
        }
    }

    pub fn area(area_id: impl Into<String>) -> Self {
        Self {
            area_id: vec![area_id.into()],
            ..Self::default()
        }
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id.push(entity_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entity_id.is_empty() && self.device_id.is_empty() && self.area_id.is_empty()
    }
}
