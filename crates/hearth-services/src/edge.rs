//! Client for the hosted scene and automation managers.
//!
//! Both functions proxy the instance's config API. They take the instance
//! URL and token in the request body and answer with the stored config, a
//! `{notFound: true}` marker for a missing `get`, or `{cannotDelete: true,
//! reason}` for a scene that only exists in YAML.

use std::time::Duration;

use hearth_protocol::{HAError, HAResult};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::rest::http_failure;

const SCENE_MANAGER: &str = "ha-scene-manager";
const AUTOMATION_MANAGER: &str = "ha-automation-manager";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeAction {
    Get,
    Create,
    Update,
    Delete,
}

/// Decoded answer of a manager function.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeOutcome {
    Ok(Value),
    NotFound,
    CannotDelete { reason: Option<String> },
}

impl EdgeOutcome {
    pub fn from_body(body: Value) -> Self {
        if body.get("notFound").and_then(Value::as_bool) == Some(true) {
            return Self::NotFound;
        }
        if body.get("cannotDelete").and_then(Value::as_bool) == Some(true) {
            let reason = body.get("reason").and_then(Value::as_str).map(String::from);
            return Self::CannotDelete { reason };
        }
        Self::Ok(body)
    }

    /// The stored config, whether the function wrapped it in `{config}` or
    /// returned it bare.
    pub fn config(&self) -> Option<&Value> {
        match self {
            Self::Ok(body) => Some(body.get("config").unwrap_or(body)),
            _ => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SceneRequest<'a> {
    ha_base_url: &'a str,
    ha_token: &'a str,
    action: EdgeAction,
    scene_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scene_config: Option<&'a Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AutomationRequest<'a> {
    ha_base_url: &'a str,
    ha_token: &'a str,
    action: EdgeAction,
    automation_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    automation_config: Option<&'a Value>,
}

pub struct EdgeFunctionClient {
    http: reqwest::Client,
    functions_base: String,
    ha_base_url: String,
    ha_token: SecretString,
}

impl EdgeFunctionClient {
    /// `functions_base` is the URL the function names are appended to,
    /// e.g. `https://<project>.supabase.co/functions/v1`.
    pub fn new(
        functions_base: impl Into<String>,
        ha_base_url: impl Into<String>,
        ha_token: SecretString,
    ) -> HAResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HAError::transport(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            http,
            functions_base: functions_base.into().trim_end_matches('/').to_string(),
            ha_base_url: ha_base_url.into(),
            ha_token,
        })
    }

    pub async fn scene(
        &self,
        action: EdgeAction,
        scene_id: &str,
        config: Option<&Value>,
    ) -> HAResult<EdgeOutcome> {
        let body = SceneRequest {
            ha_base_url: &self.ha_base_url,
            ha_token: self.ha_token.expose_secret(),
            action,
            scene_id,
            scene_config: config,
        };
        self.post(SCENE_MANAGER, &body).await
    }

    pub async fn automation(
        &self,
        action: EdgeAction,
        automation_id: &str,
        config: Option<&Value>,
    ) -> HAResult<EdgeOutcome> {
        let body = AutomationRequest {
            ha_base_url: &self.ha_base_url,
            ha_token: self.ha_token.expose_secret(),
            action,
            automation_id,
            automation_config: config,
        };
        self.post(AUTOMATION_MANAGER, &body).await
    }

    async fn post<B: Serialize>(&self, function: &str, body: &B) -> HAResult<EdgeOutcome> {
        let url = format!("{}/{function}", self.functions_base);
        debug!("POST {url}");
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| HAError::transport(format!("{function} unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(http_failure(status, text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| HAError::transport(format!("{function} returned malformed JSON: {e}")))?;
        let outcome = EdgeOutcome::from_body(body);
        if !matches!(outcome, EdgeOutcome::Ok(_)) {
            info!(function, ?outcome, "manager declined");
        }
        Ok(outcome)
    }
}
