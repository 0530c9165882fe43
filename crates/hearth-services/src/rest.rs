//! Plain-HTTP reads against the REST API.

use std::time::Duration;

use hearth_protocol::{HAEntity, HAError, HAResult};
use hearth_transport::ConnectionConfig;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bearer-authenticated client for `{base}/api/...`.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, token: SecretString) -> HAResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HAError::transport(format!("HTTP client setup failed: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Same instance and token as the socket connection.
    pub fn from_config(config: &ConnectionConfig) -> HAResult<Self> {
        Self::new(config.http_base(), config.access_token.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/states`
    pub async fn get_states(&self) -> HAResult<Vec<HAEntity>> {
        self.get_json("/api/states").await
    }

    /// `GET /api/states/{entity_id}`. An unknown entity is a
    /// `ServiceError` with code `404`.
    pub async fn get_state(&self, entity_id: &str) -> HAResult<HAEntity> {
        self.get_json(&format!("/api/states/{entity_id}")).await
    }

    /// Whether the API answers with the configured token.
    pub async fn check_api(&self) -> bool {
        let url = format!("{}/api/", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("API probe answered {}", response.status());
                false
            }
            Err(e) => {
                warn!("API probe failed: {e}");
                false
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> HAResult<T> {
        let url = format!("{}{path}", self.base_url);
        debug!("GET {url}");
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| HAError::transport(format!("GET {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(http_failure(status, body));
        }
        response
            .json()
            .await
            .map_err(|e| HAError::transport(format!("GET {path} returned malformed JSON: {e}")))
    }
}

/// Non-2xx answer as a service error carrying the HTTP status.
pub(crate) fn http_failure(status: StatusCode, body: String) -> HAError {
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body
    };
    HAError::service(status.as_u16().to_string(), message)
}
