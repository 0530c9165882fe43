//! Connection configuration.

use std::time::Duration;

use hearth_protocol::HAError;
use secrecy::SecretString;

use crate::backoff::ReconnectPolicy;

const WEBSOCKET_PATH: &str = "/api/websocket";

/// Everything a [`Connection`](crate::Connection) needs to reach and
/// authenticate against one backend.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base URL of the instance (`https://home.example.org`). `ws(s)://`
    /// URLs are accepted too.
    pub base_url: String,
    /// Long-lived access token
    pub access_token: SecretString,
    /// Deadline for a single command's response (default: 30s)
    pub request_timeout: Duration,
    /// Deadline from socket open to `auth_ok` (default: 15s)
    pub handshake_timeout: Duration,
    /// Automatic reconnection after unclean closure
    pub reconnect: ReconnectPolicy,
}

impl ConnectionConfig {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: SecretString::from(access_token.into()),
            request_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(15),
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Derive the socket endpoint: `http` → `ws`, `https` → `wss`, with the
    /// API path appended.
    pub fn websocket_url(&self) -> Result<String, HAError> {
        let base = self.base_url.trim().trim_end_matches('/');
        let url = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            return Err(HAError::transport(format!(
                "unsupported URL scheme in {:?}",
                self.base_url
            )));
        };

        if url.ends_with(WEBSOCKET_PATH) {
            Ok(url)
        } else {
            Ok(format!("{url}{WEBSOCKET_PATH}"))
        }
    }

    /// Base URL for plain-HTTP calls, trailing slashes removed.
    pub fn http_base(&self) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        let base = base.strip_suffix(WEBSOCKET_PATH).unwrap_or(base);
        if let Some(rest) = base.strip_prefix("wss://") {
            format!("https://{rest}")
        } else if let Some(rest) = base.strip_prefix("ws://") {
            format!("http://{rest}")
        } else {
            base.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_for(base: &str) -> Result<String, HAError> {
        ConnectionConfig::new(base, "t").websocket_url()
    }

    #[test]
    fn https_becomes_wss() {
        assert_eq!(
            url_for("https://abc.ui.nabu.casa/").unwrap(),
            "wss://abc.ui.nabu.casa/api/websocket"
        );
    }

    #[test]
    fn http_becomes_ws() {
        assert_eq!(
            url_for("http://192.168.1.10:8123").unwrap(),
            "ws://192.168.1.10:8123/api/websocket"
        );
    }

    #[test]
    fn websocket_urls_are_kept() {
        assert_eq!(
            url_for("ws://127.0.0.1:9000/api/websocket").unwrap(),
            "ws://127.0.0.1:9000/api/websocket"
        );
        assert_eq!(url_for("ws://127.0.0.1:9000").unwrap(), "ws://127.0.0.1:9000/api/websocket");
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(url_for("ftp://example.org").is_err());
        assert!(url_for("example.org").is_err());
    }

    #[test]
    fn http_base_strips_socket_path() {
        let config = ConnectionConfig::new("ws://127.0.0.1:9000/api/websocket", "t");
        assert_eq!(config.http_base(), "http://127.0.0.1:9000");
        let config = ConnectionConfig::new("https://home.example.org/", "t");
        assert_eq!(config.http_base(), "https://home.example.org");
    }

    #[test]
    fn defaults() {
        let config = ConnectionConfig::new("http://h", "t");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.handshake_timeout, Duration::from_secs(15));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }
}
