//! Authentication frames for the WebSocket handshake.
//!
//! Protocol flow:
//!   1. Client connects to ws(s)://host/api/websocket
//!   2. Server sends: { type: "auth_required", ha_version }
//!   3. Client sends: { type: "auth", access_token }
//!   4. Server replies { type: "auth_ok" } or { type: "auth_invalid", message }
//!   5. Command traffic begins

use serde::Serialize;

/// Credential frame sent in answer to `auth_required`.
///
/// Borrows the token so the secret never gets copied into a long-lived
/// buffer; serialize it straight onto the socket.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AuthMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    access_token: &'a str,
}

impl<'a> AuthMessage<'a> {
    pub fn new(access_token: &'a str) -> Self {
        Self {
            kind: "auth",
            access_token,
        }
    }
}
