//! Event subscription table and fan-out.
//!
//! Local callbacks and server-side subscription state are tracked
//! separately: callbacks come and go with `subscribe`/`unsubscribe`, while
//! the server state follows the socket. It drops back to `NotRequested` on
//! every closure, and the connection re-arms it after the next `auth_ok`.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use hearth_protocol::HAEvent;
use tracing::error;

/// Callback invoked for each pushed event of the subscribed type.
pub type EventCallback = Arc<dyn Fn(&HAEvent) + Send + Sync>;

/// Server-side state of one event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSubscription {
    NotRequested,
    /// `subscribe_events` sent on the socket of the given generation
    Requested { generation: u64 },
    Acknowledged { generation: u64 },
}

struct EventSubscription {
    callbacks: Vec<(u64, EventCallback)>,
    server: ServerSubscription,
}

/// Subscriptions keyed by event type.
pub struct EventDispatcher {
    next_subscriber: u64,
    subscriptions: HashMap<String, EventSubscription>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            next_subscriber: 1,
            subscriptions: HashMap::new(),
        }
    }

    /// Register a callback; returns its subscriber id.
    pub fn add(&mut self, event_type: &str, callback: EventCallback) -> u64 {
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        self.subscriptions
            .entry(event_type.to_string())
            .or_insert_with(|| EventSubscription {
                callbacks: Vec::new(),
                server: ServerSubscription::NotRequested,
            })
            .callbacks
            .push((id, callback));
        id
    }

    /// Remove one callback. The server-side state is left alone.
    pub fn remove(&mut self, event_type: &str, subscriber: u64) -> bool {
        let Some(sub) = self.subscriptions.get_mut(event_type) else {
            return false;
        };
        let before = sub.callbacks.len();
        sub.callbacks.retain(|(id, _)| *id != subscriber);
        sub.callbacks.len() != before
    }

    /// Claim the right to send `subscribe_events` for `event_type` on the
    /// socket `generation`. Only the first claimant since the last reset wins.
    pub fn claim(&mut self, event_type: &str, generation: u64) -> bool {
        match self.subscriptions.get_mut(event_type) {
            Some(sub) if sub.server == ServerSubscription::NotRequested => {
                sub.server = ServerSubscription::Requested { generation };
                true
            }
            _ => false,
        }
    }

    /// Claim every event type that has live callbacks but no server-side
    /// subscription on the current socket.
    pub fn claim_all(&mut self, generation: u64) -> Vec<String> {
        self.subscriptions
            .iter_mut()
            .filter(|(_, sub)| {
                sub.server == ServerSubscription::NotRequested && !sub.callbacks.is_empty()
            })
            .map(|(event_type, sub)| {
                sub.server = ServerSubscription::Requested { generation };
                event_type.clone()
            })
            .collect()
    }

    pub fn acknowledge(&mut self, event_type: &str, generation: u64) {
        if let Some(sub) = self.subscriptions.get_mut(event_type) {
            if sub.server == (ServerSubscription::Requested { generation }) {
                sub.server = ServerSubscription::Acknowledged { generation };
            }
        }
    }

    /// Undo a claim whose request failed. A newer claim is left intact.
    pub fn release(&mut self, event_type: &str, generation: u64) {
        if let Some(sub) = self.subscriptions.get_mut(event_type) {
            if sub.server == (ServerSubscription::Requested { generation }) {
                sub.server = ServerSubscription::NotRequested;
            }
        }
    }

    /// The socket is gone; every server-side subscription went with it.
    pub fn reset_server_state(&mut self) {
        for sub in self.subscriptions.values_mut() {
            sub.server = ServerSubscription::NotRequested;
        }
    }

    pub fn server_state(&self, event_type: &str) -> Option<ServerSubscription> {
        self.subscriptions.get(event_type).map(|sub| sub.server)
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscriptions
            .get(event_type)
            .map_or(0, |sub| sub.callbacks.len())
    }

    /// Snapshot of the callbacks for `event_type`, so delivery can run
    /// without holding the table.
    pub fn callbacks_for(&self, event_type: &str) -> Vec<EventCallback> {
        self.subscriptions
            .get(event_type)
            .map(|sub| sub.callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }
}

/// Invoke every callback with `event`. A panicking callback is logged and
/// skipped. Returns how many callbacks completed.
pub fn deliver(callbacks: &[EventCallback], event: &HAEvent) -> usize {
    let mut delivered = 0;
    for callback in callbacks {
        match catch_unwind(AssertUnwindSafe(|| callback(event))) {
            Ok(()) => delivered += 1,
            Err(_) => error!(event_type = %event.event_type, "event callback panicked"),
        }
    }
    delivered
}
