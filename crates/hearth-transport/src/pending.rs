//! Pending-request table for the request correlator.
//!
//! Ids are allocated from a counter that never resets for the lifetime of
//! the owning connection, so an id is never reused while outstanding. Every
//! entry is removed on exactly one path: a matching response, a timeout or
//! dropped caller (via [`PendingTable::remove`]), or teardown
//! ([`PendingTable::fail_all`]).

use std::collections::HashMap;
use std::time::Instant;

use hearth_protocol::HAError;
use serde_json::Value;
use tokio::sync::oneshot;

/// Completion half handed to the correlator for one request.
pub type Completion = oneshot::Sender<Result<Value, HAError>>;

#[derive(Debug)]
struct PendingRequest {
    command: String,
    sent_at: Instant,
    completion: Completion,
}

/// In-flight requests indexed by correlation id.
#[derive(Debug)]
pub struct PendingTable {
    next_id: u64,
    entries: HashMap<u64, PendingRequest>,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
        }
    }

    /// Allocate the next id and register its completion.
    pub fn register(&mut self, command: &str) -> (u64, oneshot::Receiver<Result<Value, HAError>>) {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            id,
            PendingRequest {
                command: command.to_string(),
                sent_at: Instant::now(),
                completion: tx,
            },
        );
        (id, rx)
    }

    /// Settle `id` with `result`. Returns the command name and its latency,
    /// or `None` for an unknown (already settled or never sent) id.
    pub fn settle(
        &mut self,
        id: u64,
        result: Result<Value, HAError>,
    ) -> Option<(String, std::time::Duration)> {
        let entry = self.entries.remove(&id)?;
        let elapsed = entry.sent_at.elapsed();
        // The caller may have given up already; nothing to do then.
        let _ = entry.completion.send(result);
        Some((entry.command, elapsed))
    }

    /// Forget `id` without settling it.
    pub fn remove(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Reject every outstanding request and empty the table.
    pub fn fail_all(&mut self, error: &HAError) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            let _ = entry.completion.send(Err(error.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }
}
