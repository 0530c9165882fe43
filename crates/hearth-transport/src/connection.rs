//! The connection: one socket at a time, authenticated, multiplexed, and
//! re-established after unclean closure.
//!
//! Each `Connecting` phase runs in its own task with a fresh socket and a
//! generation number. Completion paths check the generation before touching
//! shared state, so a socket that was replaced or disconnected can never
//! flip the state of its successor.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hearth_protocol::{
    AuthMessage, Commands, HAError, HAEvent, InboundMessage, command_frame,
};
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::ConnectionConfig;
use crate::dispatch::{self, EventCallback, EventDispatcher};
use crate::pending::PendingTable;
use crate::state::{ConnectionState, LifecycleEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

const LIFECYCLE_CAPACITY: usize = 64;

/// Handle to one logical session with the backend. Cheap to clone; all
/// clones share the same socket, pending table, and subscriptions.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    session: Mutex<Session>,
    pending: Mutex<PendingTable>,
    dispatcher: Mutex<EventDispatcher>,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
}

/// Socket-scoped state. Guarded by one lock; never held across `.await`.
struct Session {
    state: ConnectionState,
    /// Bumped for every new socket and on `disconnect()`
    generation: u64,
    /// Automatic retries since the last successful authentication
    attempts: u32,
    has_authenticated: bool,
    /// Writer half of the authenticated socket
    outbound: Option<mpsc::UnboundedSender<Message>>,
    /// `connect()` callers waiting for the handshake in flight
    waiters: Vec<oneshot::Sender<Result<bool, HAError>>>,
    socket_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

/// How a socket phase ended.
enum Closure {
    Clean,
    Unclean(HAError),
    AuthRejected(String),
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                session: Mutex::new(Session {
                    state: ConnectionState::Idle,
                    generation: 0,
                    attempts: 0,
                    has_authenticated: false,
                    outbound: None,
                    waiters: Vec::new(),
                    socket_task: None,
                    reconnect_timer: None,
                }),
                pending: Mutex::new(PendingTable::new()),
                dispatcher: Mutex::new(EventDispatcher::new()),
                lifecycle_tx,
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Open the socket and authenticate.
    ///
    /// Resolves `Ok(true)` once `auth_ok` arrives. Fails with
    /// [`HAError::AuthInvalid`] on a rejected token, [`HAError::Transport`]
    /// if the socket fails first, or [`HAError::Timeout`] if the handshake
    /// deadline passes. Joins a handshake that is already running instead
    /// of starting a second one.
    pub async fn connect(&self) -> Result<bool, HAError> {
        let rx = {
            let mut session = self.inner.session.lock();
            match session.state {
                ConnectionState::Authenticated => return Ok(true),
                state if state.is_handshaking() => {}
                _ => {
                    if let Some(timer) = session.reconnect_timer.take() {
                        timer.abort();
                    }
                    // An explicit connect starts a fresh retry budget.
                    session.attempts = 0;
                    start_socket(&self.inner, &mut session);
                }
            }
            let (tx, rx) = oneshot::channel();
            session.waiters.push(tx);
            rx
        };

        rx.await
            .unwrap_or_else(|_| Err(HAError::transport("connection attempt abandoned")))
    }

    /// Close the socket cleanly and disable reconnection. Every request
    /// still waiting for an answer is rejected immediately.
    pub fn disconnect(&self) {
        let waiters = {
            let mut session = self.inner.session.lock();
            session.generation += 1;
            if let Some(timer) = session.reconnect_timer.take() {
                timer.abort();
            }
            if let Some(outbound) = session.outbound.take() {
                let _ = outbound.send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: Utf8Bytes::from_static("client disconnect"),
                })));
            }
            if let Some(task) = session.socket_task.take() {
                task.abort();
            }
            session.state = ConnectionState::ClosedClean;
            std::mem::take(&mut session.waiters)
        };

        for waiter in waiters {
            let _ = waiter.send(Err(HAError::transport("disconnected before authentication")));
        }
        self.inner.teardown_tables();
        info!("Disconnected from Home Assistant");
        self.inner.emit(LifecycleEvent::Disconnected { clean: true });
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.session.lock().state
    }

    /// Socket open and authenticated.
    pub fn is_connected(&self) -> bool {
        let session = self.inner.session.lock();
        session.state == ConnectionState::Authenticated && session.outbound.is_some()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.session.lock().attempts
    }

    /// Number of requests sent but not yet settled.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.inner.dispatcher.lock().subscriber_count(event_type)
    }

    /// Subscribe to lifecycle transitions.
    pub fn lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.lifecycle_tx.subscribe()
    }

    /// Send `{id, type, ...payload}` and wait for the matching `result`.
    ///
    /// Fails with [`HAError::NotConnected`] without touching the socket when
    /// the connection is not authenticated.
    pub async fn send(&self, command: &str, payload: Option<Value>) -> Result<Value, HAError> {
        // Registered under the session lock so a close that follows always
        // finds the entry in the table it fails.
        let (outbound, id, rx) = {
            let session = self.inner.session.lock();
            if session.state != ConnectionState::Authenticated {
                return Err(HAError::NotConnected);
            }
            let outbound = session.outbound.clone().ok_or(HAError::NotConnected)?;
            let (id, rx) = self.inner.pending.lock().register(command);
            (outbound, id, rx)
        };
        let _guard = PendingGuard { inner: &self.inner, id };

        let frame = command_frame(id, command, payload);
        debug!(id, command, "sending command");
        outbound
            .send(Message::Text(frame.to_string().into()))
            .map_err(|_| HAError::transport("socket writer closed"))?;

        let deadline = self.inner.config.request_timeout;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HAError::transport("connection closed before response")),
            Err(_) => {
                warn!(id, command, "request timed out after {}ms", deadline.as_millis());
                Err(HAError::timeout(command, deadline))
            }
        }
    }

    /// Register `callback` for pushed events of `event_type`.
    ///
    /// The first subscriber for a type triggers one `subscribe_events`
    /// request; later subscribers only add a local callback. When not
    /// authenticated the server request is deferred to the next `auth_ok`.
    pub async fn subscribe<F>(&self, event_type: &str, callback: F) -> Result<Subscription, HAError>
    where
        F: Fn(&HAEvent) + Send + Sync + 'static,
    {
        let callback: EventCallback = Arc::new(callback);
        let generation = self.authenticated_generation();

        let (subscriber, claimed) = {
            let mut dispatcher = self.inner.dispatcher.lock();
            let subscriber = dispatcher.add(event_type, callback);
            let claimed = generation.is_some_and(|g| dispatcher.claim(event_type, g));
            (subscriber, claimed)
        };

        let subscription = Subscription {
            inner: Arc::downgrade(&self.inner),
            event_type: event_type.to_string(),
            subscriber,
        };

        if let (true, Some(generation)) = (claimed, generation) {
            match self.request_subscription(event_type, generation).await {
                Ok(()) => {}
                // The socket went away mid-request; re-armed after the next auth_ok.
                Err(HAError::NotConnected | HAError::Transport(_)) => {
                    debug!(event_type, "subscription deferred until reconnect");
                }
                Err(err) => {
                    self.inner.dispatcher.lock().remove(event_type, subscriber);
                    return Err(err);
                }
            }
        } else if generation.is_none() {
            debug!(event_type, "not connected, subscription deferred");
        }

        Ok(subscription)
    }

    async fn request_subscription(&self, event_type: &str, generation: u64) -> Result<(), HAError> {
        let result = self
            .send(Commands::SUBSCRIBE_EVENTS, Some(json!({ "event_type": event_type })))
            .await;
        let mut dispatcher = self.inner.dispatcher.lock();
        match result {
            Ok(_) => {
                dispatcher.acknowledge(event_type, generation);
                debug!(event_type, "subscribed on server");
                Ok(())
            }
            Err(err) => {
                dispatcher.release(event_type, generation);
                warn!(event_type, "server subscription failed: {err}");
                Err(err)
            }
        }
    }

    fn authenticated_generation(&self) -> Option<u64> {
        let session = self.inner.session.lock();
        (session.state == ConnectionState::Authenticated).then_some(session.generation)
    }
}

/// Handle returned by [`Connection::subscribe`].
///
/// Dropping it keeps the callback registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
pub struct Subscription {
    inner: std::sync::Weak<Inner>,
    event_type: String,
    subscriber: u64,
}

impl Subscription {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Remove the local callback. The server-side subscription stays.
    pub fn unsubscribe(self) -> bool {
        match self.inner.upgrade() {
            Some(inner) => inner.dispatcher.lock().remove(&self.event_type, self.subscriber),
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event_type", &self.event_type)
            .field("subscriber", &self.subscriber)
            .finish()
    }
}

/// Removes a pending entry when `send` returns or its future is dropped.
struct PendingGuard<'a> {
    inner: &'a Inner,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending.lock().remove(self.id);
    }
}

impl Inner {
    fn emit(&self, event: LifecycleEvent) {
        // No receivers is fine
        let _ = self.lifecycle_tx.send(event);
    }

    /// Reject in-flight requests and forget server-side subscriptions.
    fn teardown_tables(&self) {
        let rejected = self
            .pending
            .lock()
            .fail_all(&HAError::transport("connection closed before response"));
        if rejected > 0 {
            warn!("Rejected {rejected} in-flight request(s) on close");
        }
        self.dispatcher.lock().reset_server_state();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Socket lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Begin a new `Connecting` phase with a fresh socket.
fn start_socket(inner: &Arc<Inner>, session: &mut Session) {
    session.generation += 1;
    session.state = ConnectionState::Connecting;
    session.outbound = None;
    let generation = session.generation;
    let span = info_span!("socket", generation, session = %uuid::Uuid::new_v4());
    let task = tokio::spawn(run_socket(Arc::clone(inner), generation).instrument(span));
    session.socket_task = Some(task);
}

async fn run_socket(inner: Arc<Inner>, generation: u64) {
    let deadline = inner.config.handshake_timeout;
    let handshake = tokio::time::timeout(deadline, open_and_authenticate(&inner, generation)).await;

    let closure = match handshake {
        Ok(Ok((sink, stream, ha_version))) => {
            let (outbound, rx) = mpsc::unbounded_channel();
            tokio::spawn(write_loop(sink, rx).in_current_span());
            if !on_authenticated(&inner, generation, outbound, ha_version) {
                return;
            }
            read_loop(&inner, stream).await
        }
        Ok(Err(closure)) => closure,
        Err(_) => {
            warn!("Handshake did not complete within {}ms", deadline.as_millis());
            Closure::Unclean(HAError::timeout("authentication", deadline))
        }
    };

    on_closed(&inner, generation, closure);
}

/// Open the socket and run the handshake. Yields the split socket and the
/// backend version once `auth_ok` arrives.
async fn open_and_authenticate(
    inner: &Arc<Inner>,
    generation: u64,
) -> Result<(WsWrite, WsRead, Option<String>), Closure> {
    let url = inner.config.websocket_url().map_err(Closure::Unclean)?;
    debug!("Connecting to {url}");

    let (ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| Closure::Unclean(HAError::transport(format!("connect failed: {e}"))))?;
    let (mut sink, mut stream) = ws.split();

    {
        let mut session = inner.session.lock();
        if session.generation == generation {
            session.state = ConnectionState::AwaitingAuth;
        }
    }
    debug!("Socket open, waiting for auth_required");

    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| Closure::Unclean(HAError::transport(e.to_string())))?;
        match frame {
            Message::Text(text) => match InboundMessage::parse(text.as_str()) {
                Ok(InboundMessage::AuthRequired { ha_version }) => {
                    debug!(?ha_version, "auth required, sending token");
                    let auth = AuthMessage::new(inner.config.access_token.expose_secret());
                    let body = serde_json::to_string(&auth)
                        .map_err(|e| Closure::Unclean(HAError::from(e)))?;
                    sink.send(Message::Text(body.into()))
                        .await
                        .map_err(|e| Closure::Unclean(HAError::transport(e.to_string())))?;
                }
                Ok(InboundMessage::AuthOk { ha_version }) => {
                    return Ok((sink, stream, ha_version));
                }
                Ok(InboundMessage::AuthInvalid { message }) => {
                    return Err(Closure::AuthRejected(
                        message.unwrap_or_else(|| "invalid access token".into()),
                    ));
                }
                Ok(other) => debug!(?other, "ignoring frame before authentication"),
                Err(e) => warn!("Unparseable frame during handshake: {e}"),
            },
            Message::Ping(data) => {
                let _ = sink.send(Message::Pong(data)).await;
            }
            Message::Close(frame) => return Err(closure_from_frame(frame.as_ref())),
            _ => {}
        }
    }

    Err(Closure::Unclean(HAError::transport("socket closed during handshake")))
}

/// Publish the authenticated socket. Returns `false` if this socket was
/// superseded while the handshake ran.
fn on_authenticated(
    inner: &Arc<Inner>,
    generation: u64,
    outbound: mpsc::UnboundedSender<Message>,
    ha_version: Option<String>,
) -> bool {
    let (waiters, resumed) = {
        let mut session = inner.session.lock();
        if session.generation != generation {
            debug!("Authenticated socket is stale, dropping it");
            return false;
        }
        session.state = ConnectionState::Authenticated;
        session.attempts = 0;
        session.outbound = Some(outbound);
        let resumed = session.has_authenticated;
        session.has_authenticated = true;
        (std::mem::take(&mut session.waiters), resumed)
    };

    info!(?ha_version, resumed, "Authenticated with Home Assistant");
    for waiter in waiters {
        let _ = waiter.send(Ok(true));
    }
    inner.emit(LifecycleEvent::Authenticated { ha_version });
    if resumed {
        inner.emit(LifecycleEvent::Reconnected);
    }

    rearm_subscriptions(inner, generation);
    true
}

/// Re-issue `subscribe_events` for every type with live callbacks.
fn rearm_subscriptions(inner: &Arc<Inner>, generation: u64) {
    let event_types = inner.dispatcher.lock().claim_all(generation);
    if event_types.is_empty() {
        return;
    }
    info!("Re-arming {} event subscription(s)", event_types.len());
    let conn = Connection {
        inner: Arc::clone(inner),
    };
    tokio::spawn(
        async move {
            for event_type in event_types {
                // Failures are logged and released inside request_subscription.
                let _ = conn.request_subscription(&event_type, generation).await;
            }
        }
        .in_current_span(),
    );
}

async fn write_loop(mut sink: WsWrite, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = rx.recv().await {
        let is_close = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!("Socket writer stopped: {e}");
            return;
        }
        if is_close {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Route inbound frames until the socket closes.
async fn read_loop(inner: &Arc<Inner>, mut stream: WsRead) -> Closure {
    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => return Closure::Unclean(HAError::transport(e.to_string())),
        };
        match frame {
            Message::Text(text) => route(inner, text.as_str()),
            Message::Ping(data) => {
                let outbound = inner.session.lock().outbound.clone();
                if let Some(outbound) = outbound {
                    let _ = outbound.send(Message::Pong(data));
                }
            }
            Message::Close(frame) => return closure_from_frame(frame.as_ref()),
            _ => {}
        }
    }
    Closure::Unclean(HAError::transport("socket closed"))
}

fn route(inner: &Inner, text: &str) {
    let message = match InboundMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping unparseable frame: {e}");
            return;
        }
    };

    match message {
        InboundMessage::Result(result) => {
            let id = result.id;
            let settled = inner.pending.lock().settle(id, result.into_result());
            match settled {
                Some((command, elapsed)) => {
                    debug!(id, command, "settled in {}ms", elapsed.as_millis());
                }
                None => debug!(id, "result for unknown or expired request"),
            }
        }
        InboundMessage::Event(message) => {
            let callbacks = inner.dispatcher.lock().callbacks_for(&message.event.event_type);
            if callbacks.is_empty() {
                debug!(event_type = %message.event.event_type, "event without subscribers");
                return;
            }
            dispatch::deliver(&callbacks, &message.event);
        }
        InboundMessage::Pong { .. } | InboundMessage::Unknown => {}
        other => warn!(?other, "handshake frame after authentication"),
    }
}

fn closure_from_frame(frame: Option<&CloseFrame>) -> Closure {
    match frame {
        Some(frame) if frame.code == CloseCode::Normal => Closure::Clean,
        Some(frame) => Closure::Unclean(HAError::transport(format!(
            "socket closed with status {}: {}",
            u16::from(frame.code),
            frame.reason.as_str()
        ))),
        None => Closure::Unclean(HAError::transport("socket closed without status")),
    }
}

/// Settle the end of a socket phase and decide whether to retry.
fn on_closed(inner: &Arc<Inner>, generation: u64, closure: Closure) {
    let clean = matches!(closure, Closure::Clean);
    let failure = match closure {
        Closure::AuthRejected(message) => HAError::AuthInvalid { message },
        Closure::Clean => HAError::transport("socket closed before authentication"),
        Closure::Unclean(err) => err,
    };

    let mut events = Vec::new();
    let waiters = {
        let mut session = inner.session.lock();
        if session.generation != generation {
            return;
        }
        session.outbound = None;
        session.socket_task = None;
        let waiters = std::mem::take(&mut session.waiters);

        if clean {
            info!("Socket closed cleanly by server");
            session.state = ConnectionState::ClosedClean;
            events.push(LifecycleEvent::Disconnected { clean: true });
        } else if failure.is_retryable() {
            warn!("Socket closed uncleanly: {failure}");
            session.state = ConnectionState::ClosedUnclean;
            events.push(LifecycleEvent::Disconnected { clean: false });
            events.push(schedule_reconnect(inner, &mut session));
        } else {
            error!("{failure}");
            session.state = ConnectionState::AuthRejected;
            let message = match &failure {
                HAError::AuthInvalid { message } => message.clone(),
                other => other.to_string(),
            };
            events.push(LifecycleEvent::AuthRejected { message });
        }
        waiters
    };

    for waiter in waiters {
        let _ = waiter.send(Err(failure.clone()));
    }

    inner.teardown_tables();
    for event in events {
        inner.emit(event);
    }
}

/// Arm the retry timer, or give up once the cap is reached.
fn schedule_reconnect(inner: &Arc<Inner>, session: &mut Session) -> LifecycleEvent {
    let Some(delay) = inner.config.reconnect.delay_for(session.attempts) else {
        warn!(
            "Giving up after {} reconnection attempt(s)",
            session.attempts
        );
        session.state = ConnectionState::ReconnectExhausted;
        return LifecycleEvent::ReconnectExhausted;
    };

    session.attempts += 1;
    session.state = ConnectionState::Reconnecting;
    let attempt = session.attempts;
    let generation = session.generation;
    info!(
        "Reconnecting in {}ms (attempt {attempt}/{})",
        delay.as_millis(),
        inner.config.reconnect.max_attempts
    );

    let weak = Arc::downgrade(inner);
    session.reconnect_timer = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(inner) = weak.upgrade() else { return };
        let mut session = inner.session.lock();
        if session.generation == generation && session.state == ConnectionState::Reconnecting {
            session.reconnect_timer = None;
            start_socket(&inner, &mut session);
        }
    }));

    LifecycleEvent::ReconnectScheduled { attempt, delay }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_close_is_clean() {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Utf8Bytes::from_static(""),
        };
        assert!(matches!(closure_from_frame(Some(&frame)), Closure::Clean));
    }

    #[test]
    fn other_closes_are_unclean() {
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: Utf8Bytes::from_static("restart"),
        };
        assert!(matches!(closure_from_frame(Some(&frame)), Closure::Unclean(_)));
        assert!(matches!(closure_from_frame(None), Closure::Unclean(_)));
    }

    #[tokio::test]
    async fn send_before_connect_is_rejected_locally() {
        let conn = Connection::new(ConnectionConfig::new("http://127.0.0.1:9", "t"));
        let err = conn.send(Commands::GET_STATES, None).await.unwrap_err();
        assert!(matches!(err, HAError::NotConnected));
        assert_eq!(conn.pending_requests(), 0);
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn subscribe_before_connect_is_deferred() {
        let conn = Connection::new(ConnectionConfig::new("http://127.0.0.1:9", "t"));
        let sub = conn.subscribe("state_changed", |_| {}).await.unwrap();
        assert_eq!(conn.subscriber_count("state_changed"), 1);
        assert!(sub.unsubscribe());
        assert_eq!(conn.subscriber_count("state_changed"), 0);
    }

    #[tokio::test]
    async fn disconnect_is_terminal_and_emits() {
        let conn = Connection::new(ConnectionConfig::new("http://127.0.0.1:9", "t"));
        let mut events = conn.lifecycle();
        conn.disconnect();
        assert_eq!(conn.state(), ConnectionState::ClosedClean);
        assert_eq!(
            events.recv().await.unwrap(),
            LifecycleEvent::Disconnected { clean: true }
        );
    }

    /// Hand the connection a fake writer so no socket is needed.
    fn authenticated(conn: &Connection) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = conn.inner.session.lock();
        session.state = ConnectionState::Authenticated;
        session.outbound = Some(tx);
        rx
    }

    #[tokio::test]
    async fn close_after_send_rejects_without_waiting_for_timeout() {
        let config = ConnectionConfig::new("http://127.0.0.1:9", "t")
            .with_request_timeout(std::time::Duration::from_secs(60));
        let conn = Connection::new(config);
        let mut written = authenticated(&conn);

        let sender = conn.clone();
        let request = tokio::spawn(async move { sender.send(Commands::GET_STATES, None).await });
        assert!(matches!(written.recv().await, Some(Message::Text(_))));
        assert_eq!(conn.pending_requests(), 1);

        conn.disconnect();
        let err = tokio::time::timeout(std::time::Duration::from_secs(1), request)
            .await
            .expect("request should settle on close")
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), hearth_protocol::ErrorKind::TransportError);
        assert_eq!(conn.pending_requests(), 0);
    }

    #[tokio::test]
    async fn non_retryable_failure_does_not_schedule_reconnect() {
        let conn = Connection::new(ConnectionConfig::new("http://127.0.0.1:9", "t"));
        let _written = authenticated(&conn);
        let mut events = conn.lifecycle();

        on_closed(
            &conn.inner,
            0,
            Closure::Unclean(HAError::AuthInvalid {
                message: "token revoked".into(),
            }),
        );

        assert_eq!(conn.state(), ConnectionState::AuthRejected);
        assert_eq!(conn.reconnect_attempts(), 0);
        assert_eq!(
            events.recv().await.unwrap(),
            LifecycleEvent::AuthRejected {
                message: "token revoked".into()
            }
        );
        assert!(events.try_recv().is_err());
    }
}
