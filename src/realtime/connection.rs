//! Persistent Connection Manager
//!
//! Owns the single WebSocket connection to the push endpoint and keeps it
//! alive: after a close or error exactly one reconnect is scheduled, using
//! the configured [`ReconnectPolicy`].
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected -> (delay) -> Connecting ...
//! ```

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::bus::EventBus;
use super::messages::InboundEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where the connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// When to retry after the connection drops
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub delay: Duration,
    /// Give up after this many consecutive failures (`None` = never)
    pub max_attempts: Option<u32>,
    /// Growth of the delay per consecutive failure (1.0 = fixed)
    pub backoff_factor: f64,
    /// Upper bound for a grown delay
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(3000))
    }
}

impl ReconnectPolicy {
    /// Same delay forever
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            backoff_factor: 1.0,
            max_delay: delay,
        }
    }

    /// Delay before retry number `attempt` (1-based), or `None` to give up
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }

        let factor = self.backoff_factor.max(1.0);
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.delay.as_secs_f64() * factor.powi(exponent);
        let ceiling = self.max_delay.max(self.delay).as_secs_f64();
        Some(Duration::from_secs_f64(scaled.min(ceiling)))
    }
}

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Push endpoint (e.g., "ws://localhost:8000/ws")
    pub url: String,
    pub reconnect: ReconnectPolicy,
    /// Give up on a single connection attempt after this long
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".to_string(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Keeps one live connection and feeds decoded events to the bus
pub struct ConnectionManager {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<Supervisor>>,
}

struct Supervisor {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

struct Shared {
    config: ConnectionConfig,
    bus: Arc<EventBus>,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    opened: AtomicU64,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, bus: Arc<EventBus>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                bus,
                state,
                outbound: Mutex::new(None),
                opened: AtomicU64::new(0),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Start maintaining the connection. No-op while already running.
    pub fn connect(&self) {
        let Ok(mut supervisor) = self.supervisor.lock() else {
            return;
        };

        if let Some(running) = supervisor.as_ref() {
            if !running.handle.is_finished() {
                tracing::debug!("Connection already active");
                return;
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            shared.run(shutdown_rx).await;
        });

        *supervisor = Some(Supervisor { handle, shutdown });
    }

    /// Cancel any pending reconnect and close the socket. Safe to call when
    /// never connected.
    pub async fn disconnect(&self) {
        let supervisor = self.supervisor.lock().ok().and_then(|mut s| s.take());

        if let Some(Supervisor { mut handle, shutdown }) = supervisor {
            let _ = shutdown.send(true);
            if tokio::time::timeout(Duration::from_secs(2), &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Connection task did not stop in time, aborting");
                handle.abort();
            }
        }

        self.shared.mark_disconnected();
    }

    /// Fire-and-forget text send. Dropped silently unless connected.
    pub fn send(&self, text: impl Into<String>) -> bool {
        if self.state() != ConnectionState::Connected {
            tracing::debug!("Not connected, dropping outbound message");
            return false;
        }

        let outbound = self.shared.outbound.lock().ok().and_then(|o| o.clone());
        match outbound {
            Some(tx) => tx.send(Message::Text(text.into())).is_ok(),
            None => false,
        }
    }

    /// Serialize and send as JSON
    pub fn send_json<T: Serialize>(&self, message: &T) -> bool {
        match serde_json::to_string(message) {
            Ok(text) => self.send(text),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize outbound message");
                false
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Whether a connection task is alive (connected or waiting to retry)
    pub fn is_running(&self) -> bool {
        self.supervisor
            .lock()
            .map(|s| s.as_ref().map_or(false, |s| !s.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Count of successful opens since construction
    pub fn successful_connects(&self) -> u64 {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Ok(supervisor) = self.supervisor.get_mut() {
            if let Some(supervisor) = supervisor.take() {
                supervisor.handle.abort();
            }
        }
    }
}

impl Shared {
    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut failures: u32 = 0;

        loop {
            self.state.send_replace(ConnectionState::Connecting);
            tracing::debug!(url = %self.config.url, "Connecting");

            let attempt = tokio::select! {
                _ = shutdown.changed() => break,
                result = tokio::time::timeout(self.config.connect_timeout, connect_async(self.config.url.as_str())) => result,
            };

            match attempt {
                Ok(Ok((stream, _))) => {
                    failures = 0;
                    let (tx, rx) = mpsc::unbounded_channel();
                    if let Ok(mut outbound) = self.outbound.lock() {
                        *outbound = Some(tx);
                    }
                    self.opened.fetch_add(1, Ordering::SeqCst);
                    self.bus.set_connected(true);
                    self.state.send_replace(ConnectionState::Connected);
                    tracing::info!(url = %self.config.url, "WebSocket connected");

                    let closed_locally = self.pump(stream, rx, &mut shutdown).await;
                    self.mark_disconnected();
                    if closed_locally {
                        break;
                    }
                    tracing::info!("WebSocket disconnected");
                }
                Ok(Err(e)) => {
                    self.mark_disconnected();
                    tracing::warn!(error = %e, "WebSocket connection failed");
                }
                Err(_) => {
                    self.mark_disconnected();
                    tracing::warn!(
                        timeout_ms = self.config.connect_timeout.as_millis() as u64,
                        "WebSocket connection timed out"
                    );
                }
            }

            failures = failures.saturating_add(1);
            let Some(delay) = self.config.reconnect.next_delay(failures) else {
                tracing::error!(attempts = failures, "Max reconnect attempts reached");
                break;
            };

            tracing::info!(
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.mark_disconnected();
    }

    /// Move frames until the connection ends. Returns true when it ended
    /// because of a local shutdown.
    async fn pump(
        &self,
        stream: WsStream,
        mut rx: mpsc::UnboundedReceiver<Message>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let (mut sink, mut source) = stream.split();

        let closed_locally = loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break true;
                }
                Some(message) = rx.recv() => {
                    if let Err(e) = sink.send(message).await {
                        tracing::warn!(error = %e, "WebSocket send failed");
                        break false;
                    }
                }
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.dispatch(text),
                        Err(_) => tracing::warn!("Dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "Server closed connection");
                        break false;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket error");
                        break false;
                    }
                    None => break false,
                },
            }
        };

        if let Ok(mut outbound) = self.outbound.lock() {
            *outbound = None;
        }
        closed_locally
    }

    fn dispatch(&self, text: &str) {
        match InboundEvent::decode(text) {
            Ok(event) => {
                if let InboundEvent::Connected(welcome) = &event {
                    tracing::info!(
                        client_id = welcome.client_id.as_deref().unwrap_or("-"),
                        "Push channel ready"
                    );
                }
                self.bus.publish(event);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed WebSocket message");
            }
        }
    }

    fn mark_disconnected(&self) {
        if let Ok(mut outbound) = self.outbound.lock() {
            *outbound = None;
        }
        self.state.send_replace(ConnectionState::Disconnected);
        self.bus.set_connected(false);
    }
}
