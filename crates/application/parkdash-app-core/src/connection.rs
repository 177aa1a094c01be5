//! Reconnecting controller connection.
//!
//! One task owns the transport. It acknowledges and publishes every inbound
//! frame in delivery order, writes outbound frames queued by
//! [`ConnectionManager::send`] and reopens the connection with exponential
//! backoff after any close.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parkdash_core::protocol::{Channel, DecodeError, Message, ProtocolCodec};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusEvent, EventBus};
use crate::ports::{Connector, FrameSink, FrameStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectWait,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::ReconnectWait => "reconnecting",
        }
    }
}

/// Reconnect delay: starts at the floor, doubles after every failure and
/// stays at the ceiling once reached.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(parkdash_config::backoff_floor(), parkdash_config::backoff_ceiling())
    }
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Delay to wait now; the following call returns twice as much.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

/// Which undecodable frames still get acknowledged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckPolicy {
    /// Every frame with a readable envelope, including unknown types.
    #[default]
    AllParsed,
    /// Only frames that decoded into a known message.
    KnownOnly,
}

/// Position reported in the sync request sent after every open.
#[derive(Debug, Default)]
pub struct SyncCursor {
    last_ts: AtomicU64,
    last_version: AtomicU32,
}

impl SyncCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> (u64, u32) {
        (
            self.last_ts.load(Ordering::Acquire),
            self.last_version.load(Ordering::Acquire),
        )
    }

    /// Never moves backwards.
    pub fn advance_ts(&self, ts: u64) {
        self.last_ts.fetch_max(ts, Ordering::AcqRel);
    }

    pub fn set_version(&self, version: u32) {
        self.last_version.store(version, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Dropped,
}

struct Shared {
    connector: Arc<dyn Connector>,
    bus: Arc<EventBus>,
    codec: Arc<ProtocolCodec>,
    cursor: Arc<SyncCursor>,
    policy: AckPolicy,
    floor: Duration,
    ceiling: Duration,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    shutdown: CancellationToken,
}

pub struct ConnectionManager {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("policy", &self.shared.policy)
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        bus: Arc<EventBus>,
        codec: Arc<ProtocolCodec>,
        cursor: Arc<SyncCursor>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector,
                bus,
                codec,
                cursor,
                policy: AckPolicy::default(),
                floor: parkdash_config::backoff_floor(),
                ceiling: parkdash_config::backoff_ceiling(),
                state,
                outbound: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Only takes effect before [`connect`](Self::connect); later calls are
    /// logged and ignored.
    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.policy = policy,
            None => tracing::warn!(
                ?policy,
                current = ?self.shared.policy,
                "ack policy unchanged: connection already started"
            ),
        }
        self
    }

    /// Only takes effect before [`connect`](Self::connect); later calls are
    /// logged and ignored.
    pub fn with_backoff(mut self, floor: Duration, ceiling: Duration) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => {
                shared.floor = floor;
                shared.ceiling = ceiling;
            }
            None => tracing::warn!(
                floor_ms = floor.as_millis() as u64,
                ceiling_ms = ceiling.as_millis() as u64,
                "backoff unchanged: connection already started"
            ),
        }
        self
    }

    pub fn ack_policy(&self) -> AckPolicy {
        self.shared.policy
    }

    /// Floor and ceiling of the reconnect delay.
    pub fn backoff_bounds(&self) -> (Duration, Duration) {
        (self.shared.floor, self.shared.ceiling)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn codec(&self) -> &Arc<ProtocolCodec> {
        &self.shared.codec
    }

    pub fn cursor(&self) -> &Arc<SyncCursor> {
        &self.shared.cursor
    }

    /// Starts the connection loop. `None` derives the endpoint from the
    /// default host. A second call while the loop runs is ignored.
    pub fn connect(&self, endpoint: Option<String>) {
        let endpoint = endpoint
            .unwrap_or_else(|| parkdash_infra::derive_endpoint(parkdash_config::DEFAULT_HOST));
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            tracing::debug!("connect ignored: already running");
            return;
        }
        let shared = self.shared.clone();
        *task = Some(tokio::spawn(async move { shared.run(endpoint).await }));
    }

    /// Encodes and queues `message` when connected; otherwise drops it.
    pub fn send(&self, message: &Message) -> SendOutcome {
        if self.state() != ConnectionState::Connected {
            tracing::warn!(
                id = message.id(),
                kind = ?message.message_type(),
                "CommandDeliveryDropped: not connected"
            );
            return SendOutcome::Dropped;
        }
        let frame = match ProtocolCodec::encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(id = message.id(), "CommandDeliveryDropped: {e}");
                return SendOutcome::Dropped;
            }
        };
        let outbound = self.shared.outbound.lock().unwrap_or_else(|e| e.into_inner());
        match outbound.as_ref().map(|tx| tx.send(frame)) {
            Some(Ok(())) => SendOutcome::Sent,
            _ => {
                tracing::warn!(id = message.id(), "CommandDeliveryDropped: writer gone");
                SendOutcome::Dropped
            }
        }
    }

    /// Closes the connection and stops reconnecting.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("connection task failed: {e}");
            }
        }
    }
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::info!(from = prev.label(), to = next.label(), "connection state");
        }
    }

    async fn run(self: Arc<Self>, endpoint: String) {
        let mut backoff = Backoff::new(self.floor, self.ceiling);
        loop {
            self.set_state(ConnectionState::Connecting);
            let opened = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                opened = self.connector.open(&endpoint) => opened,
            };
            match opened {
                Ok((sink, stream)) => {
                    backoff.reset();
                    self.session(sink, stream).await;
                }
                Err(e) => tracing::warn!(%endpoint, "connect failed: {e:#}"),
            }
            if self.shutdown.is_cancelled() {
                break;
            }

            self.set_state(ConnectionState::ReconnectWait);
            self.bus.publish(Channel::ConnectionClosed, BusEvent::Closed);
            let delay = backoff.next_delay();
            tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn session(&self, mut sink: Box<dyn FrameSink>, mut stream: Box<dyn FrameStream>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.outbound.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        self.set_state(ConnectionState::Connected);
        self.bus.publish(Channel::ConnectionOpened, BusEvent::Opened);

        let (last_ts, last_version) = self.cursor.get();
        let sync = self.codec.build_sync_request(last_ts, last_version);
        let mut alive = self.write(sink.as_mut(), &sync).await;

        while alive {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(frame) = rx.recv() => {
                    if let Err(e) = sink.send(frame).await {
                        tracing::warn!("write failed: {e:#}");
                        alive = false;
                    }
                }
                incoming = stream.next() => match incoming {
                    None => {
                        tracing::info!("connection closed by peer");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!("transport error: {e:#}");
                        alive = false;
                    }
                    Some(Ok(raw)) => alive = self.handle_frame(sink.as_mut(), &raw).await,
                },
            }
        }

        *self.outbound.lock().unwrap_or_else(|e| e.into_inner()) = None;
        if let Err(e) = sink.close().await {
            tracing::debug!("close failed: {e:#}");
        }
    }

    /// Returns `false` when the connection is no longer writable.
    async fn handle_frame(&self, sink: &mut dyn FrameSink, raw: &str) -> bool {
        match ProtocolCodec::decode(raw) {
            Ok(message) => {
                let alive = self.ack(sink, message.id()).await;
                let channel = message.channel();
                self.bus.publish(channel, BusEvent::Message(Arc::new(message)));
                alive
            }
            Err(e) => {
                tracing::warn!("dropping frame: {e}");
                match (&e, self.policy) {
                    (DecodeError::Malformed(_), _) | (_, AckPolicy::KnownOnly) => true,
                    (_, AckPolicy::AllParsed) => match e.frame_id() {
                        Some(id) => self.ack(sink, id).await,
                        None => true,
                    },
                }
            }
        }
    }

    async fn ack(&self, sink: &mut dyn FrameSink, id: u32) -> bool {
        let ack = self.codec.build_ack(id);
        self.write(sink, &ack).await
    }

    async fn write(&self, sink: &mut dyn FrameSink, message: &Message) -> bool {
        let frame = match ProtocolCodec::encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("encode failed: {e}");
                return true;
            }
        };
        match sink.send(frame).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("write failed: {e:#}");
                false
            }
        }
    }
}
