#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use parkdash_app_core::{
    BusEvent, Connector, EventBus, FrameSink, FrameStream, Handler, ProgressStyle, RenderPlan,
    RenderSurface,
};
use parkdash_core::protocol::Channel;
use parkdash_core::RecordKey;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Test side of one accepted connection.
pub struct Peer {
    to_client: Option<mpsc::UnboundedSender<Result<String, String>>>,
    from_client: mpsc::UnboundedReceiver<String>,
    sink_closed: Arc<AtomicBool>,
}

impl Peer {
    pub fn send(&self, frame: &str) {
        if let Some(tx) = &self.to_client {
            tx.send(Ok(frame.to_string())).unwrap();
        }
    }

    /// Makes the client's read half report a transport error.
    pub fn fail(&self, reason: &str) {
        if let Some(tx) = &self.to_client {
            tx.send(Err(reason.to_string())).unwrap();
        }
    }

    pub async fn recv_json(&mut self) -> serde_json::Value {
        let raw = self.from_client.recv().await.expect("client hung up");
        serde_json::from_str(&raw).unwrap()
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Simulates the controller closing the socket.
    pub fn close(&mut self) {
        self.to_client = None;
    }

    /// Every later write from the client fails.
    pub fn stop_reading(&mut self) {
        self.from_client.close();
    }

    /// Whether the client closed its write half.
    pub fn sink_closed(&self) -> bool {
        self.sink_closed.load(Ordering::SeqCst)
    }
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: String) -> anyhow::Result<()> {
        self.tx.send(frame).map_err(|_| anyhow::anyhow!("peer gone"))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct ChannelStream(mpsc::UnboundedReceiver<Result<String, String>>);

#[async_trait::async_trait]
impl FrameStream for ChannelStream {
    async fn next(&mut self) -> Option<anyhow::Result<String>> {
        self.0.recv().await.map(|r| r.map_err(anyhow::Error::msg))
    }
}

enum Attempt {
    Refuse,
    Accept(ChannelSink, ChannelStream),
}

/// Connector that plays back queued outcomes; an empty queue refuses.
#[derive(Default)]
pub struct ScriptedConnector {
    attempts: Mutex<VecDeque<Attempt>>,
    opened_at: Mutex<Vec<Instant>>,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse(&self) {
        self.attempts.lock().unwrap().push_back(Attempt::Refuse);
    }

    pub fn accept(&self) -> Peer {
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let sink_closed = Arc::new(AtomicBool::new(false));
        self.attempts.lock().unwrap().push_back(Attempt::Accept(
            ChannelSink {
                tx: client_tx,
                closed: sink_closed.clone(),
            },
            ChannelStream(client_rx),
        ));
        Peer {
            to_client: Some(to_client),
            from_client,
            sink_closed,
        }
    }

    pub fn opened_at(&self) -> Vec<Instant> {
        self.opened_at.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    async fn open(
        &self,
        _endpoint: &str,
    ) -> anyhow::Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        self.opened_at.lock().unwrap().push(Instant::now());
        match self.attempts.lock().unwrap().pop_front() {
            Some(Attempt::Accept(sink, stream)) => Ok((Box::new(sink), Box::new(stream))),
            Some(Attempt::Refuse) | None => Err(anyhow::anyhow!("connection refused")),
        }
    }
}

/// Forwards every event published on `channels` into a channel.
pub fn tap(bus: &EventBus, channels: &[Channel]) -> mpsc::UnboundedReceiver<(Channel, BusEvent)> {
    let (tx, rx) = mpsc::unbounded_channel();
    for &channel in channels {
        let tx = tx.clone();
        bus.subscribe(
            channel,
            Handler::sync(move |ev| {
                let _ = tx.send((channel, ev.clone()));
                Ok(())
            }),
        );
    }
    rx
}

pub const ALL_CHANNELS: [Channel; 11] = [
    Channel::ConnectionOpened,
    Channel::ConnectionClosed,
    Channel::Ack,
    Channel::SyncRequest,
    Channel::SyncResponse,
    Channel::SlotStatus,
    Channel::History,
    Channel::Progress,
    Channel::Command,
    Channel::Error,
    Channel::FilterChange,
];

/// Surface that records what it was asked to draw.
#[derive(Default)]
pub struct RecordingSurface {
    pub plans: Mutex<Vec<RenderPlan>>,
    pub progress: Mutex<Vec<(RecordKey, ProgressStyle)>>,
}

impl RenderSurface for RecordingSurface {
    fn apply_history(&self, plan: &RenderPlan) {
        self.plans.lock().unwrap().push(plan.clone());
    }

    fn progress(&self, key: &RecordKey, style: &ProgressStyle) {
        self.progress.lock().unwrap().push((key.clone(), *style));
    }
}
