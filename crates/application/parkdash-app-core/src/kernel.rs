use std::sync::{Arc, Mutex};
use std::time::Duration;

use parkdash_config::{PROGRESS_CATCH_UP_MS, SUCCESS_SETTLE_MS};
use parkdash_core::protocol::{Channel, CommandType, Message, ProtocolCodec};
use parkdash_core::{ActionType, Filters, ProcessStatus, SlotState};

use crate::actions::{ActionReceipt, ActionService};
use crate::bus::{BusEvent, EventBus, Handler};
use crate::connection::{AckPolicy, ConnectionManager, ConnectionState, SendOutcome, SyncCursor};
use crate::ports::{ActionPort, Connector, RenderSurface};
use crate::reducer::{self, NewRecord, RecordPatch};
use crate::renderer::ReconciliationRenderer;
use crate::store::{ReactiveStore, StateKey, StatePatch, StateValue, Subscription};
use crate::viewmodel::{slot_tiles, StatusBarVm};

/// Wires the connection, bus, store and renderer into a running dashboard.
pub struct Dashboard {
    store: ReactiveStore,
    bus: Arc<EventBus>,
    renderer: Arc<ReconciliationRenderer>,
    surface: Arc<dyn RenderSurface>,
    connection: ConnectionManager,
    actions: Option<ActionService>,
    subscriptions: Mutex<Vec<Subscription>>,
    handlers: Mutex<Vec<(Channel, Handler)>>,
}

impl Dashboard {
    pub fn new(
        store: ReactiveStore,
        connector: Arc<dyn Connector>,
        surface: Arc<dyn RenderSurface>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        // Tracked commands are keyed by id; keep clear of keys restored from
        // an earlier session.
        let codec = ProtocolCodec::new();
        if let Some(last) = store
            .history()
            .iter()
            .filter_map(|r| r.id.parse::<u32>().ok())
            .max()
        {
            codec.advance_past(last);
        }
        let connection = ConnectionManager::new(
            connector,
            bus.clone(),
            Arc::new(codec),
            Arc::new(SyncCursor::new()),
        );
        Self {
            renderer: Arc::new(ReconciliationRenderer::new(surface.clone())),
            store,
            bus,
            surface,
            connection,
            actions: None,
            subscriptions: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_actions(mut self, port: Arc<dyn ActionPort>) -> Self {
        self.actions = Some(ActionService::new(self.store.clone(), port));
        self
    }

    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        self.connection = self.connection.with_ack_policy(policy);
        self
    }

    pub fn with_backoff(mut self, floor: Duration, ceiling: Duration) -> Self {
        self.connection = self.connection.with_backoff(floor, ceiling);
        self
    }

    pub fn store(&self) -> &ReactiveStore {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn renderer(&self) -> &Arc<ReconciliationRenderer> {
        &self.renderer
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Mounts the views, wires the bus and starts connecting.
    pub fn start(&self, endpoint: Option<String>) {
        self.mount();
        self.wire();
        self.connection.connect(endpoint);
    }

    /// Subscribes the views to the store and paints the current state once.
    pub fn mount(&self) {
        let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        if !subs.is_empty() {
            return;
        }

        let renderer = self.renderer.clone();
        let store = self.store.clone();
        subs.push(self.store.subscribe(StateKey::History, move |value| {
            if let StateValue::History(history) = value {
                renderer.render(history, &store.filters());
            }
        }));

        let surface = self.surface.clone();
        let store = self.store.clone();
        subs.push(self.store.subscribe(StateKey::Slots, move |value| {
            if let StateValue::Slots(slots) = value {
                let filters = store.filters();
                surface.slots(&slot_tiles(slots, &filters));
                surface.status_bar(&StatusBarVm::new(slots, &filters));
            }
        }));

        let renderer = self.renderer.clone();
        let surface = self.surface.clone();
        let store = self.store.clone();
        subs.push(self.store.subscribe(StateKey::Filters, move |value| {
            if let StateValue::Filters(filters) = value {
                let state = store.get();
                renderer.render(&state.history, filters);
                surface.slots(&slot_tiles(&state.slots, filters));
                surface.status_bar(&StatusBarVm::new(&state.slots, filters));
            }
        }));
        drop(subs);

        self.store.hydrate();
    }

    /// Registers the domain reactions on the bus.
    pub fn wire(&self) {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        if !handlers.is_empty() {
            return;
        }

        let store = self.store.clone();
        handlers.push((
            Channel::FilterChange,
            Handler::sync(move |ev| {
                if let BusEvent::Filters(filters) = ev {
                    store.set(StatePatch::filters(*filters));
                }
                Ok(())
            }),
        ));

        let store = self.store.clone();
        handlers.push((
            Channel::SlotStatus,
            Handler::sync(move |ev| {
                if let Some(Message::SlotStatus(msg)) = ev.message() {
                    reducer::set_all_slots(&store, &msg.slots);
                }
                Ok(())
            }),
        ));

        let store = self.store.clone();
        let cursor = self.connection.cursor().clone();
        handlers.push((
            Channel::History,
            Handler::sync(move |ev| {
                if let Some(msg) = ev.message() {
                    for rec in msg.records() {
                        reducer::add_record(&store, rec.into());
                        cursor.advance_ts(rec.ts);
                    }
                }
                Ok(())
            }),
        ));

        let store = self.store.clone();
        let cursor = self.connection.cursor().clone();
        handlers.push((
            Channel::SyncResponse,
            Handler::sync(move |ev| {
                if let Some(Message::SyncResponse(msg)) = ev.message() {
                    if let Some(updates) = &msg.updates {
                        if !updates.slots.is_empty() {
                            reducer::set_all_slots(&store, &updates.slots);
                        }
                        for rec in &updates.recs {
                            reducer::add_record(&store, rec.into());
                            cursor.advance_ts(rec.ts);
                        }
                    }
                    cursor.set_version(msg.cv);
                }
                Ok(())
            }),
        ));

        let store = self.store.clone();
        let renderer = self.renderer.clone();
        handlers.push((
            Channel::Progress,
            Handler::sync(move |ev| {
                let Some(Message::Progress(msg)) = ev.message() else {
                    return Ok(());
                };
                let key = msg.rid.to_string();
                let mut patch = RecordPatch::default().with_progress(msg.p);
                if reducer::record_status(&store, &key) == Some(ProcessStatus::Pending) {
                    patch.status = Some(ProcessStatus::Processing);
                }
                reducer::update_record(&store, &key, patch);
                // Runs on its own; nothing waits for the catch-up here.
                drop(renderer.animate_progress(
                    &key,
                    f64::from(msg.p),
                    Duration::from_millis(PROGRESS_CATCH_UP_MS),
                ));
                Ok(())
            }),
        ));

        let store = self.store.clone();
        let renderer = self.renderer.clone();
        handlers.push((
            Channel::Ack,
            Handler::from_async(move |ev| {
                let store = store.clone();
                let renderer = renderer.clone();
                async move {
                    let Some(Message::Ack(msg)) = ev.message() else {
                        return Ok(());
                    };
                    let key = msg.rid.to_string();
                    match msg.st {
                        ProcessStatus::Success => {
                            renderer
                                .animate_progress(
                                    &key,
                                    100.0,
                                    Duration::from_millis(PROGRESS_CATCH_UP_MS),
                                )
                                .await;
                            tokio::time::sleep(Duration::from_millis(SUCCESS_SETTLE_MS)).await;
                            reducer::update_record(
                                &store,
                                &key,
                                RecordPatch::status(ProcessStatus::Success).with_progress(100),
                            );
                        }
                        ProcessStatus::Error => {
                            tracing::warn!(
                                rid = msg.rid,
                                code = ?msg.c,
                                "controller rejected task"
                            );
                            reducer::update_record(
                                &store,
                                &key,
                                RecordPatch::status(ProcessStatus::Error),
                            );
                        }
                        ProcessStatus::Pending | ProcessStatus::Processing => {}
                    }
                    Ok(())
                }
            }),
        ));

        handlers.push((
            Channel::Error,
            Handler::sync(|ev| {
                if let Some(Message::Error(msg)) = ev.message() {
                    tracing::error!(code = msg.c, "controller reported an error");
                }
                Ok(())
            }),
        ));

        for channel in [Channel::ConnectionOpened, Channel::ConnectionClosed] {
            let surface = self.surface.clone();
            handlers.push((
                channel,
                Handler::sync(move |ev| {
                    let state = match ev {
                        BusEvent::Opened => ConnectionState::Connected,
                        _ => ConnectionState::ReconnectWait,
                    };
                    surface.connection(state);
                    Ok(())
                }),
            ));
        }

        for (channel, handler) in handlers.iter() {
            self.bus.subscribe(*channel, handler.clone());
        }
    }

    /// Sends a command. When `tracked` is given, a pending record keyed by
    /// the command id is added so progress and acks for it land on that row.
    pub fn send_command(
        &self,
        cmd: CommandType,
        param: Option<u32>,
        tracked: Option<NewRecord>,
    ) -> (u32, SendOutcome) {
        let message = self.connection.codec().build_command(cmd, param);
        let id = message.id();
        let outcome = self.connection.send(&message);
        if let (SendOutcome::Sent, Some(record)) = (outcome, tracked) {
            reducer::add_record(&self.store, record.with_key(id.to_string()));
        }
        (id, outcome)
    }

    /// Optimistic action over REST. `None` when no action port is configured.
    pub async fn send_action(
        &self,
        uid: u32,
        action: ActionType,
        sid: u8,
    ) -> Option<ActionReceipt> {
        match &self.actions {
            Some(actions) => Some(actions.send_action(uid, action, sid).await),
            None => {
                tracing::warn!("no action endpoint configured");
                None
            }
        }
    }

    /// Filter changes travel over the bus like any other view event.
    pub fn set_filters(&self, filters: Filters) {
        self.bus.publish(Channel::FilterChange, BusEvent::Filters(filters));
    }

    pub fn toggle_slot_filter(&self, sid: u8) {
        self.set_filters(self.store.filters().toggle_slot(sid));
    }

    pub fn toggle_status_filter(&self, state: SlotState) {
        self.set_filters(self.store.filters().toggle_status(state));
    }

    /// Stops the connection, detaches every view and reaction, then writes
    /// the final state out.
    pub async fn shutdown(&self) {
        self.connection.shutdown().await;
        let handlers: Vec<_> = self
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for (channel, handler) in handlers {
            self.bus.unsubscribe(channel, &handler);
        }
        let subs: Vec<_> = self
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for sub in subs {
            sub.unsubscribe();
        }
        let store = self.store.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || store.flush()).await {
            tracing::debug!("final snapshot flush failed: {e}");
        }
    }
}
