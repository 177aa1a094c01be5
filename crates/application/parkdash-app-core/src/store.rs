use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use parkdash_core::{slot_label, Filters, SlotData, TxRecord};
use parkdash_persistence::{Snapshot, SnapshotStore};

pub type SlotMap = BTreeMap<u8, SlotData>;

/// Dashboard state. Collections sit behind `Arc`s and are replaced, never
/// edited, so a clone is a consistent snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub slots: Arc<SlotMap>,
    pub history: Arc<Vec<TxRecord>>,
    pub filters: Filters,
}

impl Default for AppState {
    fn default() -> Self {
        let slots = parkdash_core::protocol::slots::slot_ids()
            .map(|sid| (sid, SlotData::empty(sid)))
            .collect();
        Self {
            slots: Arc::new(slots),
            history: Arc::new(Vec::new()),
            filters: Filters::default(),
        }
    }
}

impl AppState {
    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            slots: self.slots.iter().map(|(sid, s)| (*sid, *s)).collect(),
            history: self.history.as_ref().clone(),
            filters: self.filters,
        }
    }

    /// Layers a stored snapshot over the defaults. Unknown slot ids are ignored.
    fn merge_snapshot(&mut self, snapshot: Snapshot) {
        let mut slots = self.slots.as_ref().clone();
        for (sid, slot) in snapshot.slots {
            if slot_label(sid).is_some() && slots.contains_key(&sid) {
                slots.insert(sid, SlotData::new(sid, slot.state, slot.uid));
            }
        }
        self.slots = Arc::new(slots);
        self.history = Arc::new(snapshot.history);
        self.filters = snapshot.filters;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Slots,
    History,
    Filters,
}

impl StateKey {
    pub const ALL: [StateKey; 3] = [StateKey::Slots, StateKey::History, StateKey::Filters];
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Slots(Arc<SlotMap>),
    History(Arc<Vec<TxRecord>>),
    Filters(Filters),
}

/// Fields to replace. `None` leaves a field and its subscribers alone.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub slots: Option<Arc<SlotMap>>,
    pub history: Option<Arc<Vec<TxRecord>>>,
    pub filters: Option<Filters>,
}

impl StatePatch {
    pub fn slots(slots: SlotMap) -> Self {
        Self {
            slots: Some(Arc::new(slots)),
            ..Self::default()
        }
    }

    pub fn history(history: Vec<TxRecord>) -> Self {
        Self {
            history: Some(Arc::new(history)),
            ..Self::default()
        }
    }

    pub fn filters(filters: Filters) -> Self {
        Self {
            filters: Some(filters),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_none() && self.history.is_none() && self.filters.is_none()
    }
}

type Listener = Arc<dyn Fn(&StateValue) + Send + Sync>;

/// Writes snapshots on the blocking pool. Only the newest pending snapshot
/// is kept, so a burst of updates costs one write once the previous one ends.
struct SnapshotWriter {
    store: Arc<dyn SnapshotStore>,
    pending: Mutex<Option<Snapshot>>,
    running: AtomicBool,
    io: Mutex<()>,
}

impl SnapshotWriter {
    fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            pending: Mutex::new(None),
            running: AtomicBool::new(false),
            io: Mutex::new(()),
        }
    }

    fn submit(self: &Arc<Self>, snapshot: Snapshot) {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot);
        if tokio::runtime::Handle::try_current().is_err() {
            self.drain();
            return;
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let writer = self.clone();
        tokio::task::spawn_blocking(move || loop {
            writer.drain();
            writer.running.store(false, Ordering::Release);
            // A submit that raced the store above may have found `running` set.
            if !writer.has_pending() || writer.running.swap(true, Ordering::AcqRel) {
                break;
            }
        });
    }

    fn has_pending(&self) -> bool {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Writes whatever is pending. Taking under `io` keeps writes in order.
    fn drain(&self) {
        let _io = self.io.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let next = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take();
            let Some(snapshot) = next else {
                return;
            };
            if let Err(e) = self.store.save(&snapshot) {
                tracing::debug!("snapshot save skipped: {e}");
            }
        }
    }
}

struct StoreInner {
    state: Mutex<AppState>,
    listeners: Mutex<HashMap<StateKey, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
    writer: Option<Arc<SnapshotWriter>>,
}

/// Key-addressed state with per-key change notification.
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct ReactiveStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for ReactiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveStore")
            .field("state", &self.get())
            .field("persistent", &self.inner.writer.is_some())
            .finish()
    }
}

impl Default for ReactiveStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactiveStore {
    pub fn new() -> Self {
        Self::with_state(AppState::default(), None)
    }

    pub fn with_state(state: AppState, persistence: Option<Arc<dyn SnapshotStore>>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(state),
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                writer: persistence.map(|store| Arc::new(SnapshotWriter::new(store))),
            }),
        }
    }

    /// Builds a store seeded from `persistence`. A missing or unreadable
    /// snapshot yields the default state.
    pub fn restore(persistence: Arc<dyn SnapshotStore>) -> Self {
        let mut state = AppState::default();
        match persistence.load() {
            Ok(Some(snapshot)) => {
                tracing::debug!(records = snapshot.history.len(), "restored snapshot");
                state.merge_snapshot(snapshot);
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("snapshot restore skipped: {e}"),
        }
        Self::with_state(state, Some(persistence))
    }

    pub fn get(&self) -> AppState {
        self.lock_state().clone()
    }

    pub fn slots(&self) -> Arc<SlotMap> {
        self.lock_state().slots.clone()
    }

    pub fn history(&self) -> Arc<Vec<TxRecord>> {
        self.lock_state().history.clone()
    }

    pub fn filters(&self) -> Filters {
        self.lock_state().filters
    }

    pub fn get_field(&self, key: StateKey) -> StateValue {
        let state = self.lock_state();
        Self::value_of(&state, key)
    }

    pub fn set(&self, patch: StatePatch) {
        self.update(|_| patch);
    }

    /// Computes a patch from the current state and applies it under one lock.
    pub fn update(&self, f: impl FnOnce(&AppState) -> StatePatch) {
        let (changed, snapshot) = {
            let mut state = self.lock_state();
            let patch = f(&state);
            if patch.is_empty() {
                return;
            }
            let mut changed = Vec::with_capacity(3);
            if let Some(slots) = patch.slots {
                state.slots = slots;
                changed.push((StateKey::Slots, StateValue::Slots(state.slots.clone())));
            }
            if let Some(history) = patch.history {
                state.history = history;
                changed.push((StateKey::History, StateValue::History(state.history.clone())));
            }
            if let Some(filters) = patch.filters {
                state.filters = filters;
                changed.push((StateKey::Filters, StateValue::Filters(filters)));
            }
            let snapshot = self.inner.writer.as_ref().map(|_| state.to_snapshot());
            (changed, snapshot)
        };

        if let (Some(writer), Some(snapshot)) = (&self.inner.writer, snapshot) {
            writer.submit(snapshot);
        }

        for (key, value) in changed {
            self.notify(key, &value);
        }
    }

    /// Blocks until the latest state has been handed to persistence.
    pub fn flush(&self) {
        if let Some(writer) = &self.inner.writer {
            writer.drain();
        }
    }

    pub fn subscribe<F>(&self, key: StateKey, f: F) -> Subscription
    where
        F: Fn(&StateValue) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key)
            .or_default()
            .push((id, Arc::new(f)));
        Subscription {
            store: Arc::downgrade(&self.inner),
            key,
            id,
        }
    }

    /// Re-sends every field to its subscribers, e.g. once views are mounted
    /// over a restored state.
    pub fn hydrate(&self) {
        let state = self.get();
        for key in StateKey::ALL {
            self.notify(key, &Self::value_of(&state, key));
        }
    }

    fn notify(&self, key: StateKey, value: &StateValue) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .map(|list| list.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();
        for f in listeners {
            f(value);
        }
    }

    fn value_of(state: &AppState, key: StateKey) -> StateValue {
        match key {
            StateKey::Slots => StateValue::Slots(state.slots.clone()),
            StateKey::History => StateValue::History(state.history.clone()),
            StateKey::Filters => StateValue::Filters(state.filters),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, AppState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle returned by [`ReactiveStore::subscribe`]. Dropping it keeps the
/// listener registered.
pub struct Subscription {
    store: Weak<StoreInner>,
    key: StateKey,
    id: u64,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl Subscription {
    pub fn key(&self) -> StateKey {
        self.key
    }

    pub fn unsubscribe(self) {
        let Some(inner) = self.store.upgrade() else {
            return;
        };
        let mut listeners = inner.listeners.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = listeners.get_mut(&self.key) {
            list.retain(|(id, _)| *id != self.id);
        }
    }
}
