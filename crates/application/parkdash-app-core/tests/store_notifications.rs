use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use parkdash_app_core::reducer::{add_record, update_slot, NewRecord};
use parkdash_app_core::{ReactiveStore, StateKey, StatePatch, StateValue};
use parkdash_core::{ActionType, Filters, SlotData, SlotState};
use parkdash_persistence::{MemorySnapshotStore, Snapshot, SnapshotStore, StorageError};

fn count(store: &ReactiveStore, key: StateKey) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let _sub = store.subscribe(key, move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    hits
}

#[test]
fn set_notifies_only_changed_fields() {
    let store = ReactiveStore::new();
    let slots_hits = count(&store, StateKey::Slots);
    let history_hits = count(&store, StateKey::History);
    let filter_hits = count(&store, StateKey::Filters);
    let slots_before = store.slots();

    add_record(&store, NewRecord::new(1, ActionType::In, 1));

    assert_eq!(history_hits.load(Ordering::SeqCst), 1);
    assert_eq!(slots_hits.load(Ordering::SeqCst), 0);
    assert_eq!(filter_hits.load(Ordering::SeqCst), 0);
    assert!(Arc::ptr_eq(&slots_before, &store.slots()));
}

#[test]
fn earlier_snapshots_never_change() {
    let store = ReactiveStore::new();
    let before = store.get();
    update_slot(&store, 3, SlotState::Occupied, Some(77));

    assert_eq!(before.slots[&3].state, SlotState::Empty);
    assert_eq!(store.slots()[&3].uid, Some(77));
    assert!(!Arc::ptr_eq(&before.slots, &store.slots()));
}

#[test]
fn subscribers_receive_new_value_and_can_leave() {
    let store = ReactiveStore::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let sub = store.subscribe(StateKey::Filters, move |value| {
        if let StateValue::Filters(f) = value {
            s.lock().unwrap().push(*f);
        }
    });

    let selected = Filters::default().toggle_slot(4);
    store.set(StatePatch::filters(selected));
    sub.unsubscribe();
    store.set(StatePatch::filters(Filters::cleared()));

    assert_eq!(*seen.lock().unwrap(), vec![selected]);
    assert_eq!(store.get_field(StateKey::Filters), StateValue::Filters(Filters::cleared()));
}

#[test]
fn restore_merges_snapshot_and_hydrate_replays_it() {
    let snapshot = Snapshot {
        slots: vec![
            (2, SlotData::new(2, SlotState::Occupied, Some(9))),
            (40, SlotData::new(40, SlotState::Occupied, Some(1))),
        ],
        history: Vec::new(),
        filters: Filters::default().toggle_status(SlotState::Occupied),
    };
    let backing = Arc::new(MemorySnapshotStore::with_snapshot(snapshot));

    let store = ReactiveStore::restore(backing.clone());
    let state = store.get();
    assert_eq!(state.slots.len(), 9, "unknown sids are not merged");
    assert_eq!(state.slots[&2].uid, Some(9));
    assert_eq!(state.filters.status, Some(SlotState::Occupied));

    let hits = Arc::new(AtomicUsize::new(0));
    for key in StateKey::ALL {
        let h = hits.clone();
        let _ = store.subscribe(key, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
    }
    store.hydrate();
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    add_record(&store, NewRecord::new(5, ActionType::Out, 2));
    store.flush();
    let saved = backing.load().unwrap().unwrap();
    assert_eq!(saved.history.len(), 1);
    assert_eq!(saved.slots.len(), 9);
}

struct BrokenStore;

impl SnapshotStore for BrokenStore {
    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        Err(StorageError::Corrupt)
    }
    fn save(&self, _snapshot: &Snapshot) -> Result<(), StorageError> {
        Err(StorageError::DatabaseAlreadyOpen)
    }
    fn clear(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[test]
fn persistence_failures_are_swallowed() {
    let store = ReactiveStore::restore(Arc::new(BrokenStore));
    assert!(store.history().is_empty());
    let hits = count(&store, StateKey::History);
    add_record(&store, NewRecord::new(1, ActionType::In, 1));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(store.history().len(), 1);
}

#[derive(Default)]
struct CountingStore {
    inner: MemorySnapshotStore,
    saves: AtomicUsize,
}

impl SnapshotStore for CountingStore {
    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        self.inner.load()
    }
    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(snapshot)
    }
    fn clear(&self) -> Result<(), StorageError> {
        self.inner.clear()
    }
}

#[tokio::test]
async fn saves_inside_a_runtime_run_off_thread_and_keep_the_latest() {
    let backing = Arc::new(CountingStore::default());
    let store = ReactiveStore::restore(backing.clone());
    for id in 1..=50 {
        add_record(&store, NewRecord::new(id, ActionType::In, 1));
    }
    assert_eq!(store.history().len(), 50, "updates never wait on the write");

    store.flush();
    let saved = backing.load().unwrap().unwrap();
    assert_eq!(saved.history.len(), 50);
    assert_eq!(saved.history, *store.history());
    let saves = backing.saves.load(Ordering::SeqCst);
    assert!((1..=50).contains(&saves), "saves: {saves}");
}
