//! Domain updates applied to the [`ReactiveStore`].
//!
//! Every function replaces whole collections so existing snapshots stay
//! valid. Unknown slot ids and record keys are ignored.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Local, Utc};
use parkdash_core::protocol::slots::PLACEHOLDER;
use parkdash_core::protocol::{WireRecord, WireSlot};
use parkdash_core::{
    slot_label, ActionType, ProcessStatus, RecordKey, SlotData, SlotState, TxRecord,
};

use crate::store::{ReactiveStore, StatePatch};

/// Input for [`add_record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub uid: u32,
    pub action: ActionType,
    pub sid: u8,
    pub status: Option<ProcessStatus>,
    /// Caller-chosen key, e.g. the id of the command that started the task.
    pub key: Option<RecordKey>,
}

impl NewRecord {
    pub fn new(uid: u32, action: ActionType, sid: u8) -> Self {
        Self {
            uid,
            action,
            sid,
            status: None,
            key: None,
        }
    }

    pub fn with_status(mut self, status: ProcessStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_key(mut self, key: impl Into<RecordKey>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl From<&WireRecord> for NewRecord {
    fn from(rec: &WireRecord) -> Self {
        NewRecord::new(rec.uid, rec.act, rec.sid).with_status(rec.st)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub status: Option<ProcessStatus>,
    pub progress: Option<u8>,
}

impl RecordPatch {
    pub fn status(status: ProcessStatus) -> Self {
        Self {
            status: Some(status),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    fn apply(&self, record: &mut TxRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(progress) = self.progress {
            record.progress = Some(progress);
        }
    }
}

/// Returns `false` for an unknown slot id.
pub fn update_slot(store: &ReactiveStore, sid: u8, state: SlotState, uid: Option<u32>) -> bool {
    let mut found = false;
    store.update(|current| {
        if !current.slots.contains_key(&sid) {
            return StatePatch::default();
        }
        found = true;
        let mut slots = current.slots.as_ref().clone();
        slots.insert(sid, SlotData::new(sid, state, uid));
        StatePatch::slots(slots)
    });
    found
}

pub fn set_all_slots(store: &ReactiveStore, list: &[WireSlot]) {
    store.update(|current| {
        let mut slots = current.slots.as_ref().clone();
        for item in list {
            match slots.get_mut(&item.sid) {
                Some(slot) => *slot = SlotData::new(item.sid, item.st, item.uid),
                None => tracing::debug!(sid = item.sid, "ignoring unknown slot"),
            }
        }
        StatePatch::slots(slots)
    });
}

/// Prepends a record and returns its key. A record already stored under the
/// same key is replaced.
pub fn add_record(store: &ReactiveStore, data: NewRecord) -> RecordKey {
    let key = data.key.unwrap_or_else(next_record_key);
    let record = TxRecord {
        id: key.clone(),
        timestamp: Local::now().format("%H:%M:%S").to_string(),
        uid: data.uid,
        action: data.action,
        sid: data.sid,
        slot: slot_label(data.sid).unwrap_or(PLACEHOLDER).to_string(),
        status: data.status.unwrap_or(ProcessStatus::Pending),
        progress: None,
    };
    store.update(|current| {
        let mut history = Vec::with_capacity(current.history.len() + 1);
        history.push(record);
        for r in current.history.iter() {
            if r.id == key {
                tracing::debug!(%key, "replacing record with duplicate key");
            } else {
                history.push(r.clone());
            }
        }
        StatePatch::history(history)
    });
    key
}

/// Returns `false` when no record has `key`.
pub fn update_record(store: &ReactiveStore, key: &str, patch: RecordPatch) -> bool {
    let mut found = false;
    store.update(|current| {
        if !current.history.iter().any(|r| r.id == key) {
            return StatePatch::default();
        }
        found = true;
        let history = current
            .history
            .iter()
            .map(|r| {
                let mut r = r.clone();
                if r.id == key {
                    patch.apply(&mut r);
                }
                r
            })
            .collect();
        StatePatch::history(history)
    });
    found
}

/// Current status of the record under `key`.
pub fn record_status(store: &ReactiveStore, key: &str) -> Option<ProcessStatus> {
    store.history().iter().find(|r| r.id == key).map(|r| r.status)
}

fn next_record_key() -> RecordKey {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{}-{seq}", Utc::now().timestamp_millis())
}
