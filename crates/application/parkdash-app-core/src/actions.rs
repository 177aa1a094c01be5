use std::sync::Arc;

use parkdash_core::{ActionType, ProcessStatus, RecordKey, SlotState};

use crate::ports::ActionPort;
use crate::reducer::{self, NewRecord, RecordPatch};
use crate::store::ReactiveStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReceipt {
    pub key: RecordKey,
    pub confirmed: bool,
}

/// Requests a vehicle move through the REST endpoint with an optimistic
/// local update.
///
/// The pending record and moving slot are visible before the request leaves.
/// On success the record settles and the slot takes its final state; on
/// failure the record is marked as an error and the slot is released.
#[derive(Clone)]
pub struct ActionService {
    store: ReactiveStore,
    port: Arc<dyn ActionPort>,
}

impl ActionService {
    pub fn new(store: ReactiveStore, port: Arc<dyn ActionPort>) -> Self {
        Self { store, port }
    }

    pub async fn send_action(&self, uid: u32, action: ActionType, sid: u8) -> ActionReceipt {
        let key = reducer::add_record(
            &self.store,
            NewRecord::new(uid, action, sid).with_status(ProcessStatus::Pending),
        );
        reducer::update_slot(&self.store, sid, SlotState::Moving, Some(uid));

        match self.port.post_action(uid, action, sid).await {
            Ok(()) => {
                let patch = RecordPatch::status(ProcessStatus::Success);
                reducer::update_record(&self.store, &key, patch);
                let (state, uid) = match action {
                    ActionType::In => (SlotState::Occupied, Some(uid)),
                    ActionType::Out => (SlotState::Empty, None),
                };
                reducer::update_slot(&self.store, sid, state, uid);
                ActionReceipt {
                    key,
                    confirmed: true,
                }
            }
            Err(e) => {
                tracing::error!(uid, sid, "action failed: {e:#}");
                let patch = RecordPatch::status(ProcessStatus::Error);
                reducer::update_record(&self.store, &key, patch);
                reducer::update_slot(&self.store, sid, SlotState::Empty, None);
                ActionReceipt {
                    key,
                    confirmed: false,
                }
            }
        }
    }
}
