use std::sync::Mutex;

use crate::api::{Snapshot, SnapshotStore};
use crate::StorageError;

/// Keeps the snapshot in process memory. Used when no data directory is
/// available and in tests.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot)),
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        let guard = self.slot.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let mut guard = self.slot.lock().map_err(|_| StorageError::Poisoned)?;
        *guard = Some(snapshot.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self.slot.lock().map_err(|_| StorageError::Poisoned)?;
        *guard = None;
        Ok(())
    }
}
