use parkdash_core::{Filters, SlotData, TxRecord};
use serde::{Deserialize, Serialize};

pub const PARKDASH_REDB_FILENAME: &str = "parkdash.redb";
pub const CURRENT_SCHEMA: u32 = 1;

pub use parkdash_config::SNAPSHOT_KEY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbState {
    Missing,
    Valid,
    Busy,
    Corrupt,
    NewerSchema { found: u32, supported: u32 },
}

/// Durable copy of the dashboard state.
///
/// Slots are kept as `[sid, slot]` pairs so the document reads the same as
/// the map it was taken from. Missing fields fall back to empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub slots: Vec<(u8, SlotData)>,
    pub history: Vec<TxRecord>,
    pub filters: Filters,
}

pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<Snapshot>, crate::StorageError>;
    fn save(&self, snapshot: &Snapshot) -> Result<(), crate::StorageError>;
    fn clear(&self) -> Result<(), crate::StorageError>;
}
