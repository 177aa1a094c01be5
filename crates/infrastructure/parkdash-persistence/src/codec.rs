use crate::api::Snapshot;
use crate::StorageError;

pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(snapshot)?)
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}
