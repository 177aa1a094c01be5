use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use crate::api::{
    DbState, Snapshot, SnapshotStore, CURRENT_SCHEMA, PARKDASH_REDB_FILENAME, SNAPSHOT_KEY,
};
use crate::codec::{decode_snapshot, encode_snapshot};
use crate::maintenance::quarantine_corrupt_file;
use crate::StorageError;

const META: TableDefinition<&str, &str> = TableDefinition::new("meta");
const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");

const META_FORMAT_KEY: &str = "format";
const META_FORMAT_VALUE: &str = "parkdash-redb";
const META_SCHEMA_VERSION: &str = "schema_version";
const META_CREATED_AT: &str = "created_at";
const META_LAST_SAVED_AT: &str = "last_saved_at";

/// Snapshot store backed by a single redb file.
///
/// The database is opened lazily on first use and kept open for the life of
/// the store. A file that fails to open as redb is renamed aside and a fresh
/// one is created on the next save.
#[derive(Debug)]
pub struct RedbSnapshotStore {
    path: Utf8PathBuf,
    db: Mutex<Option<Arc<Database>>>,
}

impl RedbSnapshotStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: Mutex::new(None),
        }
    }

    pub fn in_dir(dir: &Utf8Path) -> Self {
        Self::new(dir.join(PARKDASH_REDB_FILENAME))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn is_corrupt_open_error(err: &redb::DatabaseError) -> bool {
        match err {
            redb::DatabaseError::Storage(storage) => match storage {
                redb::StorageError::Corrupted(_) => true,
                redb::StorageError::Io(ioe) => matches!(
                    ioe.kind(),
                    std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof
                ),
                _ => false,
            },
            _ => false,
        }
    }

    /// Reports the health of the file without creating it.
    pub fn validate(&self) -> Result<DbState, StorageError> {
        if !self.path.exists() {
            return Ok(DbState::Missing);
        }
        if self.db.lock().map_err(|_| StorageError::Poisoned)?.is_some() {
            return Ok(DbState::Valid);
        }

        match Database::open(self.path.as_std_path()) {
            Ok(db) => match Self::ensure_schema(&db) {
                Ok(()) => Ok(DbState::Valid),
                Err(StorageError::NewerSchema { found, supported }) => {
                    Ok(DbState::NewerSchema { found, supported })
                }
                Err(StorageError::DatabaseAlreadyOpen) => Ok(DbState::Busy),
                Err(StorageError::Corrupt) => {
                    drop(db);
                    let _ = quarantine_corrupt_file(&self.path);
                    Ok(DbState::Corrupt)
                }
                Err(e) => Err(e),
            },
            Err(redb::DatabaseError::DatabaseAlreadyOpen) => Ok(DbState::Busy),
            Err(e) if Self::is_corrupt_open_error(&e) => {
                let _ = quarantine_corrupt_file(&self.path);
                Ok(DbState::Corrupt)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the open database, creating the file when `create` is set.
    fn database(&self, create: bool) -> Result<Option<Arc<Database>>, StorageError> {
        let mut slot = self.db.lock().map_err(|_| StorageError::Poisoned)?;
        if let Some(db) = slot.as_ref() {
            if self.path.exists() {
                return Ok(Some(db.clone()));
            }
            *slot = None;
        }

        let db = if self.path.exists() {
            match Database::open(self.path.as_std_path()) {
                Ok(db) => db,
                Err(e) if Self::is_corrupt_open_error(&e) => {
                    quarantine_corrupt_file(&self.path)?;
                    if !create {
                        return Ok(None);
                    }
                    Database::create(self.path.as_std_path())?
                }
                Err(e) => return Err(e.into()),
            }
        } else if create {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Database::create(self.path.as_std_path())?
        } else {
            return Ok(None);
        };

        if let Err(e) = Self::ensure_schema(&db) {
            drop(db);
            if matches!(e, StorageError::Corrupt) {
                let _ = quarantine_corrupt_file(&self.path);
            }
            return Err(e);
        }
        let db = Arc::new(db);
        *slot = Some(db.clone());
        Ok(Some(db))
    }

    fn ensure_schema(db: &Database) -> Result<(), StorageError> {
        let write_tx = db.begin_write()?;
        {
            let mut meta = write_tx.open_table(META)?;
            let format: Option<String> = meta.get(META_FORMAT_KEY)?.map(|g| g.value().to_string());
            if format.is_none() {
                let schema_version = CURRENT_SCHEMA.to_string();
                let created_at = Utc::now().to_rfc3339();
                meta.insert(META_FORMAT_KEY, META_FORMAT_VALUE)?;
                meta.insert(META_SCHEMA_VERSION, schema_version.as_str())?;
                meta.insert(META_CREATED_AT, created_at.as_str())?;
            } else if format.as_deref() != Some(META_FORMAT_VALUE) {
                return Err(StorageError::Corrupt);
            }
        }
        let _ = write_tx.open_table(SNAPSHOTS)?;
        write_tx.commit()?;

        let read_tx = db.begin_read()?;
        let meta = read_tx.open_table(META)?;
        let schema_version = meta
            .get(META_SCHEMA_VERSION)?
            .and_then(|g| g.value().parse::<u32>().ok())
            .unwrap_or(0);
        if schema_version == 0 {
            return Err(StorageError::Corrupt);
        }
        if schema_version > CURRENT_SCHEMA {
            return Err(StorageError::NewerSchema {
                found: schema_version,
                supported: CURRENT_SCHEMA,
            });
        }
        if schema_version != CURRENT_SCHEMA {
            return Err(StorageError::Corrupt);
        }
        Ok(())
    }
}

impl SnapshotStore for RedbSnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        let Some(db) = self.database(false)? else {
            return Ok(None);
        };
        let read_tx = db.begin_read()?;
        let table = read_tx.open_table(SNAPSHOTS)?;
        let Some(guard) = table.get(SNAPSHOT_KEY)? else {
            return Ok(None);
        };
        decode_snapshot(guard.value()).map(Some)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let Some(db) = self.database(true)? else {
            return Err(StorageError::Missing);
        };
        let bytes = encode_snapshot(snapshot)?;
        let saved_at = Utc::now().to_rfc3339();
        let write_tx = db.begin_write()?;
        {
            let mut table = write_tx.open_table(SNAPSHOTS)?;
            table.insert(SNAPSHOT_KEY, bytes.as_slice())?;
            let mut meta = write_tx.open_table(META)?;
            meta.insert(META_LAST_SAVED_AT, saved_at.as_str())?;
        }
        write_tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let Some(db) = self.database(false)? else {
            return Ok(());
        };
        let write_tx = db.begin_write()?;
        {
            let mut table = write_tx.open_table(SNAPSHOTS)?;
            table.remove(SNAPSHOT_KEY)?;
        }
        write_tx.commit()?;
        Ok(())
    }
}
