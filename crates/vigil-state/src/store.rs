//! SnapshotStore — redb-backed persistence for the system snapshot.
//!
//! A single table holds a single row: the serialized snapshot under the
//! fixed key `current`. Saving overwrites in place; this store is not a
//! time series, only the latest version survives.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, TableDefinition};
use tracing::debug;

use vigil_core::SystemSnapshot;

use crate::error::{StateError, StateResult};

/// The snapshot table: one `&str` key, JSON-encoded snapshot value.
const SNAPSHOT: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshot");

/// Fixed key of the single persisted record.
const CURRENT_KEY: &str = "current";

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe snapshot store backed by redb.
#[derive(Clone)]
pub struct SnapshotStore {
    db: Arc<Database>,
}

impl SnapshotStore {
    /// Open (or create) a persistent snapshot store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!(?path, "snapshot store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory snapshot store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!("in-memory snapshot store opened");
        Ok(store)
    }

    /// Create the table if it doesn't exist yet.
    fn ensure_table(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SNAPSHOT).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Load the most recently persisted snapshot.
    ///
    /// Returns `None` when nothing has been persisted yet. A record that
    /// fails to decode is an error; the caller decides whether that is
    /// fatal (for the aggregator it is not — it starts empty and alerts).
    pub fn load(&self) -> StateResult<Option<SystemSnapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SNAPSHOT).map_err(map_err!(Table))?;
        match table.get(CURRENT_KEY).map_err(map_err!(Read))? {
            Some(guard) => {
                let snapshot: SystemSnapshot =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Persist a snapshot, overwriting the previous record.
    pub fn save(&self, snapshot: &SystemSnapshot) -> StateResult<()> {
        let value = serde_json::to_vec(snapshot).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SNAPSHOT).map_err(map_err!(Table))?;
            table
                .insert(CURRENT_KEY, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(metrics = snapshot.metric_count(), "snapshot persisted");
        Ok(())
    }
}
