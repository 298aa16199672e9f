use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{decode_table, encode_table, SessionStore};
use crate::error::StoreError;
use crate::session::SessionTable;

/// An in-process store keeping the encoded snapshot in memory.
///
/// The snapshot goes through the same MessagePack encoding as the database
/// store, so it round-trips exactly like durable storage would. Clones share
/// the snapshot, which lets a second engine "restart" on top of the first
/// engine's data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    snapshot: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose persisted snapshot is exactly `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(Some(bytes.into()))),
        }
    }

    /// Raw persisted bytes, if anything was ever written.
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self) -> Result<SessionTable, StoreError> {
        match self.snapshot() {
            Some(bytes) => decode_table(&bytes),
            None => Ok(SessionTable::new()),
        }
    }

    async fn save_all(&self, table: &SessionTable) -> Result<(), StoreError> {
        let bytes = encode_table(table)?;
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(bytes);
        Ok(())
    }
}
