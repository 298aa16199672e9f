//! Durable persistence of the session table.
//!
//! A store holds one snapshot of the whole [`SessionTable`], encoded with
//! MessagePack. The engine reads it once on startup and rewrites it on every
//! state transition.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::session::SessionTable;

mod memory;
mod seaorm_store;

pub use memory::MemoryStore;
pub use seaorm_store::SeaOrmStore;

/// Key-value persistence for the full session table.
#[async_trait]
pub trait SessionStore: std::fmt::Debug + Send + Sync + 'static {
    /// Loads the persisted table. A store that has never been written returns
    /// an empty table.
    async fn load(&self) -> Result<SessionTable, StoreError>;

    /// Replaces the persisted table with `table`.
    async fn save_all(&self, table: &SessionTable) -> Result<(), StoreError>;
}

pub(crate) fn encode_table(table: &SessionTable) -> Result<Vec<u8>, StoreError> {
    rmp_serde::to_vec(table).map_err(|e| StoreError::Encode(e.to_string()))
}

pub(crate) fn decode_table(data: &[u8]) -> Result<SessionTable, StoreError> {
    rmp_serde::from_slice(data).map_err(|e| StoreError::Decode(e.to_string()))
}
