//! Session table snapshot model for Sea-ORM database interaction.
//!
//! The engine persists its whole table as one record, so the schema is a
//! single keyed blob rather than one row per session.

use sea_orm::entity::prelude::*;

/// Sea-ORM entity model holding one persisted session table.
///
/// # Database Schema
///
/// | Column     | Type               | Description                             |
/// |------------|--------------------|-----------------------------------------|
/// | namespace  | TEXT (Primary Key) | Fixed key the snapshot is stored under  |
/// | data       | BLOB / BYTEA       | MessagePack encoded session table       |
/// | updated_at | TIMESTAMPTZ        | When the snapshot was last written      |
///
/// This entity is used internally by [`SeaOrmStore`](crate::store::SeaOrmStore).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "mining_session_table")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub namespace: String,

    /// MessagePack encoded `BTreeMap<String, MiningSession>`.
    pub data: Vec<u8>,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
