//! Schema migrations for the Sea-ORM store.
//!
//! ```no_run
//! use sea_orm::Database;
//! use mining_session_engine::migration::{Migrator, MigratorTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = Database::connect("sqlite::memory:").await?;
//! Migrator::up(&conn, None).await?;
//! # Ok(())
//! # }
//! ```

pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_session_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    // Override the name of migration table to avoid conflicts
    fn migration_table_name() -> sea_orm::DynIden {
        Alias::new("mining_session_engine_migrations").into_iden()
    }

    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240101_000001_create_session_table::Migration)]
    }
}
