//! Database entity models for the mining session engine.
//!
//! The primary entity in this module is the `session_table` entity, which
//! stores one encoded snapshot of the whole session table per namespace.

/// Session table snapshot entity for Sea-ORM database interaction.
pub mod session_table;
