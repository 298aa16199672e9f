//! # Mining Session Engine
//!
//! A timer-driven lifecycle engine for time-boxed mining sessions, as found in
//! idle/clicker games: each entity (a character) mines for a fixed duration at
//! a rate fixed when the session starts, and the reward accrues in proportion
//! to elapsed wall-clock time.
//!
//! ## Features
//!
//! - Deterministic accrual: earnings are always recomputed from timestamps, so
//!   no time is lost or double-counted across process restarts
//! - One session per entity, with stale sessions auto-expired
//! - Bonus multipliers resolved once at start through a pluggable
//!   [`BonusProvider`](bonus::BonusProvider)
//! - Per-session tickers with explicit cancellation on every exit path
//! - Completion events broadcast to any number of subscribers
//! - Durable persistence through Sea-ORM, with MessagePack encoded snapshots
//!   that fall back to an empty table when corrupted
//!
//! ## Quick Start
//!
//! ```no_run
//! use mining_session_engine::{
//!     bonus::FixedBonus, migration::{Migrator, MigratorTrait}, store::SeaOrmStore, MiningEngine,
//! };
//! use sea_orm::Database;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = Database::connect("sqlite://mining.db?mode=rwc").await?;
//! Migrator::up(&conn, None).await?;
//!
//! let engine = MiningEngine::builder(SeaOrmStore::new(conn), FixedBonus::default()).build();
//! let report = engine.recover_on_startup().await;
//! println!("{} sessions resumed", report.resumed.len());
//!
//! if engine.start("main", 1000.0, Some("user-1")).await? {
//!     let status = engine.status("main").await;
//!     println!("{:.0}s left", status.time_remaining_secs);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bonus;
pub mod clock;
mod config;
mod engine;
pub mod entity;
pub mod error;
#[cfg(feature = "migration")]
pub mod migration;
mod notifier;
mod scheduler;
mod session;
pub mod store;

pub use config::EngineConfig;
pub use engine::{EngineBuilder, MiningEngine, RecoveryReport};
pub use error::{BonusError, EngineError, StoreError};
pub use notifier::{CompletionEvent, CompletionNotifier};
pub use session::{MiningSession, SessionStatus, SessionTable};
