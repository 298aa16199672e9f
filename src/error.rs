//! Error types for the mining session engine.

use thiserror::Error;

/// Errors raised by a [`SessionStore`](crate::store::SessionStore) backend.
///
/// The engine never propagates these to its callers. A failed load resets the
/// session table to empty and a failed save is logged, leaving the in-memory
/// table authoritative.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying storage backend failed (database, connection, ...).
    #[error("session store backend error: {0}")]
    Backend(String),

    /// The session table could not be serialized.
    #[error("failed to encode session table: {0}")]
    Encode(String),

    /// The persisted session table could not be deserialized.
    #[error("failed to decode session table: {0}")]
    Decode(String),
}

/// Errors raised while resolving a bonus multiplier.
#[derive(Debug, Error)]
pub enum BonusError {
    /// The provider could not answer for the given account.
    #[error("bonus lookup failed for account {account_id}: {reason}")]
    Lookup { account_id: String, reason: String },

    /// The provider answered with a value outside the `>= 1.0` contract.
    #[error("invalid bonus multiplier {0}")]
    InvalidMultiplier(f64),
}

/// Errors returned by [`MiningEngine`](crate::MiningEngine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The bonus multiplier could not be resolved, so no session was created.
    #[error(transparent)]
    Bonus(#[from] BonusError),

    /// The base rate is negative, NaN or infinite.
    #[error("invalid base rate {0}")]
    InvalidRate(f64),
}

/// Result alias for engine operations.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
