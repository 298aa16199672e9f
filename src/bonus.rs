//! Bonus multiplier lookup.
//!
//! The engine only depends on the numeric contract: a provider maps an account
//! id to a multiplier `>= 1.0` (1.0 means no bonus, 1.2 means +20%). Where the
//! number comes from (clan membership, promotions, ...) is the provider's
//! business.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::BonusError;

/// Resolves the multiplicative rate modifier for an account.
#[async_trait]
pub trait BonusProvider: Debug + Send + Sync + 'static {
    async fn bonus_multiplier(&self, account_id: &str) -> Result<f64, BonusError>;
}

/// Checks a multiplier against the `>= 1.0` contract.
pub(crate) fn validate_multiplier(multiplier: f64) -> Result<f64, BonusError> {
    if multiplier.is_finite() && multiplier >= 1.0 {
        Ok(multiplier)
    } else {
        Err(BonusError::InvalidMultiplier(multiplier))
    }
}

/// A provider that never grants a bonus.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBonus;

#[async_trait]
impl BonusProvider for NoBonus {
    async fn bonus_multiplier(&self, _account_id: &str) -> Result<f64, BonusError> {
        Ok(1.0)
    }
}

/// A provider backed by an in-memory account → multiplier map.
///
/// Accounts without an entry get `default_multiplier`. Clones share the same
/// map, so values can be changed while an engine holds the provider.
#[derive(Debug, Clone)]
pub struct FixedBonus {
    multipliers: Arc<RwLock<HashMap<String, f64>>>,
    default_multiplier: f64,
}

impl FixedBonus {
    pub fn new(default_multiplier: f64) -> Self {
        Self {
            multipliers: Arc::new(RwLock::new(HashMap::new())),
            default_multiplier,
        }
    }

    pub fn with_account(self, account_id: impl Into<String>, multiplier: f64) -> Self {
        self.set(account_id, multiplier);
        self
    }

    pub fn set(&self, account_id: impl Into<String>, multiplier: f64) {
        self.multipliers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(account_id.into(), multiplier);
    }
}

impl Default for FixedBonus {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl BonusProvider for FixedBonus {
    async fn bonus_multiplier(&self, account_id: &str) -> Result<f64, BonusError> {
        let multipliers = self.multipliers.read().unwrap_or_else(|e| e.into_inner());
        Ok(multipliers
            .get(account_id)
            .copied()
            .unwrap_or(self.default_multiplier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_bonus_falls_back_to_default() {
        let provider = FixedBonus::new(1.0).with_account("clan-member", 1.2);

        assert_eq!(provider.bonus_multiplier("clan-member").await.unwrap(), 1.2);
        assert_eq!(provider.bonus_multiplier("loner").await.unwrap(), 1.0);
    }

    #[test]
    fn multipliers_below_one_are_rejected() {
        assert!(validate_multiplier(1.0).is_ok());
        assert!(validate_multiplier(0.5).is_err());
        assert!(validate_multiplier(f64::NAN).is_err());
        assert!(validate_multiplier(f64::INFINITY).is_err());
    }
}
