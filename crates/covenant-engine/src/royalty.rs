//! Royalty repayment adapter
//!
//! Bridges the loan ledger to the optional external royalty collaborators.
//! An unresolved or unregistered external asset is a normal outcome that
//! applies zero, never an error; only an actual failed withdrawal surfaces.

use std::sync::Arc;

use covenant_core::collab::{ExternalAssetRegistry, RoyaltySource};
use covenant_core::errors::Result;
use covenant_core::types::{AccountId, Amount, CurrencyId, ExternalAssetId};

pub struct RoyaltyAdapter {
    registry: Option<Arc<dyn ExternalAssetRegistry>>,
    source: Option<Arc<dyn RoyaltySource>>,
}

impl RoyaltyAdapter {
    pub fn new(
        registry: Option<Arc<dyn ExternalAssetRegistry>>,
        source: Option<Arc<dyn RoyaltySource>>,
    ) -> Self {
        Self { registry, source }
    }

    /// Royalty balance currently claimable toward a debt; zero when the
    /// asset never made it into the external registry or no source is wired.
    pub fn available(&self, external: Option<&ExternalAssetId>, currency: &CurrencyId) -> Amount {
        let (Some(id), Some(source)) = (external, &self.source) else {
            return 0;
        };
        if let Some(registry) = &self.registry {
            if !registry.is_registered(id) {
                return 0;
            }
        }
        source.available_balance(id, currency)
    }

    /// Withdraw `min(available, amount_due)` to `recipient`, returning the
    /// amount actually applied.
    pub fn attempt_payment(
        &self,
        external: Option<&ExternalAssetId>,
        currency: &CurrencyId,
        amount_due: Amount,
        recipient: &AccountId,
    ) -> Result<Amount> {
        let (Some(id), Some(source)) = (external, &self.source) else {
            return Ok(0);
        };
        if let Some(registry) = &self.registry {
            if !registry.is_registered(id) {
                return Ok(0);
            }
        }
        let take = source.available_balance(id, currency).min(amount_due);
        if take == 0 {
            return Ok(0);
        }
        let applied = source.withdraw(id, currency, take, recipient)?;
        tracing::debug!(
            external_id = %id,
            currency = %currency,
            requested = take,
            applied,
            recipient = %recipient,
            "royalty balance applied"
        );
        Ok(applied)
    }
}
