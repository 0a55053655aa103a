//! Collaborator interfaces consumed by the engine
//!
//! Allow-lists, fund movement, collateral custody, and the optional external
//! royalty integration are injected at engine construction. Production and
//! test implementations satisfy the same traits; the in-memory versions live
//! in [`crate::memory`].

use crate::errors::{CustodyError, FundsError};
use crate::types::{AccountId, Amount, AssetRef, CollectionId, CurrencyId, ExternalAssetId};

/// Currency allow-list registry
pub trait CurrencyAllowList: Send + Sync {
    fn is_currency_supported(&self, currency: &CurrencyId) -> bool;
}

/// Collateral collection allow-list registry
pub trait CollectionAllowList: Send + Sync {
    fn is_collection_whitelisted(&self, collection: &CollectionId) -> bool;
}

/// Fungible token transfer primitive
///
/// `transfer` fails explicitly on insufficient balance; partial transfers do
/// not exist. The engine is the trusted mover for all parties.
pub trait FungibleLedger: Send + Sync {
    fn transfer(
        &self,
        currency: &CurrencyId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), FundsError>;
}

/// Non-fungible custody primitive
///
/// `transfer` fails explicitly if `from` is not the verified holder.
pub trait AssetCustody: Send + Sync {
    fn holder_of(&self, asset: &AssetRef) -> Result<AccountId, CustodyError>;

    fn transfer(
        &self,
        asset: &AssetRef,
        from: &AccountId,
        to: &AccountId,
    ) -> Result<(), CustodyError>;
}

/// External asset registry mapping collateral to royalty-bearing assets
pub trait ExternalAssetRegistry: Send + Sync {
    /// Resolve a collateral unit to its external id, if registered
    fn resolve_external_id(&self, asset: &AssetRef) -> Option<ExternalAssetId>;

    fn is_registered(&self, id: &ExternalAssetId) -> bool;
}

/// External royalty income source
pub trait RoyaltySource: Send + Sync {
    /// Balance currently claimable for the external asset
    fn available_balance(&self, id: &ExternalAssetId, currency: &CurrencyId) -> Amount;

    /// Withdraw up to `amount` to `to`, returning the amount actually moved
    fn withdraw(
        &self,
        id: &ExternalAssetId,
        currency: &CurrencyId,
        amount: Amount,
        to: &AccountId,
    ) -> Result<Amount, FundsError>;
}
