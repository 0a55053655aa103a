//! In-memory collaborator implementations
//!
//! Map-backed implementations of every trait in [`crate::collab`]. They back
//! the engine's test suites and are usable as-is by embedders that keep
//! balances and custody in-process.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::collab::{
    AssetCustody, CollectionAllowList, CurrencyAllowList, ExternalAssetRegistry, FungibleLedger,
    RoyaltySource,
};
use crate::errors::{CustodyError, FundsError};
use crate::types::{AccountId, Amount, AssetRef, CollectionId, CurrencyId, ExternalAssetId};

/// Fixed currency allow-list
#[derive(Debug, Default)]
pub struct MemoryCurrencies {
    allowed: HashSet<CurrencyId>,
}

impl MemoryCurrencies {
    pub fn new(allowed: impl IntoIterator<Item = CurrencyId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl CurrencyAllowList for MemoryCurrencies {
    fn is_currency_supported(&self, currency: &CurrencyId) -> bool {
        self.allowed.contains(currency)
    }
}

/// Fixed collection allow-list
#[derive(Debug, Default)]
pub struct MemoryCollections {
    allowed: HashSet<CollectionId>,
}

impl MemoryCollections {
    pub fn new(allowed: impl IntoIterator<Item = CollectionId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl CollectionAllowList for MemoryCollections {
    fn is_collection_whitelisted(&self, collection: &CollectionId) -> bool {
        self.allowed.contains(collection)
    }
}

/// Map-backed fungible balances
#[derive(Debug, Default)]
pub struct MemoryBank {
    balances: Mutex<HashMap<(CurrencyId, AccountId), Amount>>,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account out of thin air (test setup)
    pub fn mint(&self, currency: &CurrencyId, account: &AccountId, amount: Amount) {
        let mut balances = self.balances.lock().expect("bank lock poisoned");
        let entry = balances
            .entry((currency.clone(), account.clone()))
            .or_insert(0);
        *entry += amount;
    }

    pub fn balance_of(&self, currency: &CurrencyId, account: &AccountId) -> Amount {
        let balances = self.balances.lock().expect("bank lock poisoned");
        balances
            .get(&(currency.clone(), account.clone()))
            .copied()
            .unwrap_or(0)
    }
}

impl FungibleLedger for MemoryBank {
    fn transfer(
        &self,
        currency: &CurrencyId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), FundsError> {
        if amount == 0 {
            return Ok(());
        }
        let mut balances = self.balances.lock().expect("bank lock poisoned");
        let from_key = (currency.clone(), from.clone());
        let available = balances.get(&from_key).copied().unwrap_or(0);
        if available < amount {
            return Err(FundsError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        *balances.get_mut(&from_key).expect("balance present") = available - amount;
        let entry = balances.entry((currency.clone(), to.clone())).or_insert(0);
        *entry += amount;
        Ok(())
    }
}

/// Map-backed non-fungible ownership
#[derive(Debug, Default)]
pub struct MemoryCustody {
    holders: Mutex<HashMap<AssetRef, AccountId>>,
}

impl MemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset under an initial holder (test setup)
    pub fn register(&self, asset: AssetRef, holder: AccountId) {
        let mut holders = self.holders.lock().expect("custody lock poisoned");
        holders.insert(asset, holder);
    }
}

impl AssetCustody for MemoryCustody {
    fn holder_of(&self, asset: &AssetRef) -> Result<AccountId, CustodyError> {
        let holders = self.holders.lock().expect("custody lock poisoned");
        holders
            .get(asset)
            .cloned()
            .ok_or_else(|| CustodyError::AssetNotFound {
                asset: asset.to_string(),
            })
    }

    fn transfer(
        &self,
        asset: &AssetRef,
        from: &AccountId,
        to: &AccountId,
    ) -> Result<(), CustodyError> {
        let mut holders = self.holders.lock().expect("custody lock poisoned");
        let holder = holders
            .get(asset)
            .cloned()
            .ok_or_else(|| CustodyError::AssetNotFound {
                asset: asset.to_string(),
            })?;
        if holder != *from {
            return Err(CustodyError::NotHolder {
                asset: asset.to_string(),
                holder: from.to_string(),
            });
        }
        holders.insert(asset.clone(), to.clone());
        Ok(())
    }
}

/// Map-backed external asset registry
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: Mutex<HashMap<AssetRef, ExternalAssetId>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, asset: AssetRef, id: ExternalAssetId) {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        entries.insert(asset, id);
    }
}

impl ExternalAssetRegistry for MemoryRegistry {
    fn resolve_external_id(&self, asset: &AssetRef) -> Option<ExternalAssetId> {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.get(asset).cloned()
    }

    fn is_registered(&self, id: &ExternalAssetId) -> bool {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.values().any(|v| v == id)
    }
}

/// Map-backed royalty income source
///
/// Withdrawals are paid out through the supplied bank so recipients see the
/// funds on the same ledger the engine settles on.
pub struct MemoryRoyalties {
    accrued: Mutex<HashMap<(ExternalAssetId, CurrencyId), Amount>>,
    bank: std::sync::Arc<MemoryBank>,
    vault: AccountId,
}

impl MemoryRoyalties {
    pub fn new(bank: std::sync::Arc<MemoryBank>) -> Self {
        Self {
            accrued: Mutex::new(HashMap::new()),
            bank,
            vault: AccountId::new("royalty:vault"),
        }
    }

    /// Accrue royalty income for an external asset (test setup)
    pub fn accrue(&self, id: &ExternalAssetId, currency: &CurrencyId, amount: Amount) {
        let mut accrued = self.accrued.lock().expect("royalty lock poisoned");
        let entry = accrued.entry((id.clone(), currency.clone())).or_insert(0);
        *entry += amount;
        self.bank.mint(currency, &self.vault, amount);
    }
}

impl RoyaltySource for MemoryRoyalties {
    fn available_balance(&self, id: &ExternalAssetId, currency: &CurrencyId) -> Amount {
        let accrued = self.accrued.lock().expect("royalty lock poisoned");
        accrued
            .get(&(id.clone(), currency.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn withdraw(
        &self,
        id: &ExternalAssetId,
        currency: &CurrencyId,
        amount: Amount,
        to: &AccountId,
    ) -> Result<Amount, FundsError> {
        let mut accrued = self.accrued.lock().expect("royalty lock poisoned");
        let key = (id.clone(), currency.clone());
        let available = accrued.get(&key).copied().unwrap_or(0);
        let take = amount.min(available);
        if take > 0 {
            accrued.insert(key, available - take);
            self.bank.transfer(currency, &self.vault, to, take)?;
        }
        Ok(take)
    }
}
