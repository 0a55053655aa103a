//! Escrow ledger
//!
//! Holds custody of exactly one collateral unit per open loan. Every custody
//! change in the engine goes through this ledger, which pairs the external
//! custody primitive with the asset-to-loan map so an asset can never back
//! two loans at once.

use std::collections::HashMap;
use std::sync::Arc;

use covenant_core::collab::AssetCustody;
use covenant_core::errors::{CustodyError, Result};
use covenant_core::types::{AccountId, AssetRef, LoanId};

pub struct EscrowLedger {
    custody: Arc<dyn AssetCustody>,
    /// Protocol account that holds escrowed assets
    treasury: AccountId,
    held: HashMap<AssetRef, LoanId>,
}

impl EscrowLedger {
    pub fn new(custody: Arc<dyn AssetCustody>, treasury: AccountId) -> Self {
        Self {
            custody,
            treasury,
            held: HashMap::new(),
        }
    }

    /// The loan an asset is currently escrowed for, if any
    pub fn loan_for(&self, asset: &AssetRef) -> Option<LoanId> {
        self.held.get(asset).copied()
    }

    /// Move `asset` from `from` into protocol custody for `loan_id`.
    ///
    /// Fails if the asset is already escrowed or `from` is not the verified
    /// holder. The map entry is written only after the external transfer
    /// succeeds, so a failed transfer leaves no trace.
    pub fn take_custody(&mut self, asset: &AssetRef, from: &AccountId, loan_id: LoanId) -> Result<()> {
        if self.held.contains_key(asset) {
            return Err(CustodyError::AlreadyEscrowed {
                asset: asset.to_string(),
            }
            .into());
        }
        let holder = self.custody.holder_of(asset)?;
        if holder != *from {
            return Err(CustodyError::NotHolder {
                asset: asset.to_string(),
                holder: from.to_string(),
            }
            .into());
        }
        self.custody.transfer(asset, from, &self.treasury)?;
        self.held.insert(asset.clone(), loan_id);
        tracing::debug!(asset = %asset, loan_id = %loan_id, "collateral escrowed");
        Ok(())
    }

    /// Release `asset` to `to`, exactly once per loan lifetime.
    ///
    /// Releasing an asset that is not escrowed, or escrowed for a different
    /// loan, is a reported error. The map entry is cleared before the
    /// external transfer and restored if the transfer fails.
    pub fn release(&mut self, asset: &AssetRef, to: &AccountId, loan_id: LoanId) -> Result<()> {
        match self.held.get(asset) {
            None => {
                return Err(CustodyError::NotEscrowed {
                    asset: asset.to_string(),
                }
                .into())
            }
            Some(held_for) if *held_for != loan_id => {
                return Err(CustodyError::WrongLoan {
                    asset: asset.to_string(),
                }
                .into())
            }
            Some(_) => {}
        }
        self.held.remove(asset);
        if let Err(e) = self.custody.transfer(asset, &self.treasury, to) {
            self.held.insert(asset.clone(), loan_id);
            return Err(e.into());
        }
        tracing::debug!(asset = %asset, loan_id = %loan_id, to = %to, "collateral released");
        Ok(())
    }

    /// Rebind an escrowed asset from one loan to another without a custody
    /// round-trip (refinance carry-over).
    pub fn reassign(&mut self, asset: &AssetRef, old_loan: LoanId, new_loan: LoanId) -> Result<()> {
        match self.held.get_mut(asset) {
            None => Err(CustodyError::NotEscrowed {
                asset: asset.to_string(),
            }
            .into()),
            Some(held_for) if *held_for != old_loan => Err(CustodyError::WrongLoan {
                asset: asset.to_string(),
            }
            .into()),
            Some(held_for) => {
                *held_for = new_loan;
                tracing::debug!(
                    asset = %asset,
                    old_loan = %old_loan,
                    new_loan = %new_loan,
                    "collateral reassigned"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::errors::Error;
    use covenant_core::memory::MemoryCustody;

    fn setup() -> (EscrowLedger, Arc<MemoryCustody>, AssetRef, AccountId) {
        let custody = Arc::new(MemoryCustody::new());
        let asset = AssetRef::new("punks", "1");
        let owner = AccountId::new("owner");
        custody.register(asset.clone(), owner.clone());
        let escrow = EscrowLedger::new(custody.clone(), AccountId::new("treasury"));
        (escrow, custody, asset, owner)
    }

    #[test]
    fn test_take_and_release_round_trip() {
        let (mut escrow, custody, asset, owner) = setup();
        let loan = LoanId::generate();

        escrow.take_custody(&asset, &owner, loan).unwrap();
        assert_eq!(escrow.loan_for(&asset), Some(loan));
        assert_eq!(
            custody.holder_of(&asset).unwrap(),
            AccountId::new("treasury")
        );

        escrow.release(&asset, &owner, loan).unwrap();
        assert_eq!(escrow.loan_for(&asset), None);
        assert_eq!(custody.holder_of(&asset).unwrap(), owner);
    }

    #[test]
    fn test_double_escrow_rejected() {
        let (mut escrow, _custody, asset, owner) = setup();
        escrow.take_custody(&asset, &owner, LoanId::generate()).unwrap();
        let err = escrow
            .take_custody(&asset, &owner, LoanId::generate())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Custody(CustodyError::AlreadyEscrowed { .. })
        ));
    }

    #[test]
    fn test_take_requires_verified_holder() {
        let (mut escrow, _custody, asset, _owner) = setup();
        let err = escrow
            .take_custody(&asset, &AccountId::new("mallory"), LoanId::generate())
            .unwrap_err();
        assert!(matches!(err, Error::Custody(CustodyError::NotHolder { .. })));
    }

    #[test]
    fn test_release_is_exactly_once() {
        let (mut escrow, _custody, asset, owner) = setup();
        let loan = LoanId::generate();
        escrow.take_custody(&asset, &owner, loan).unwrap();
        escrow.release(&asset, &owner, loan).unwrap();

        let err = escrow.release(&asset, &owner, loan).unwrap_err();
        assert!(matches!(
            err,
            Error::Custody(CustodyError::NotEscrowed { .. })
        ));
    }

    #[test]
    fn test_release_for_wrong_loan_rejected() {
        let (mut escrow, _custody, asset, owner) = setup();
        let loan = LoanId::generate();
        escrow.take_custody(&asset, &owner, loan).unwrap();
        let err = escrow
            .release(&asset, &owner, LoanId::generate())
            .unwrap_err();
        assert!(matches!(err, Error::Custody(CustodyError::WrongLoan { .. })));
    }

    #[test]
    fn test_reassign_keeps_custody() {
        let (mut escrow, custody, asset, owner) = setup();
        let old = LoanId::generate();
        let new = LoanId::generate();
        escrow.take_custody(&asset, &owner, old).unwrap();
        escrow.reassign(&asset, old, new).unwrap();
        assert_eq!(escrow.loan_for(&asset), Some(new));
        assert_eq!(
            custody.holder_of(&asset).unwrap(),
            AccountId::new("treasury")
        );
        // the old binding no longer releases
        assert!(escrow.release(&asset, &owner, old).is_err());
        escrow.release(&asset, &owner, new).unwrap();
    }
}
