//! Liquidation auction and buyout state
//!
//! English auctions and buyout windows over defaulted collateral. This module
//! owns auction/buyout records and their transition rules; fund movement and
//! escrow release are orchestrated by the façade so that every transfer runs
//! through the compensating executor.

use std::collections::HashMap;

use covenant_core::errors::{Result, StateError, ValidationError};
use covenant_core::types::{
    AccountId, Amount, AssetRef, AuctionId, CurrencyId, LoanId, Timestamp,
};

use crate::state::{Auction, AuctionStatus, Buyout, Claimant};

fn validate_claimants(claimants: &[Claimant]) -> Result<()> {
    if claimants.is_empty() {
        return Err(ValidationError::InvalidClaimants {
            reason: "claimant set is empty",
        }
        .into());
    }
    if claimants.iter().map(|c| c.weight).sum::<u64>() == 0 {
        return Err(ValidationError::InvalidClaimants {
            reason: "total weight is zero",
        }
        .into());
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct AuctionHouse {
    auctions: HashMap<AuctionId, Auction>,
    by_loan: HashMap<LoanId, AuctionId>,
    buyouts: HashMap<LoanId, Buyout>,
}

impl AuctionHouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: AuctionId) -> Result<&Auction> {
        self.auctions
            .get(&id)
            .ok_or_else(|| StateError::AuctionNotFound { id: id.to_string() }.into())
    }

    fn get_mut(&mut self, id: AuctionId) -> Result<&mut Auction> {
        self.auctions
            .get_mut(&id)
            .ok_or_else(|| StateError::AuctionNotFound { id: id.to_string() }.into())
    }

    /// An auction that has not yet settled still owns the collateral's fate
    pub fn has_unsettled_auction(&self, loan_id: LoanId) -> bool {
        self.by_loan
            .get(&loan_id)
            .and_then(|id| self.auctions.get(id))
            .map(|a| a.status != AuctionStatus::Settled)
            .unwrap_or(false)
    }

    pub fn buyout_for(&self, loan_id: LoanId) -> Option<&Buyout> {
        self.buyouts.get(&loan_id)
    }

    pub fn has_open_buyout(&self, loan_id: LoanId, now: Timestamp) -> bool {
        self.buyouts
            .get(&loan_id)
            .map(|b| b.is_open(now))
            .unwrap_or(false)
    }

    /// Open an auction over a defaulted loan's collateral
    pub fn open_auction(
        &mut self,
        loan_id: LoanId,
        asset: AssetRef,
        currency: CurrencyId,
        starting_bid: Amount,
        duration_secs: u64,
        claimants: Vec<Claimant>,
        now: Timestamp,
    ) -> Result<AuctionId> {
        if starting_bid == 0 {
            return Err(ValidationError::ZeroAmount {
                field: "starting bid",
            }
            .into());
        }
        if duration_secs == 0 {
            return Err(ValidationError::ZeroAmount { field: "duration" }.into());
        }
        validate_claimants(&claimants)?;
        if self.has_unsettled_auction(loan_id) {
            return Err(StateError::AuctionExists {
                loan_id: loan_id.to_string(),
            }
            .into());
        }
        if self.has_open_buyout(loan_id, now) {
            return Err(StateError::BuyoutOpen {
                loan_id: loan_id.to_string(),
            }
            .into());
        }

        let id = AuctionId::generate();
        self.auctions.insert(
            id,
            Auction {
                id,
                loan_id,
                asset,
                currency,
                starting_bid,
                highest_bid: 0,
                highest_bidder: None,
                start_time: now,
                end_time: now + duration_secs,
                status: AuctionStatus::Active,
                claimants,
            },
        );
        self.by_loan.insert(loan_id, id);
        Ok(id)
    }

    /// Validate a bid without touching state. Returns the bidder/amount that
    /// would be displaced, for the synchronous refund.
    pub fn check_bid(
        &self,
        id: AuctionId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Option<(AccountId, Amount)>> {
        let auction = self.get(id)?;
        if auction.status != AuctionStatus::Active {
            return Err(StateError::AuctionNotActive { id: id.to_string() }.into());
        }
        if now >= auction.end_time {
            return Err(StateError::AuctionEnded {
                id: id.to_string(),
                end_time: auction.end_time,
                now,
            }
            .into());
        }
        match &auction.highest_bidder {
            None => {
                if amount < auction.starting_bid {
                    return Err(ValidationError::BidBelowStarting {
                        bid: amount,
                        starting: auction.starting_bid,
                    }
                    .into());
                }
                Ok(None)
            }
            Some(bidder) => {
                if amount <= auction.highest_bid {
                    return Err(ValidationError::BidTooLow {
                        bid: amount,
                        highest: auction.highest_bid,
                    }
                    .into());
                }
                Ok(Some((bidder.clone(), auction.highest_bid)))
            }
        }
    }

    /// Record a bid previously validated with [`Self::check_bid`] in the same
    /// operation; the highest bid only ever increases.
    pub fn commit_bid(&mut self, id: AuctionId, bidder: AccountId, amount: Amount) -> Result<()> {
        let auction = self.get_mut(id)?;
        debug_assert!(amount > auction.highest_bid);
        auction.highest_bid = amount;
        auction.highest_bidder = Some(bidder);
        Ok(())
    }

    /// Finalize a past-end auction to its outcome. Moves no funds or assets.
    pub fn finalize(&mut self, id: AuctionId, now: Timestamp) -> Result<AuctionStatus> {
        let auction = self.get_mut(id)?;
        if auction.status != AuctionStatus::Active {
            return Err(StateError::AuctionNotActive { id: id.to_string() }.into());
        }
        if now < auction.end_time {
            return Err(StateError::AuctionStillRunning {
                id: id.to_string(),
                end_time: auction.end_time,
                now,
            }
            .into());
        }
        auction.status = if auction.highest_bidder.is_some() {
            AuctionStatus::EndedSold
        } else {
            AuctionStatus::EndedNoBids
        };
        Ok(auction.status)
    }

    /// Require a finalized outcome before settlement
    pub fn get_with_outcome(&self, id: AuctionId, expected: AuctionStatus) -> Result<&Auction> {
        let auction = self.get(id)?;
        if auction.status != expected {
            return Err(StateError::AuctionWrongOutcome {
                id: id.to_string(),
                expected: expected.as_str(),
            }
            .into());
        }
        Ok(auction)
    }

    pub fn mark_settled(&mut self, id: AuctionId) -> Result<()> {
        let auction = self.get_mut(id)?;
        match auction.status {
            AuctionStatus::EndedSold | AuctionStatus::EndedNoBids => {
                auction.status = AuctionStatus::Settled;
                Ok(())
            }
            _ => Err(StateError::AuctionWrongOutcome {
                id: id.to_string(),
                expected: "ended",
            }
            .into()),
        }
    }

    /// Open a buyout window for a designated senior claimant
    pub fn open_buyout(
        &mut self,
        loan_id: LoanId,
        claimant: AccountId,
        claimants: Vec<Claimant>,
        price: Amount,
        deadline: Timestamp,
        now: Timestamp,
    ) -> Result<()> {
        if price == 0 {
            return Err(ValidationError::ZeroAmount { field: "price" }.into());
        }
        if deadline <= now {
            return Err(ValidationError::ExpirationInPast {
                expires_at: deadline,
                now,
            }
            .into());
        }
        validate_claimants(&claimants)?;
        if self.has_open_buyout(loan_id, now) {
            return Err(StateError::BuyoutOpen {
                loan_id: loan_id.to_string(),
            }
            .into());
        }
        if self.has_unsettled_auction(loan_id) {
            return Err(StateError::AuctionExists {
                loan_id: loan_id.to_string(),
            }
            .into());
        }
        self.buyouts.insert(
            loan_id,
            Buyout {
                loan_id,
                claimant,
                claimants,
                price,
                deadline,
                active: true,
                completed: false,
            },
        );
        Ok(())
    }

    /// Require an open buyout, rejecting expired windows explicitly
    pub fn get_open_buyout(&self, loan_id: LoanId, now: Timestamp) -> Result<&Buyout> {
        let buyout = self
            .buyouts
            .get(&loan_id)
            .filter(|b| b.active)
            .ok_or_else(|| StateError::BuyoutNotOpen {
                loan_id: loan_id.to_string(),
            })?;
        if now > buyout.deadline {
            return Err(StateError::BuyoutExpired {
                loan_id: loan_id.to_string(),
                deadline: buyout.deadline,
                now,
            }
            .into());
        }
        Ok(buyout)
    }

    pub fn complete_buyout(&mut self, loan_id: LoanId) -> Result<()> {
        let buyout = self
            .buyouts
            .get_mut(&loan_id)
            .ok_or_else(|| StateError::BuyoutNotOpen {
                loan_id: loan_id.to_string(),
            })?;
        buyout.active = false;
        buyout.completed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::errors::Error;

    fn claimants() -> Vec<Claimant> {
        vec![Claimant {
            account: AccountId::new("lender"),
            weight: 100,
        }]
    }

    fn open(house: &mut AuctionHouse, loan_id: LoanId, now: Timestamp) -> AuctionId {
        house
            .open_auction(
                loan_id,
                AssetRef::new("punks", "1"),
                CurrencyId::new("usd"),
                100,
                3_600,
                claimants(),
                now,
            )
            .unwrap()
    }

    #[test]
    fn test_bid_thresholds() {
        let mut house = AuctionHouse::new();
        let id = open(&mut house, LoanId::generate(), 1_000);

        // first bid must meet the starting bid
        assert!(matches!(
            house.check_bid(id, 99, 1_100).unwrap_err(),
            Error::Validation(ValidationError::BidBelowStarting { .. })
        ));
        assert_eq!(house.check_bid(id, 100, 1_100).unwrap(), None);
        house
            .commit_bid(id, AccountId::new("alice"), 100)
            .unwrap();

        // later bids strictly greater, displacing the previous bidder
        assert!(matches!(
            house.check_bid(id, 100, 1_200).unwrap_err(),
            Error::Validation(ValidationError::BidTooLow { .. })
        ));
        let displaced = house.check_bid(id, 150, 1_200).unwrap();
        assert_eq!(displaced, Some((AccountId::new("alice"), 100)));
    }

    #[test]
    fn test_bids_rejected_at_end_time() {
        let mut house = AuctionHouse::new();
        let id = open(&mut house, LoanId::generate(), 1_000);
        assert!(matches!(
            house.check_bid(id, 100, 4_600).unwrap_err(),
            Error::State(StateError::AuctionEnded { .. })
        ));
    }

    #[test]
    fn test_finalize_outcomes() {
        let mut house = AuctionHouse::new();
        let loan_a = LoanId::generate();
        let loan_b = LoanId::generate();

        let sold = open(&mut house, loan_a, 1_000);
        house.commit_bid(sold, AccountId::new("alice"), 100).unwrap();
        assert!(matches!(
            house.finalize(sold, 2_000).unwrap_err(),
            Error::State(StateError::AuctionStillRunning { .. })
        ));
        assert_eq!(house.finalize(sold, 4_600).unwrap(), AuctionStatus::EndedSold);

        let unsold = open(&mut house, loan_b, 1_000);
        assert_eq!(
            house.finalize(unsold, 4_600).unwrap(),
            AuctionStatus::EndedNoBids
        );

        // finalization is one-shot
        assert!(house.finalize(sold, 4_700).is_err());
    }

    #[test]
    fn test_one_unsettled_auction_per_loan() {
        let mut house = AuctionHouse::new();
        let loan_id = LoanId::generate();
        let id = open(&mut house, loan_id, 1_000);
        assert!(matches!(
            house
                .open_auction(
                    loan_id,
                    AssetRef::new("punks", "1"),
                    CurrencyId::new("usd"),
                    100,
                    3_600,
                    claimants(),
                    1_000,
                )
                .unwrap_err(),
            Error::State(StateError::AuctionExists { .. })
        ));

        // settled auctions stop blocking
        house.finalize(id, 4_600).unwrap();
        house.mark_settled(id).unwrap();
        open(&mut house, loan_id, 5_000);
    }

    #[test]
    fn test_buyout_and_auction_are_mutually_exclusive() {
        let mut house = AuctionHouse::new();
        let loan_id = LoanId::generate();
        house
            .open_buyout(
                loan_id,
                AccountId::new("lender"),
                claimants(),
                500,
                2_000,
                1_000,
            )
            .unwrap();

        assert!(matches!(
            house
                .open_auction(
                    loan_id,
                    AssetRef::new("punks", "1"),
                    CurrencyId::new("usd"),
                    100,
                    3_600,
                    claimants(),
                    1_500,
                )
                .unwrap_err(),
            Error::State(StateError::BuyoutOpen { .. })
        ));

        // expired windows stop blocking
        open(&mut house, loan_id, 2_001);
    }

    #[test]
    fn test_expired_buyout_execution_rejected() {
        let mut house = AuctionHouse::new();
        let loan_id = LoanId::generate();
        house
            .open_buyout(
                loan_id,
                AccountId::new("lender"),
                claimants(),
                500,
                2_000,
                1_000,
            )
            .unwrap();

        house.get_open_buyout(loan_id, 2_000).unwrap();
        assert!(matches!(
            house.get_open_buyout(loan_id, 2_001).unwrap_err(),
            Error::State(StateError::BuyoutExpired { .. })
        ));
    }

    #[test]
    fn test_zero_weight_claimant_set_rejected() {
        let mut house = AuctionHouse::new();
        let err = house
            .open_auction(
                LoanId::generate(),
                AssetRef::new("punks", "1"),
                CurrencyId::new("usd"),
                100,
                3_600,
                vec![Claimant {
                    account: AccountId::new("lender"),
                    weight: 0,
                }],
                1_000,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::InvalidClaimants { .. })
        ));
    }
}
