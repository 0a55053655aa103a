//! Engine state types

use covenant_core::types::{
    AccountId, Amount, AssetRef, AuctionId, BasisPoints, CollectionId, CurrencyId,
    ExternalAssetId, ListingId, LoanId, OfferId, ProposalId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a loan offer is secured against
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum OfferKind {
    /// A single fixed asset, funded once at the full principal
    #[serde(rename_all = "camelCase")]
    Standard { asset: AssetRef, principal: Amount },
    /// Any asset of a collection, funded repeatedly up to a shared capacity
    #[serde(rename_all = "camelCase")]
    Collection {
        collection: CollectionId,
        /// Total principal the lender is willing to put at risk across loans
        total_capacity: Amount,
        /// Largest principal a single loan may draw
        max_principal_per_loan: Amount,
        /// Principal drawn by acceptances so far, never exceeds capacity
        drawn: Amount,
    },
}

/// A lender's standing proposal to fund a loan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: OfferId,
    pub lender: AccountId,
    pub kind: OfferKind,
    pub currency: CurrencyId,
    /// Annual rate in basis points
    pub apr_bps: BasisPoints,
    /// Loan term granted to each acceptance
    pub duration_secs: u64,
    /// Acceptances fail at or after this instant
    pub expires_at: Timestamp,
    /// One-time fee rate deducted from principal at acceptance
    pub origination_fee_bps: BasisPoints,
    pub active: bool,
}

impl Offer {
    /// Whether `asset` is acceptable collateral for this offer
    pub fn collateral_matches(&self, asset: &AssetRef) -> bool {
        match &self.kind {
            OfferKind::Standard { asset: fixed, .. } => fixed == asset,
            OfferKind::Collection { collection, .. } => asset.collection == *collection,
        }
    }

    /// Capacity still available for draws (the full principal for standard offers)
    pub fn remaining_capacity(&self) -> Amount {
        match &self.kind {
            OfferKind::Standard { principal, .. } => *principal,
            OfferKind::Collection {
                total_capacity,
                drawn,
                ..
            } => total_capacity.saturating_sub(*drawn),
        }
    }

    /// The collection this offer lends against
    pub fn collection(&self) -> &CollectionId {
        match &self.kind {
            OfferKind::Standard { asset, .. } => &asset.collection,
            OfferKind::Collection { collection, .. } => collection,
        }
    }
}

/// Loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoanStatus {
    Active,
    Repaid,
    Defaulted,
    Liquidated,
    Refinanced,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Repaid => "repaid",
            Self::Defaulted => "defaulted",
            Self::Liquidated => "liquidated",
            Self::Refinanced => "refinanced",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An accepted offer materialized into a debt obligation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: LoanId,
    /// Offer this loan was drawn from
    pub offer_id: OfferId,
    pub borrower: AccountId,
    pub lender: AccountId,
    pub asset: AssetRef,
    pub currency: CurrencyId,
    pub principal: Amount,
    pub apr_bps: BasisPoints,
    /// Fee withheld from principal at acceptance
    pub origination_fee_paid: Amount,
    pub start_time: Timestamp,
    /// start_time + duration, fixed except by renegotiation
    pub due_time: Timestamp,
    /// Interest cached on the transition out of Active
    pub accrued_interest: Amount,
    pub status: LoanStatus,
    /// External royalty-registry linkage, when the collateral qualifies
    pub external_asset: Option<ExternalAssetId>,
}

impl Loan {
    /// Active and not past due
    pub fn is_repayable(&self, now: Timestamp) -> bool {
        self.status == LoanStatus::Active && now <= self.due_time
    }

    /// Defaulted, or active with the due time behind us
    pub fn is_in_default(&self, now: Timestamp) -> bool {
        match self.status {
            LoanStatus::Defaulted => true,
            LoanStatus::Active => now > self.due_time,
            _ => false,
        }
    }

    /// Seconds of accrual between start and `min(now, due_time)`
    pub fn accrual_elapsed(&self, now: Timestamp) -> u64 {
        now.min(self.due_time).saturating_sub(self.start_time)
    }
}

/// Lender-proposed loan term modification, consumed at most once
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenegotiationProposal {
    pub id: ProposalId,
    pub loan_id: LoanId,
    /// Must be the loan's current lender
    pub proposer: AccountId,
    pub principal: Amount,
    pub apr_bps: BasisPoints,
    pub duration_secs: u64,
    pub accepted: bool,
}

/// Borrower-opened sale of an active loan's collateral
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleListing {
    pub id: ListingId,
    pub loan_id: LoanId,
    /// The loan's borrower
    pub seller: AccountId,
    pub asset: AssetRef,
    pub price: Amount,
    pub currency: CurrencyId,
    pub active: bool,
}

/// Auction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuctionStatus {
    Active,
    EndedNoBids,
    EndedSold,
    Settled,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::EndedNoBids => "endedNoBids",
            Self::EndedSold => "endedSold",
            Self::Settled => "settled",
        }
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A party entitled to a weighted share of liquidation proceeds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claimant {
    pub account: AccountId,
    pub weight: u64,
}

/// English auction over a defaulted loan's collateral
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: AuctionId,
    pub loan_id: LoanId,
    pub asset: AssetRef,
    pub currency: CurrencyId,
    /// Reserve: the first bid must meet it
    pub starting_bid: Amount,
    /// Monotonically increasing while active; zero until the first bid
    pub highest_bid: Amount,
    pub highest_bidder: Option<AccountId>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub status: AuctionStatus,
    /// Pro-rata recipients of the proceeds
    pub claimants: Vec<Claimant>,
}

impl Auction {
    /// Accepting bids: active and before the end time
    pub fn is_open(&self, now: Timestamp) -> bool {
        self.status == AuctionStatus::Active && now < self.end_time
    }

    pub fn total_weight(&self) -> u64 {
        self.claimants.iter().map(|c| c.weight).sum()
    }
}

/// Fixed-price, time-boxed right of a designated claimant to take the
/// defaulted position ahead of an auction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buyout {
    pub loan_id: LoanId,
    /// The designated senior claimant entitled to execute
    pub claimant: AccountId,
    /// Recipients of the buyout price
    pub claimants: Vec<Claimant>,
    pub price: Amount,
    pub deadline: Timestamp,
    pub active: bool,
    pub completed: bool,
}

impl Buyout {
    pub fn is_open(&self, now: Timestamp) -> bool {
        self.active && now <= self.deadline
    }

    pub fn total_weight(&self) -> u64 {
        self.claimants.iter().map(|c| c.weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::types::{LoanId, OfferId};

    fn sample_loan() -> Loan {
        Loan {
            id: LoanId::generate(),
            offer_id: OfferId::generate(),
            borrower: AccountId::new("borrower"),
            lender: AccountId::new("lender"),
            asset: AssetRef::new("punks", "1"),
            currency: CurrencyId::new("usd"),
            principal: 1_000,
            apr_bps: 500,
            origination_fee_paid: 10,
            start_time: 100,
            due_time: 200,
            accrued_interest: 0,
            status: LoanStatus::Active,
            external_asset: None,
        }
    }

    #[test]
    fn test_repayable_window_is_inclusive() {
        let loan = sample_loan();
        assert!(loan.is_repayable(100));
        assert!(loan.is_repayable(200));
        assert!(!loan.is_repayable(201));
        assert!(!loan.is_in_default(200));
        assert!(loan.is_in_default(201));
    }

    #[test]
    fn test_accrual_elapsed_caps_at_due() {
        let loan = sample_loan();
        assert_eq!(loan.accrual_elapsed(150), 50);
        assert_eq!(loan.accrual_elapsed(200), 100);
        assert_eq!(loan.accrual_elapsed(10_000), 100);
        assert_eq!(loan.accrual_elapsed(50), 0);
    }

    #[test]
    fn test_collection_offer_remaining_capacity() {
        let offer = Offer {
            id: OfferId::generate(),
            lender: AccountId::new("lender"),
            kind: OfferKind::Collection {
                collection: CollectionId::new("punks"),
                total_capacity: 100,
                max_principal_per_loan: 25,
                drawn: 60,
            },
            currency: CurrencyId::new("usd"),
            apr_bps: 500,
            duration_secs: 1_000,
            expires_at: 10_000,
            origination_fee_bps: 0,
            active: true,
        };
        assert_eq!(offer.remaining_capacity(), 40);
        assert!(offer.collateral_matches(&AssetRef::new("punks", "7")));
        assert!(!offer.collateral_matches(&AssetRef::new("apes", "7")));
    }

    #[test]
    fn test_loan_status_serde_camel_case() {
        let json = serde_json::to_string(&LoanStatus::Defaulted).unwrap();
        assert_eq!(json, r#""defaulted""#);
        let json = serde_json::to_string(&AuctionStatus::EndedNoBids).unwrap();
        assert_eq!(json, r#""endedNoBids""#);
    }
}
