//! Error types for Covenant

use thiserror::Error;

use crate::types::{Amount, Timestamp};

/// Core errors that can occur in Covenant
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Funds error: {0}")]
    Funds(#[from] FundsError),

    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),

    #[error("Arithmetic overflow in {context}")]
    Overflow { context: &'static str },
}

/// Malformed or out-of-policy input, rejected before any state mutation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Currency not supported: {currency}")]
    UnsupportedCurrency { currency: String },

    #[error("Collection not whitelisted: {collection}")]
    CollectionNotWhitelisted { collection: String },

    #[error("{field} must be positive")]
    ZeroAmount { field: &'static str },

    #[error("Expiration {expires_at} is not in the future (now: {now})")]
    ExpirationInPast { expires_at: Timestamp, now: Timestamp },

    #[error("Per-loan principal cap {max_per_loan} exceeds total capacity {capacity}")]
    CapacityShape { max_per_loan: Amount, capacity: Amount },

    #[error("Principal {requested} exceeds per-loan cap {max_per_loan}")]
    AboveLoanCap { requested: Amount, max_per_loan: Amount },

    #[error("Draw of {requested} exceeds remaining capacity {remaining}")]
    CapacityExceeded { requested: Amount, remaining: Amount },

    #[error("Principal {requested} does not match offer principal {expected}")]
    PrincipalMismatch { requested: Amount, expected: Amount },

    #[error("Collateral {offered} does not match the offer's collateral")]
    CollateralMismatch { offered: String },

    #[error("Sale price {price} is below worst-case debt {required}")]
    PriceBelowDebt { price: Amount, required: Amount },

    #[error("Payment {payment} is below required amount {required}")]
    PaymentTooLow { payment: Amount, required: Amount },

    #[error("Bid {bid} does not beat current highest {highest}")]
    BidTooLow { bid: Amount, highest: Amount },

    #[error("Bid {bid} is below starting bid {starting}")]
    BidBelowStarting { bid: Amount, starting: Amount },

    #[error("Claimant set is malformed: {reason}")]
    InvalidClaimants { reason: &'static str },

    #[error("Origination fee rate {bps} bps exceeds 100%")]
    FeeRateTooHigh { bps: u64 },
}

/// Caller is not the required role for the requested action
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Caller {caller} is not the lender of record")]
    NotLender { caller: String },

    #[error("Caller {caller} is not the borrower of record")]
    NotBorrower { caller: String },

    #[error("Caller {caller} is not the listing's seller")]
    NotSeller { caller: String },

    #[error("Caller {caller} is not the designated claimant")]
    NotClaimant { caller: String },

    #[error("Lender {caller} cannot accept their own offer")]
    SelfDeal { caller: String },
}

/// Entity is not in the required state for the requested action
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Offer not found: {id}")]
    OfferNotFound { id: String },

    #[error("Offer {id} is not active")]
    OfferNotActive { id: String },

    #[error("Offer {id} expired at {expires_at} (now: {now})")]
    OfferExpired {
        id: String,
        expires_at: Timestamp,
        now: Timestamp,
    },

    #[error("Loan not found: {id}")]
    LoanNotFound { id: String },

    #[error("Loan {id} is not active (status: {status})")]
    LoanNotActive { id: String, status: String },

    #[error("Loan {id} is past due (due: {due_time}, now: {now})")]
    LoanPastDue {
        id: String,
        due_time: Timestamp,
        now: Timestamp,
    },

    #[error("Loan {id} is not in default (due: {due_time}, now: {now})")]
    LoanNotInDefault {
        id: String,
        due_time: Timestamp,
        now: Timestamp,
    },

    #[error("Proposal not found: {id}")]
    ProposalNotFound { id: String },

    #[error("Proposal {id} was already consumed")]
    ProposalConsumed { id: String },

    #[error("Listing not found: {id}")]
    ListingNotFound { id: String },

    #[error("Listing {id} is not active")]
    ListingNotActive { id: String },

    #[error("Loan {loan_id} already has an active listing")]
    ListingExists { loan_id: String },

    #[error("Auction not found: {id}")]
    AuctionNotFound { id: String },

    #[error("Auction {id} is not active")]
    AuctionNotActive { id: String },

    #[error("Auction {id} is still running (ends: {end_time}, now: {now})")]
    AuctionStillRunning {
        id: String,
        end_time: Timestamp,
        now: Timestamp,
    },

    #[error("Auction {id} already ended (ended: {end_time}, now: {now})")]
    AuctionEnded {
        id: String,
        end_time: Timestamp,
        now: Timestamp,
    },

    #[error("Auction {id} is not in state {expected}")]
    AuctionWrongOutcome { id: String, expected: &'static str },

    #[error("Loan {loan_id} already has an open auction")]
    AuctionExists { loan_id: String },

    #[error("Loan {loan_id} has an open buyout window")]
    BuyoutOpen { loan_id: String },

    #[error("No open buyout for loan {loan_id}")]
    BuyoutNotOpen { loan_id: String },

    #[error("Buyout for loan {loan_id} expired at {deadline} (now: {now})")]
    BuyoutExpired {
        loan_id: String,
        deadline: Timestamp,
        now: Timestamp,
    },

    #[error("Entity {key} is busy with another operation")]
    Busy { key: String },
}

/// A required fungible transfer could not be performed
#[derive(Debug, Error)]
pub enum FundsError {
    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: Amount, available: Amount },

    #[error("Transfer rejected: {reason}")]
    TransferRejected { reason: String },
}

/// Collateral custody could not be taken or released
#[derive(Debug, Error)]
pub enum CustodyError {
    #[error("Asset not found: {asset}")]
    AssetNotFound { asset: String },

    #[error("{holder} is not the verified holder of {asset}")]
    NotHolder { asset: String, holder: String },

    #[error("Asset {asset} is already under escrow")]
    AlreadyEscrowed { asset: String },

    #[error("Asset {asset} is not under escrow")]
    NotEscrowed { asset: String },

    #[error("Asset {asset} is escrowed for a different loan")]
    WrongLoan { asset: String },
}

/// Result type alias for Covenant operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Get a stable, machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Auth(_) => "unauthorized",
            Self::State(_) => "invalid_state",
            Self::Funds(_) => "funds",
            Self::Custody(_) => "custody",
            Self::Overflow { .. } => "overflow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err: Error = ValidationError::ZeroAmount { field: "principal" }.into();
        assert_eq!(err.error_code(), "validation");

        let err: Error = FundsError::InsufficientBalance {
            required: 100,
            available: 50,
        }
        .into();
        assert_eq!(err.error_code(), "funds");

        let err: Error = StateError::Busy {
            key: "loan:x".into(),
        }
        .into();
        assert_eq!(err.error_code(), "invalid_state");
    }

    #[test]
    fn test_error_display() {
        let err: Error = CustodyError::NotEscrowed {
            asset: "punks/42".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Custody error: Asset punks/42 is not under escrow"
        );
    }
}
