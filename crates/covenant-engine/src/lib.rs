//! Covenant lending engine
//!
//! Peer-to-peer collateralized lending: lenders post offers against
//! non-fungible collateral, borrowers accept them into interest-accruing
//! loans, and loans resolve by repayment, renegotiation, refinance,
//! third-party sale, default claim, auction, or buyout. An optional adapter
//! lets accrued external royalty income pay debt down first.
//!
//! # Architecture
//!
//! [`LendingEngine`] is a thin façade over the offer book, loan ledger,
//! escrow ledger, listing book, and auction house. All external effects run
//! through collaborator traits injected at construction; every mutating call
//! is atomic — it fully applies or fully reverts.

pub mod auction;
pub mod calculator;
pub mod engine;
pub mod escrow;
pub mod liquidation;
pub mod loans;
pub mod offers;
pub mod resolution;
pub mod royalty;
pub mod state;

pub use auction::AuctionHouse;
pub use engine::{Collaborators, LendingEngine};
pub use escrow::EscrowLedger;
pub use loans::LoanLedger;
pub use offers::{OfferBook, OfferParams};
pub use resolution::ListingBook;
pub use royalty::RoyaltyAdapter;
pub use state::{
    Auction, AuctionStatus, Buyout, Claimant, Loan, LoanStatus, Offer, OfferKind,
    RenegotiationProposal, SaleListing,
};
