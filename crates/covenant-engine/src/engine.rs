//! The lending engine façade
//!
//! `LendingEngine` composes the offer book, loan ledger, escrow ledger,
//! listing book, and auction house behind one mutating surface, with all
//! collaborators injected at construction. Every mutating entry point takes a
//! per-entity exclusive-access guard for the duration of the call, and every
//! multi-leg fund movement runs through the compensating executor so a failed
//! leg restores pre-call balances.

use std::collections::HashSet;
use std::sync::Arc;

use covenant_core::clock::Clock;
use covenant_core::collab::{
    AssetCustody, CollectionAllowList, CurrencyAllowList, ExternalAssetRegistry, FungibleLedger,
    RoyaltySource,
};
use covenant_core::config::EngineConfig;
use covenant_core::errors::{Result, StateError, ValidationError};
use covenant_core::types::{
    AccountId, Amount, AssetRef, AuctionId, CurrencyId, ListingId, LoanId, OfferId, Timestamp,
};

use crate::auction::AuctionHouse;
use crate::calculator;
use crate::escrow::EscrowLedger;
use crate::loans::LoanLedger;
use crate::offers::{OfferBook, OfferParams};
use crate::resolution::ListingBook;
use crate::royalty::RoyaltyAdapter;
use crate::state::{Loan, LoanStatus, Offer, SaleListing};

/// Injected collaborator set wired into the engine at construction
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub currencies: Arc<dyn CurrencyAllowList>,
    pub collections: Arc<dyn CollectionAllowList>,
    pub funds: Arc<dyn FungibleLedger>,
    pub custody: Arc<dyn AssetCustody>,
    pub registry: Option<Arc<dyn ExternalAssetRegistry>>,
    pub royalties: Option<Arc<dyn RoyaltySource>>,
}

/// One fungible transfer leg of an atomic operation
#[derive(Debug, Clone)]
pub(crate) struct TransferStep {
    pub currency: CurrencyId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

impl TransferStep {
    pub fn new(currency: &CurrencyId, from: &AccountId, to: &AccountId, amount: Amount) -> Self {
        Self {
            currency: currency.clone(),
            from: from.clone(),
            to: to.clone(),
            amount,
        }
    }
}

/// Execute transfer legs in order. On a failed leg, completed legs are
/// reversed before the error is returned, so the caller observes all-or-nothing
/// balances. Zero-amount legs are skipped.
pub(crate) fn execute_plan(funds: &dyn FungibleLedger, steps: &[TransferStep]) -> Result<()> {
    for (idx, step) in steps.iter().enumerate() {
        if step.amount == 0 {
            continue;
        }
        if let Err(e) = funds.transfer(&step.currency, &step.from, &step.to, step.amount) {
            unwind_plan(funds, &steps[..idx]);
            return Err(e.into());
        }
    }
    Ok(())
}

/// Reverse already-completed legs, newest first. A reversal moves funds the
/// receiving account just got, so it cannot fail under the ledger contract;
/// a failure here is logged and skipped rather than masking the original error.
pub(crate) fn unwind_plan(funds: &dyn FungibleLedger, done: &[TransferStep]) {
    for step in done.iter().rev() {
        if step.amount == 0 {
            continue;
        }
        if let Err(e) = funds.transfer(&step.currency, &step.to, &step.from, step.amount) {
            tracing::error!(
                currency = %step.currency,
                from = %step.to,
                to = %step.from,
                amount = step.amount,
                error = %e,
                "failed to unwind transfer leg"
            );
        }
    }
}

/// Per-entity exclusive-access guard set. Mutating calls register their
/// entity before touching collaborators and release it on the way out;
/// a second call on the same entity mid-operation is rejected, not queued.
#[derive(Debug, Default)]
pub(crate) struct Guards {
    held: HashSet<String>,
}

impl Guards {
    pub fn enter(&mut self, key: String) -> Result<()> {
        if !self.held.insert(key.clone()) {
            return Err(StateError::Busy { key }.into());
        }
        Ok(())
    }

    pub fn exit(&mut self, key: &str) {
        self.held.remove(key);
    }
}

pub(crate) fn loan_key(id: LoanId) -> String {
    format!("loan:{id}")
}

pub(crate) fn offer_key(id: OfferId) -> String {
    format!("offer:{id}")
}

pub(crate) fn auction_key(id: AuctionId) -> String {
    format!("auction:{id}")
}

/// Loan lifecycle and collateral resolution engine
pub struct LendingEngine {
    pub(crate) config: EngineConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) currencies: Arc<dyn CurrencyAllowList>,
    pub(crate) collections: Arc<dyn CollectionAllowList>,
    pub(crate) funds: Arc<dyn FungibleLedger>,
    pub(crate) registry: Option<Arc<dyn ExternalAssetRegistry>>,
    pub(crate) royalty: RoyaltyAdapter,
    pub(crate) offers: OfferBook,
    pub(crate) loans: LoanLedger,
    pub(crate) escrow: EscrowLedger,
    pub(crate) listings: ListingBook,
    pub(crate) auctions: AuctionHouse,
    pub(crate) guards: Guards,
}

impl LendingEngine {
    pub fn new(config: EngineConfig, collab: Collaborators) -> Self {
        let escrow = EscrowLedger::new(collab.custody, config.treasury.clone());
        let royalty = RoyaltyAdapter::new(collab.registry.clone(), collab.royalties);
        Self {
            config,
            clock: collab.clock,
            currencies: collab.currencies,
            collections: collab.collections,
            funds: collab.funds,
            registry: collab.registry,
            royalty,
            offers: OfferBook::new(),
            loans: LoanLedger::new(),
            escrow,
            listings: ListingBook::new(),
            auctions: AuctionHouse::new(),
            guards: Guards::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ---- queries exposed to collaborators ----

    pub fn get_offer(&self, id: OfferId) -> Result<&Offer> {
        self.offers.get(id)
    }

    pub fn get_loan(&self, id: LoanId) -> Result<&Loan> {
        self.loans.get(id)
    }

    pub fn get_listing(&self, id: ListingId) -> Result<&SaleListing> {
        self.listings.get(id)
    }

    pub fn get_auction(&self, id: AuctionId) -> Result<&crate::state::Auction> {
        self.auctions.get(id)
    }

    pub fn get_buyout(&self, loan_id: LoanId) -> Option<&crate::state::Buyout> {
        self.auctions.buyout_for(loan_id)
    }

    /// Interest owed right now; frozen once the loan has left Active
    pub fn calculate_interest(&self, id: LoanId) -> Result<Amount> {
        self.loans
            .calculate_interest(id, self.now(), self.config.seconds_per_year)
    }

    /// Principal plus live interest
    pub fn current_debt(&self, id: LoanId) -> Result<Amount> {
        let interest = self.calculate_interest(id)?;
        calculator::total_debt(self.get_loan(id)?.principal, interest)
    }

    pub fn is_repayable(&self, id: LoanId) -> Result<bool> {
        Ok(self.get_loan(id)?.is_repayable(self.now()))
    }

    pub fn is_in_default(&self, id: LoanId) -> Result<bool> {
        Ok(self.get_loan(id)?.is_in_default(self.now()))
    }

    // ---- offer registry ----

    /// Create a loan offer. Funds are not pulled at offer time.
    pub fn make_offer(&mut self, params: OfferParams) -> Result<OfferId> {
        if !self.currencies.is_currency_supported(&params.currency) {
            return Err(ValidationError::UnsupportedCurrency {
                currency: params.currency.to_string(),
            }
            .into());
        }
        let collection = match &params.kind {
            crate::state::OfferKind::Standard { asset, .. } => &asset.collection,
            crate::state::OfferKind::Collection { collection, .. } => collection,
        };
        if !self.collections.is_collection_whitelisted(collection) {
            return Err(ValidationError::CollectionNotWhitelisted {
                collection: collection.to_string(),
            }
            .into());
        }
        let now = self.now();
        let lender = params.lender.clone();
        let id = self.offers.insert(params, now)?;
        tracing::info!(offer_id = %id, lender = %lender, "offer created");
        Ok(id)
    }

    /// Cancel a still-active offer; lender-only
    pub fn cancel_offer(&mut self, id: OfferId, caller: &AccountId) -> Result<()> {
        let key = offer_key(id);
        self.guards.enter(key.clone())?;
        let out = self.offers.cancel(id, caller);
        self.guards.exit(&key);
        if out.is_ok() {
            tracing::info!(offer_id = %id, "offer cancelled");
        }
        out
    }

    /// Accept an offer: escrow the collateral, move principal (net of the
    /// origination fee) to the borrower, and materialize the loan. Custody
    /// and loan creation either both commit or both roll back.
    pub fn accept_offer(
        &mut self,
        offer_id: OfferId,
        caller: &AccountId,
        asset: &AssetRef,
        principal: Amount,
    ) -> Result<LoanId> {
        let key = offer_key(offer_id);
        self.guards.enter(key.clone())?;
        let out = self.accept_offer_locked(offer_id, caller, asset, principal);
        self.guards.exit(&key);
        out
    }

    fn accept_offer_locked(
        &mut self,
        offer_id: OfferId,
        caller: &AccountId,
        asset: &AssetRef,
        principal: Amount,
    ) -> Result<LoanId> {
        let now = self.now();
        self.offers
            .validate_draw(offer_id, caller, asset, principal, now)?;
        let offer = self.offers.get(offer_id)?;
        let currency = offer.currency.clone();
        let lender = offer.lender.clone();
        let apr_bps = offer.apr_bps;
        let duration_secs = offer.duration_secs;
        let fee_bps = offer.origination_fee_bps;

        let fee = calculator::origination_fee(principal, fee_bps)?;
        // fee_bps <= 10_000 is enforced at offer creation
        let payout = principal - fee;

        let loan_id = LoanId::generate();
        let external_asset = self
            .registry
            .as_ref()
            .and_then(|r| r.resolve_external_id(asset));

        self.escrow.take_custody(asset, caller, loan_id)?;

        let plan = [
            TransferStep::new(&currency, &lender, caller, payout),
            TransferStep::new(&currency, &lender, &self.config.fee_recipient, fee),
        ];
        if let Err(e) = execute_plan(self.funds.as_ref(), &plan) {
            if let Err(unwind_err) = self.escrow.release(asset, caller, loan_id) {
                tracing::error!(
                    loan_id = %loan_id,
                    asset = %asset,
                    error = %unwind_err,
                    "failed to return collateral after aborted acceptance"
                );
            }
            return Err(e);
        }

        self.offers.apply_draw(offer_id, principal)?;
        self.loans.insert(Loan {
            id: loan_id,
            offer_id,
            borrower: caller.clone(),
            lender: lender.clone(),
            asset: asset.clone(),
            currency,
            principal,
            apr_bps,
            origination_fee_paid: fee,
            start_time: now,
            due_time: now + duration_secs,
            accrued_interest: 0,
            status: LoanStatus::Active,
            external_asset,
        });
        tracing::info!(
            loan_id = %loan_id,
            offer_id = %offer_id,
            borrower = %caller,
            lender = %lender,
            principal,
            "offer accepted, loan active"
        );
        Ok(loan_id)
    }
}
