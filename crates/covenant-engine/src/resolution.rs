//! Resolution engine
//!
//! Repayment, renegotiation, refinance, default claim, and third-party sale
//! settlement. Every path resolves a loan through the loan ledger's single
//! set of transition methods and releases escrow at most once.

use std::collections::HashMap;

use covenant_core::errors::{AuthError, Result, StateError, ValidationError};
use covenant_core::types::{
    constants::BPS_DENOM, AccountId, Amount, AssetRef, BasisPoints, CurrencyId, ListingId, LoanId,
    ProposalId,
};

use crate::calculator;
use crate::engine::{execute_plan, loan_key, unwind_plan, LendingEngine, TransferStep};
use crate::state::{Loan, LoanStatus, SaleListing};

/// Sale listings, at most one active per loan
#[derive(Debug, Default)]
pub struct ListingBook {
    listings: HashMap<ListingId, SaleListing>,
    /// Active listing per loan; entries are removed on deactivation
    by_loan: HashMap<LoanId, ListingId>,
}

impl ListingBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ListingId) -> Result<&SaleListing> {
        self.listings
            .get(&id)
            .ok_or_else(|| StateError::ListingNotFound { id: id.to_string() }.into())
    }

    pub fn create(
        &mut self,
        loan_id: LoanId,
        seller: AccountId,
        asset: AssetRef,
        price: Amount,
        currency: CurrencyId,
    ) -> Result<ListingId> {
        if self.by_loan.contains_key(&loan_id) {
            return Err(StateError::ListingExists {
                loan_id: loan_id.to_string(),
            }
            .into());
        }
        let id = ListingId::generate();
        self.listings.insert(
            id,
            SaleListing {
                id,
                loan_id,
                seller,
                asset,
                price,
                currency,
                active: true,
            },
        );
        self.by_loan.insert(loan_id, id);
        Ok(id)
    }

    pub fn deactivate(&mut self, id: ListingId) -> Result<()> {
        let listing = self
            .listings
            .get_mut(&id)
            .ok_or_else(|| StateError::ListingNotFound { id: id.to_string() })?;
        if !listing.active {
            return Err(StateError::ListingNotActive { id: id.to_string() }.into());
        }
        listing.active = false;
        self.by_loan.remove(&listing.loan_id);
        Ok(())
    }

    /// Close the loan's active listing, if any, as part of loan resolution
    pub fn close_for_loan(&mut self, loan_id: LoanId) {
        if let Some(id) = self.by_loan.remove(&loan_id) {
            if let Some(listing) = self.listings.get_mut(&id) {
                listing.active = false;
            }
        }
    }
}

/// Loan fields snapshotted before mutation (keeps borrows simple)
struct LoanView {
    borrower: AccountId,
    lender: AccountId,
    asset: AssetRef,
    currency: CurrencyId,
    principal: Amount,
    apr_bps: BasisPoints,
    start_time: u64,
    due_time: u64,
    offer_id: covenant_core::types::OfferId,
    external_asset: Option<covenant_core::types::ExternalAssetId>,
    status: LoanStatus,
}

impl From<&Loan> for LoanView {
    fn from(loan: &Loan) -> Self {
        Self {
            borrower: loan.borrower.clone(),
            lender: loan.lender.clone(),
            asset: loan.asset.clone(),
            currency: loan.currency.clone(),
            principal: loan.principal,
            apr_bps: loan.apr_bps,
            start_time: loan.start_time,
            due_time: loan.due_time,
            offer_id: loan.offer_id,
            external_asset: loan.external_asset.clone(),
            status: loan.status,
        }
    }
}

impl LendingEngine {
    fn live_interest(&self, view: &LoanView, now: u64) -> Result<Amount> {
        calculator::accrued_interest(
            view.principal,
            view.apr_bps,
            now.min(view.due_time).saturating_sub(view.start_time),
            self.config.seconds_per_year,
        )
    }

    /// Repay an active loan at or before its due time. Principal plus
    /// interest moves borrower -> lender, collateral returns to the borrower,
    /// and the loan becomes Repaid, all-or-nothing.
    pub fn repay(&mut self, loan_id: LoanId, caller: &AccountId) -> Result<()> {
        let key = loan_key(loan_id);
        self.guards.enter(key.clone())?;
        let out = self.repay_locked(loan_id, caller);
        self.guards.exit(&key);
        out
    }

    fn repay_locked(&mut self, loan_id: LoanId, caller: &AccountId) -> Result<()> {
        let now = self.now();
        let view = LoanView::from(self.loans.get_active(loan_id)?);
        if view.borrower != *caller {
            return Err(AuthError::NotBorrower {
                caller: caller.to_string(),
            }
            .into());
        }
        if now > view.due_time {
            return Err(StateError::LoanPastDue {
                id: loan_id.to_string(),
                due_time: view.due_time,
                now,
            }
            .into());
        }
        let interest = self.live_interest(&view, now)?;
        let debt = calculator::total_debt(view.principal, interest)?;

        let plan = [TransferStep::new(
            &view.currency,
            &view.borrower,
            &view.lender,
            debt,
        )];
        execute_plan(self.funds.as_ref(), &plan)?;
        if let Err(e) = self.escrow.release(&view.asset, &view.borrower, loan_id) {
            unwind_plan(self.funds.as_ref(), &plan);
            return Err(e);
        }

        self.loans.mark_repaid(loan_id, interest)?;
        self.listings.close_for_loan(loan_id);
        tracing::info!(loan_id = %loan_id, debt, interest, "loan repaid");
        Ok(())
    }

    /// Lender's unilateral non-auction remedy: past the due time, take the
    /// collateral directly and close the loan as Liquidated.
    pub fn claim_collateral(&mut self, loan_id: LoanId, caller: &AccountId) -> Result<()> {
        let key = loan_key(loan_id);
        self.guards.enter(key.clone())?;
        let out = self.claim_collateral_locked(loan_id, caller);
        self.guards.exit(&key);
        out
    }

    fn claim_collateral_locked(&mut self, loan_id: LoanId, caller: &AccountId) -> Result<()> {
        let now = self.now();
        let loan = self.loans.get(loan_id)?;
        if !matches!(loan.status, LoanStatus::Active | LoanStatus::Defaulted) {
            return Err(StateError::LoanNotActive {
                id: loan_id.to_string(),
                status: loan.status.to_string(),
            }
            .into());
        }
        let view = LoanView::from(loan);
        if view.lender != *caller {
            return Err(AuthError::NotLender {
                caller: caller.to_string(),
            }
            .into());
        }
        if !self.loans.get(loan_id)?.is_in_default(now) {
            return Err(StateError::LoanNotInDefault {
                id: loan_id.to_string(),
                due_time: view.due_time,
                now,
            }
            .into());
        }
        // an unsettled auction or open buyout owns the collateral's fate
        if self.auctions.has_unsettled_auction(loan_id) {
            return Err(StateError::AuctionExists {
                loan_id: loan_id.to_string(),
            }
            .into());
        }
        if self.auctions.has_open_buyout(loan_id, now) {
            return Err(StateError::BuyoutOpen {
                loan_id: loan_id.to_string(),
            }
            .into());
        }

        self.escrow.release(&view.asset, &view.lender, loan_id)?;
        if view.status == LoanStatus::Active {
            let interest = self.live_interest(&view, now)?;
            self.loans.mark_defaulted(loan_id, interest)?;
        }
        self.loans.mark_liquidated(loan_id, None)?;
        self.listings.close_for_loan(loan_id);
        tracing::info!(loan_id = %loan_id, lender = %view.lender, "collateral claimed on default");
        Ok(())
    }

    /// Borrower lists the collateral of an active loan for sale at a price
    /// that can never leave the lender under-repaid.
    pub fn list_for_sale(
        &mut self,
        loan_id: LoanId,
        price: Amount,
        caller: &AccountId,
    ) -> Result<ListingId> {
        let key = loan_key(loan_id);
        self.guards.enter(key.clone())?;
        let out = self.list_for_sale_locked(loan_id, price, caller);
        self.guards.exit(&key);
        out
    }

    fn list_for_sale_locked(
        &mut self,
        loan_id: LoanId,
        price: Amount,
        caller: &AccountId,
    ) -> Result<ListingId> {
        let view = LoanView::from(self.loans.get_active(loan_id)?);
        if view.borrower != *caller {
            return Err(AuthError::NotBorrower {
                caller: caller.to_string(),
            }
            .into());
        }
        let worst_interest = calculator::max_interest(
            view.principal,
            view.apr_bps,
            view.due_time - view.start_time,
            self.config.seconds_per_year,
        )?;
        let required = calculator::total_debt(view.principal, worst_interest)?;
        if price < required {
            return Err(ValidationError::PriceBelowDebt { price, required }.into());
        }
        let id = self.listings.create(
            loan_id,
            view.borrower.clone(),
            view.asset.clone(),
            price,
            view.currency.clone(),
        )?;
        tracing::info!(listing_id = %id, loan_id = %loan_id, price, "collateral listed for sale");
        Ok(id)
    }

    /// Purchase a listed collateral unit: debt to the lender, surplus to the
    /// seller, asset to the buyer, loan Repaid, listing consumed — atomic.
    pub fn buy_listed(
        &mut self,
        listing_id: ListingId,
        caller: &AccountId,
        payment: Amount,
    ) -> Result<()> {
        let listing = self.listings.get(listing_id)?;
        if !listing.active {
            return Err(StateError::ListingNotActive {
                id: listing_id.to_string(),
            }
            .into());
        }
        let loan_id = listing.loan_id;
        let key = loan_key(loan_id);
        self.guards.enter(key.clone())?;
        let out = self.buy_listed_locked(listing_id, loan_id, caller, payment);
        self.guards.exit(&key);
        out
    }

    fn buy_listed_locked(
        &mut self,
        listing_id: ListingId,
        loan_id: LoanId,
        caller: &AccountId,
        payment: Amount,
    ) -> Result<()> {
        let now = self.now();
        let price = self.listings.get(listing_id)?.price;
        let view = LoanView::from(self.loans.get_active(loan_id)?);
        if payment < price {
            return Err(ValidationError::PaymentTooLow {
                payment,
                required: price,
            }
            .into());
        }
        let interest = self.live_interest(&view, now)?;
        let debt = calculator::total_debt(view.principal, interest)?;
        // renegotiation may have raised the debt past the listed price
        if payment < debt {
            return Err(ValidationError::PaymentTooLow {
                payment,
                required: debt,
            }
            .into());
        }

        let plan = [
            TransferStep::new(&view.currency, caller, &view.lender, debt),
            TransferStep::new(&view.currency, caller, &view.borrower, payment - debt),
        ];
        execute_plan(self.funds.as_ref(), &plan)?;
        if let Err(e) = self.escrow.release(&view.asset, caller, loan_id) {
            unwind_plan(self.funds.as_ref(), &plan);
            return Err(e);
        }

        self.loans.mark_repaid(loan_id, interest)?;
        self.listings.deactivate(listing_id)?;
        tracing::info!(
            listing_id = %listing_id,
            loan_id = %loan_id,
            buyer = %caller,
            payment,
            debt,
            "listed collateral sold, loan settled"
        );
        Ok(())
    }

    /// Deactivate a listing without side effects; seller-only
    pub fn cancel_listing(&mut self, listing_id: ListingId, caller: &AccountId) -> Result<()> {
        let listing = self.listings.get(listing_id)?;
        if !listing.active {
            return Err(StateError::ListingNotActive {
                id: listing_id.to_string(),
            }
            .into());
        }
        if listing.seller != *caller {
            return Err(AuthError::NotSeller {
                caller: caller.to_string(),
            }
            .into());
        }
        let loan_id = listing.loan_id;
        let key = loan_key(loan_id);
        self.guards.enter(key.clone())?;
        let out = self.listings.deactivate(listing_id);
        self.guards.exit(&key);
        if out.is_ok() {
            tracing::info!(listing_id = %listing_id, loan_id = %loan_id, "listing cancelled");
        }
        out
    }

    /// Lender proposes new terms for an active loan
    pub fn propose_renegotiation(
        &mut self,
        loan_id: LoanId,
        caller: &AccountId,
        principal: Amount,
        apr_bps: BasisPoints,
        duration_secs: u64,
    ) -> Result<ProposalId> {
        let id = self
            .loans
            .create_proposal(loan_id, caller, principal, apr_bps, duration_secs)?;
        tracing::info!(
            proposal_id = %id,
            loan_id = %loan_id,
            principal,
            apr_bps,
            duration_secs,
            "renegotiation proposed"
        );
        Ok(id)
    }

    /// Borrower accepts a proposal: the principal delta settles between the
    /// parties, terms rewrite with accrual restarting now, and the proposal
    /// is consumed. Consumed or unknown proposals fail explicitly.
    pub fn accept_renegotiation(&mut self, proposal_id: ProposalId, caller: &AccountId) -> Result<()> {
        let proposal = self.loans.proposal(proposal_id)?.clone();
        let key = loan_key(proposal.loan_id);
        self.guards.enter(key.clone())?;
        let out = self.accept_renegotiation_locked(proposal_id, caller);
        self.guards.exit(&key);
        out
    }

    fn accept_renegotiation_locked(
        &mut self,
        proposal_id: ProposalId,
        caller: &AccountId,
    ) -> Result<()> {
        let now = self.now();
        let proposal = self.loans.proposal(proposal_id)?.clone();
        let view = LoanView::from(self.loans.get_active(proposal.loan_id)?);
        if view.borrower != *caller {
            return Err(AuthError::NotBorrower {
                caller: caller.to_string(),
            }
            .into());
        }
        // a proposal from a since-replaced lender is stale
        if proposal.proposer != view.lender {
            return Err(AuthError::NotLender {
                caller: proposal.proposer.to_string(),
            }
            .into());
        }

        let plan = if proposal.principal >= view.principal {
            [TransferStep::new(
                &view.currency,
                &view.lender,
                &view.borrower,
                proposal.principal - view.principal,
            )]
        } else {
            [TransferStep::new(
                &view.currency,
                &view.borrower,
                &view.lender,
                view.principal - proposal.principal,
            )]
        };
        execute_plan(self.funds.as_ref(), &plan)?;

        self.loans.consume_proposal(proposal_id)?;
        self.loans.rewrite_terms(
            proposal.loan_id,
            proposal.principal,
            proposal.apr_bps,
            proposal.duration_secs,
            now,
        )?;
        tracing::info!(
            proposal_id = %proposal_id,
            loan_id = %proposal.loan_id,
            principal = proposal.principal,
            "renegotiation accepted, terms rewritten"
        );
        Ok(())
    }

    /// Replace the lender and terms of an active loan. The caller becomes the
    /// new lender, the old lender is paid off in full as of now, and the
    /// collateral stays in escrow, rebound to a brand-new loan.
    pub fn refinance(
        &mut self,
        old_loan_id: LoanId,
        caller: &AccountId,
        new_principal: Amount,
        new_apr_bps: BasisPoints,
        new_duration_secs: u64,
        new_fee_bps: BasisPoints,
    ) -> Result<LoanId> {
        let key = loan_key(old_loan_id);
        self.guards.enter(key.clone())?;
        let out = self.refinance_locked(
            old_loan_id,
            caller,
            new_principal,
            new_apr_bps,
            new_duration_secs,
            new_fee_bps,
        );
        self.guards.exit(&key);
        out
    }

    fn refinance_locked(
        &mut self,
        old_loan_id: LoanId,
        caller: &AccountId,
        new_principal: Amount,
        new_apr_bps: BasisPoints,
        new_duration_secs: u64,
        new_fee_bps: BasisPoints,
    ) -> Result<LoanId> {
        let now = self.now();
        if new_principal == 0 {
            return Err(ValidationError::ZeroAmount { field: "principal" }.into());
        }
        if new_duration_secs == 0 {
            return Err(ValidationError::ZeroAmount { field: "duration" }.into());
        }
        if new_fee_bps > BPS_DENOM {
            return Err(ValidationError::FeeRateTooHigh { bps: new_fee_bps }.into());
        }
        let view = LoanView::from(self.loans.get_active(old_loan_id)?);
        if view.borrower == *caller {
            return Err(AuthError::SelfDeal {
                caller: caller.to_string(),
            }
            .into());
        }

        let interest = self.live_interest(&view, now)?;
        let old_debt = calculator::total_debt(view.principal, interest)?;
        let fee = calculator::origination_fee(new_principal, new_fee_bps)?;

        let plan = [
            // new lender funds the payoff up to the new principal
            TransferStep::new(
                &view.currency,
                caller,
                &view.lender,
                new_principal.min(old_debt),
            ),
            // borrower tops up a shrinking refinance
            TransferStep::new(
                &view.currency,
                &view.borrower,
                &view.lender,
                old_debt.saturating_sub(new_principal),
            ),
            // principal increase beyond the payoff goes to the borrower
            TransferStep::new(
                &view.currency,
                caller,
                &view.borrower,
                new_principal.saturating_sub(old_debt),
            ),
            TransferStep::new(
                &view.currency,
                &view.borrower,
                &self.config.fee_recipient,
                fee,
            ),
        ];
        execute_plan(self.funds.as_ref(), &plan)?;

        let new_loan_id = LoanId::generate();
        if let Err(e) = self.escrow.reassign(&view.asset, old_loan_id, new_loan_id) {
            unwind_plan(self.funds.as_ref(), &plan);
            return Err(e);
        }
        self.loans.mark_refinanced(old_loan_id, interest)?;
        self.loans.insert(Loan {
            id: new_loan_id,
            offer_id: view.offer_id,
            borrower: view.borrower.clone(),
            lender: caller.clone(),
            asset: view.asset.clone(),
            currency: view.currency.clone(),
            principal: new_principal,
            apr_bps: new_apr_bps,
            origination_fee_paid: fee,
            start_time: now,
            due_time: now + new_duration_secs,
            accrued_interest: 0,
            status: LoanStatus::Active,
            external_asset: view.external_asset.clone(),
        });
        self.listings.close_for_loan(old_loan_id);
        tracing::info!(
            old_loan_id = %old_loan_id,
            new_loan_id = %new_loan_id,
            new_lender = %caller,
            new_principal,
            old_debt,
            "loan refinanced"
        );
        Ok(new_loan_id)
    }

    /// Apply up to `amount_due` of accrued royalty income for the loan's
    /// external asset to `recipient`, reporting the amount actually moved.
    /// Zero (unresolved asset, no source, nothing accrued) is a normal outcome.
    pub fn attempt_royalty_payment(
        &mut self,
        loan_id: LoanId,
        amount_due: Amount,
        recipient: &AccountId,
    ) -> Result<Amount> {
        let loan = self.loans.get(loan_id)?;
        let external = loan.external_asset.clone();
        let currency = loan.currency.clone();
        self.royalty
            .attempt_payment(external.as_ref(), &currency, amount_due, recipient)
    }

    /// Borrower repayment that spends royalty income first and tops the rest
    /// up from the borrower. When royalties cover the debt, no borrower
    /// transfer occurs at all. Returns the royalty amount applied.
    pub fn claim_and_repay(&mut self, loan_id: LoanId, caller: &AccountId) -> Result<Amount> {
        let key = loan_key(loan_id);
        self.guards.enter(key.clone())?;
        let out = self.claim_and_repay_locked(loan_id, caller);
        self.guards.exit(&key);
        out
    }

    fn claim_and_repay_locked(&mut self, loan_id: LoanId, caller: &AccountId) -> Result<Amount> {
        let now = self.now();
        let view = LoanView::from(self.loans.get_active(loan_id)?);
        if view.borrower != *caller {
            return Err(AuthError::NotBorrower {
                caller: caller.to_string(),
            }
            .into());
        }
        if now > view.due_time {
            return Err(StateError::LoanPastDue {
                id: loan_id.to_string(),
                due_time: view.due_time,
                now,
            }
            .into());
        }
        let interest = self.live_interest(&view, now)?;
        let debt = calculator::total_debt(view.principal, interest)?;

        let available = self
            .royalty
            .available(view.external_asset.as_ref(), &view.currency);
        let take = available.min(debt);
        let shortfall = debt - take;
        let treasury = self.config.treasury.clone();

        // borrower shortfall is staged in the treasury first: it is the only
        // leg that can legitimately fail, and it is fully reversible
        let staged = [TransferStep::new(
            &view.currency,
            &view.borrower,
            &treasury,
            shortfall,
        )];
        execute_plan(self.funds.as_ref(), &staged)?;

        let applied = match self.royalty.attempt_payment(
            view.external_asset.as_ref(),
            &view.currency,
            take,
            &view.lender,
        ) {
            Ok(applied) if applied == take => applied,
            Ok(applied) => {
                unwind_plan(self.funds.as_ref(), &staged);
                tracing::warn!(
                    loan_id = %loan_id,
                    expected = take,
                    applied,
                    "royalty source shorted the withdrawal, repayment aborted"
                );
                return Err(covenant_core::errors::FundsError::TransferRejected {
                    reason: "royalty source returned less than its reported balance".into(),
                }
                .into());
            }
            Err(e) => {
                unwind_plan(self.funds.as_ref(), &staged);
                return Err(e);
            }
        };

        let forward = [TransferStep::new(
            &view.currency,
            &treasury,
            &view.lender,
            shortfall,
        )];
        if let Err(e) = execute_plan(self.funds.as_ref(), &forward) {
            unwind_plan(self.funds.as_ref(), &staged);
            return Err(e);
        }
        if let Err(e) = self.escrow.release(&view.asset, &view.borrower, loan_id) {
            unwind_plan(self.funds.as_ref(), &forward);
            unwind_plan(self.funds.as_ref(), &staged);
            return Err(e);
        }

        self.loans.mark_repaid(loan_id, interest)?;
        self.listings.close_for_loan(loan_id);
        tracing::info!(
            loan_id = %loan_id,
            debt,
            royalties_applied = applied,
            borrower_paid = shortfall,
            "loan repaid with royalty income"
        );
        Ok(applied)
    }
}
