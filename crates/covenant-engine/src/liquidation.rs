//! Liquidation entry points
//!
//! Auctions and buyouts over defaulted collateral, driven through the façade
//! so bids, refunds, proceeds, and custody all run through the same atomic
//! machinery as every other resolution path. Auctions are only ever opened
//! through the protocol's default path here, never directly on the house.

use covenant_core::errors::{AuthError, Result, StateError};
use covenant_core::types::{AccountId, Amount, AuctionId, LoanId};

use crate::calculator;
use crate::engine::{auction_key, execute_plan, loan_key, unwind_plan, LendingEngine, TransferStep};
use crate::state::{AuctionStatus, Claimant, LoanStatus};

impl LendingEngine {
    /// Default path: mark the loan defaulted (if it still reads Active) and
    /// open an English auction over its collateral. Lender-only.
    pub fn liquidate_by_auction(
        &mut self,
        loan_id: LoanId,
        caller: &AccountId,
        starting_bid: Amount,
        duration_secs: u64,
    ) -> Result<AuctionId> {
        let key = loan_key(loan_id);
        self.guards.enter(key.clone())?;
        let out = self.liquidate_by_auction_locked(loan_id, caller, starting_bid, duration_secs);
        self.guards.exit(&key);
        out
    }

    fn liquidate_by_auction_locked(
        &mut self,
        loan_id: LoanId,
        caller: &AccountId,
        starting_bid: Amount,
        duration_secs: u64,
    ) -> Result<AuctionId> {
        let now = self.now();
        let loan = self.require_defaultable(loan_id, caller, now)?;
        let asset = loan.asset.clone();
        let currency = loan.currency.clone();
        let lender = loan.lender.clone();
        let was_active = loan.status == LoanStatus::Active;

        let claimants = vec![Claimant {
            account: lender.clone(),
            weight: 100,
        }];
        let auction_id = self.auctions.open_auction(
            loan_id,
            asset,
            currency,
            starting_bid,
            duration_secs,
            claimants,
            now,
        )?;
        if was_active {
            let interest = self.default_interest(loan_id)?;
            self.loans.mark_defaulted(loan_id, interest)?;
        }
        self.listings.close_for_loan(loan_id);
        tracing::info!(
            auction_id = %auction_id,
            loan_id = %loan_id,
            starting_bid,
            duration_secs,
            "default auction opened"
        );
        Ok(auction_id)
    }

    /// Bid on an active auction. The new bidder's funds are pulled before the
    /// displaced bidder is refunded, and the refund completes within this
    /// call or the whole bid fails.
    pub fn place_bid(
        &mut self,
        auction_id: AuctionId,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let key = auction_key(auction_id);
        self.guards.enter(key.clone())?;
        let out = self.place_bid_locked(auction_id, caller, amount);
        self.guards.exit(&key);
        out
    }

    fn place_bid_locked(
        &mut self,
        auction_id: AuctionId,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        let now = self.now();
        let displaced = self.auctions.check_bid(auction_id, amount, now)?;
        let currency = self.auctions.get(auction_id)?.currency.clone();
        let treasury = self.config.treasury.clone();

        let mut plan = vec![TransferStep::new(&currency, caller, &treasury, amount)];
        if let Some((prev_bidder, prev_amount)) = &displaced {
            plan.push(TransferStep::new(
                &currency,
                &treasury,
                prev_bidder,
                *prev_amount,
            ));
        }
        execute_plan(self.funds.as_ref(), &plan)?;

        self.auctions.commit_bid(auction_id, caller.clone(), amount)?;
        tracing::info!(
            auction_id = %auction_id,
            bidder = %caller,
            amount,
            displaced = ?displaced,
            "bid placed"
        );
        Ok(())
    }

    /// Finalize a past-end auction to its outcome. Callable by anyone; moves
    /// no funds or assets.
    pub fn end_auction(&mut self, auction_id: AuctionId) -> Result<AuctionStatus> {
        let key = auction_key(auction_id);
        self.guards.enter(key.clone())?;
        let now = self.now();
        let out = self.auctions.finalize(auction_id, now);
        self.guards.exit(&key);
        if let Ok(status) = &out {
            tracing::info!(auction_id = %auction_id, status = %status, "auction ended");
        }
        out
    }

    /// Settle a sold auction: pro-rata proceeds to the claimants, collateral
    /// to the winner, loan Liquidated, auction Settled. Floor-division dust
    /// stays in the treasury rather than blocking settlement.
    pub fn distribute_proceeds(&mut self, auction_id: AuctionId) -> Result<()> {
        let key = auction_key(auction_id);
        self.guards.enter(key.clone())?;
        let out = self.distribute_proceeds_locked(auction_id);
        self.guards.exit(&key);
        out
    }

    fn distribute_proceeds_locked(&mut self, auction_id: AuctionId) -> Result<()> {
        let auction = self
            .auctions
            .get_with_outcome(auction_id, AuctionStatus::EndedSold)?;
        let loan_id = auction.loan_id;
        let asset = auction.asset.clone();
        let currency = auction.currency.clone();
        let proceeds = auction.highest_bid;
        let winner = auction
            .highest_bidder
            .clone()
            .ok_or(StateError::AuctionWrongOutcome {
                id: auction_id.to_string(),
                expected: "endedSold",
            })?;
        let total_weight = auction.total_weight();
        let claimants = auction.claimants.clone();
        let treasury = self.config.treasury.clone();

        let mut plan = Vec::with_capacity(claimants.len());
        let mut distributed: Amount = 0;
        for claimant in &claimants {
            let share = calculator::pro_rata(proceeds, claimant.weight, total_weight)?;
            distributed += share;
            plan.push(TransferStep::new(
                &currency,
                &treasury,
                &claimant.account,
                share,
            ));
        }
        execute_plan(self.funds.as_ref(), &plan)?;
        if let Err(e) = self.escrow.release(&asset, &winner, loan_id) {
            unwind_plan(self.funds.as_ref(), &plan);
            return Err(e);
        }

        self.loans.mark_liquidated(loan_id, None)?;
        self.auctions.mark_settled(auction_id)?;
        tracing::info!(
            auction_id = %auction_id,
            loan_id = %loan_id,
            winner = %winner,
            proceeds,
            dust = proceeds - distributed,
            "auction proceeds distributed"
        );
        Ok(())
    }

    /// Return unsold collateral to the senior claimant and settle the auction.
    pub fn claim_collateral_post_auction(&mut self, auction_id: AuctionId) -> Result<()> {
        let key = auction_key(auction_id);
        self.guards.enter(key.clone())?;
        let out = self.claim_post_auction_locked(auction_id);
        self.guards.exit(&key);
        out
    }

    fn claim_post_auction_locked(&mut self, auction_id: AuctionId) -> Result<()> {
        let auction = self
            .auctions
            .get_with_outcome(auction_id, AuctionStatus::EndedNoBids)?;
        let loan_id = auction.loan_id;
        let asset = auction.asset.clone();
        let senior = auction.claimants[0].account.clone();

        self.escrow.release(&asset, &senior, loan_id)?;
        self.loans.mark_liquidated(loan_id, None)?;
        self.auctions.mark_settled(auction_id)?;
        tracing::info!(
            auction_id = %auction_id,
            loan_id = %loan_id,
            claimant = %senior,
            "unsold collateral returned to claimant"
        );
        Ok(())
    }

    /// Open a fixed-price, time-boxed buyout window for a designated senior
    /// claimant, ahead of (and mutually exclusive with) any auction.
    pub fn initiate_buyout(
        &mut self,
        loan_id: LoanId,
        caller: &AccountId,
        designated: AccountId,
        price: Amount,
        window_secs: u64,
    ) -> Result<()> {
        let key = loan_key(loan_id);
        self.guards.enter(key.clone())?;
        let out = self.initiate_buyout_locked(loan_id, caller, designated, price, window_secs);
        self.guards.exit(&key);
        out
    }

    fn initiate_buyout_locked(
        &mut self,
        loan_id: LoanId,
        caller: &AccountId,
        designated: AccountId,
        price: Amount,
        window_secs: u64,
    ) -> Result<()> {
        let now = self.now();
        let loan = self.require_defaultable(loan_id, caller, now)?;
        let lender = loan.lender.clone();
        let was_active = loan.status == LoanStatus::Active;

        let claimants = vec![Claimant {
            account: lender,
            weight: 100,
        }];
        self.auctions.open_buyout(
            loan_id,
            designated.clone(),
            claimants,
            price,
            now + window_secs,
            now,
        )?;
        if was_active {
            let interest = self.default_interest(loan_id)?;
            self.loans.mark_defaulted(loan_id, interest)?;
        }
        self.listings.close_for_loan(loan_id);
        tracing::info!(
            loan_id = %loan_id,
            claimant = %designated,
            price,
            window_secs,
            "buyout window opened"
        );
        Ok(())
    }

    /// Execute an open buyout: the designated claimant pays the fixed price,
    /// split pro-rata among the other claimants, and takes the collateral.
    pub fn execute_buyout(&mut self, loan_id: LoanId, caller: &AccountId) -> Result<()> {
        let key = loan_key(loan_id);
        self.guards.enter(key.clone())?;
        let out = self.execute_buyout_locked(loan_id, caller);
        self.guards.exit(&key);
        out
    }

    fn execute_buyout_locked(&mut self, loan_id: LoanId, caller: &AccountId) -> Result<()> {
        let now = self.now();
        let buyout = self.auctions.get_open_buyout(loan_id, now)?;
        if buyout.claimant != *caller {
            return Err(AuthError::NotClaimant {
                caller: caller.to_string(),
            }
            .into());
        }
        let price = buyout.price;
        let total_weight = buyout.total_weight();
        let claimants = buyout.claimants.clone();
        let asset = self.loans.get(loan_id)?.asset.clone();
        let currency = self.loans.get(loan_id)?.currency.clone();

        let mut plan = Vec::with_capacity(claimants.len());
        for claimant in &claimants {
            if claimant.account == *caller {
                continue;
            }
            let share = calculator::pro_rata(price, claimant.weight, total_weight)?;
            plan.push(TransferStep::new(&currency, caller, &claimant.account, share));
        }
        execute_plan(self.funds.as_ref(), &plan)?;
        if let Err(e) = self.escrow.release(&asset, caller, loan_id) {
            unwind_plan(self.funds.as_ref(), &plan);
            return Err(e);
        }

        self.loans.mark_liquidated(loan_id, None)?;
        self.auctions.complete_buyout(loan_id)?;
        tracing::info!(
            loan_id = %loan_id,
            buyer = %caller,
            price,
            "buyout executed"
        );
        Ok(())
    }

    /// Shared default-path gate: loan Active-past-due or Defaulted, caller is
    /// the lender, and no competing liquidation owns the collateral.
    fn require_defaultable(
        &self,
        loan_id: LoanId,
        caller: &AccountId,
        now: u64,
    ) -> Result<&crate::state::Loan> {
        let loan = self.loans.get(loan_id)?;
        if !matches!(loan.status, LoanStatus::Active | LoanStatus::Defaulted) {
            return Err(StateError::LoanNotActive {
                id: loan_id.to_string(),
                status: loan.status.to_string(),
            }
            .into());
        }
        if loan.lender != *caller {
            return Err(AuthError::NotLender {
                caller: caller.to_string(),
            }
            .into());
        }
        if !loan.is_in_default(now) {
            return Err(StateError::LoanNotInDefault {
                id: loan_id.to_string(),
                due_time: loan.due_time,
                now,
            }
            .into());
        }
        Ok(loan)
    }

    /// Full-term interest, cached when a loan transitions to Defaulted
    fn default_interest(&self, loan_id: LoanId) -> Result<Amount> {
        let loan = self.loans.get(loan_id)?;
        calculator::max_interest(
            loan.principal,
            loan.apr_bps,
            loan.due_time - loan.start_time,
            self.config.seconds_per_year,
        )
    }
}
