//! Loan ledger
//!
//! The central state machine. Loans are created from accepted offers and can
//! only change status through the transition methods here, each of which
//! caches accrued interest on the way out of Active so later reads are frozen.

use std::collections::HashMap;

use covenant_core::errors::{AuthError, Result, StateError, ValidationError};
use covenant_core::types::{
    AccountId, Amount, BasisPoints, LoanId, ProposalId, Timestamp,
};

use crate::calculator;
use crate::state::{Loan, LoanStatus, RenegotiationProposal};

#[derive(Debug, Default)]
pub struct LoanLedger {
    loans: HashMap<LoanId, Loan>,
    proposals: HashMap<ProposalId, RenegotiationProposal>,
}

impl LoanLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: LoanId) -> Result<&Loan> {
        self.loans
            .get(&id)
            .ok_or_else(|| StateError::LoanNotFound { id: id.to_string() }.into())
    }

    fn get_mut(&mut self, id: LoanId) -> Result<&mut Loan> {
        self.loans
            .get_mut(&id)
            .ok_or_else(|| StateError::LoanNotFound { id: id.to_string() }.into())
    }

    /// Require the loan to be Active
    pub fn get_active(&self, id: LoanId) -> Result<&Loan> {
        let loan = self.get(id)?;
        if loan.status != LoanStatus::Active {
            return Err(StateError::LoanNotActive {
                id: id.to_string(),
                status: loan.status.to_string(),
            }
            .into());
        }
        Ok(loan)
    }

    pub fn insert(&mut self, loan: Loan) {
        self.loans.insert(loan.id, loan);
    }

    /// Interest owed right now. Live loans accrue up to the due time; loans
    /// that have left Active return the interest cached at resolution.
    pub fn calculate_interest(
        &self,
        id: LoanId,
        now: Timestamp,
        seconds_per_year: u64,
    ) -> Result<Amount> {
        let loan = self.get(id)?;
        match loan.status {
            LoanStatus::Active => calculator::accrued_interest(
                loan.principal,
                loan.apr_bps,
                loan.accrual_elapsed(now),
                seconds_per_year,
            ),
            _ => Ok(loan.accrued_interest),
        }
    }

    /// Active -> Repaid, caching the settled interest
    pub fn mark_repaid(&mut self, id: LoanId, interest: Amount) -> Result<()> {
        let loan = self.get_mut(id)?;
        if loan.status != LoanStatus::Active {
            return Err(StateError::LoanNotActive {
                id: id.to_string(),
                status: loan.status.to_string(),
            }
            .into());
        }
        loan.status = LoanStatus::Repaid;
        loan.accrued_interest = interest;
        Ok(())
    }

    /// Active -> Defaulted, caching full-term interest
    pub fn mark_defaulted(&mut self, id: LoanId, interest: Amount) -> Result<()> {
        let loan = self.get_mut(id)?;
        if loan.status != LoanStatus::Active {
            return Err(StateError::LoanNotActive {
                id: id.to_string(),
                status: loan.status.to_string(),
            }
            .into());
        }
        loan.status = LoanStatus::Defaulted;
        loan.accrued_interest = interest;
        Ok(())
    }

    /// Active/Defaulted -> Liquidated. When coming from Active the caller
    /// supplies the interest to cache; from Defaulted the cache is kept.
    pub fn mark_liquidated(&mut self, id: LoanId, interest: Option<Amount>) -> Result<()> {
        let loan = self.get_mut(id)?;
        match loan.status {
            LoanStatus::Active => {
                loan.accrued_interest = interest.unwrap_or(loan.accrued_interest);
            }
            LoanStatus::Defaulted => {}
            _ => {
                return Err(StateError::LoanNotActive {
                    id: id.to_string(),
                    status: loan.status.to_string(),
                }
                .into())
            }
        }
        loan.status = LoanStatus::Liquidated;
        Ok(())
    }

    /// Active -> Refinanced, caching interest settled by the new lender
    pub fn mark_refinanced(&mut self, id: LoanId, interest: Amount) -> Result<()> {
        let loan = self.get_mut(id)?;
        if loan.status != LoanStatus::Active {
            return Err(StateError::LoanNotActive {
                id: id.to_string(),
                status: loan.status.to_string(),
            }
            .into());
        }
        loan.status = LoanStatus::Refinanced;
        loan.accrued_interest = interest;
        Ok(())
    }

    /// Rewrite an active loan's terms in place (renegotiation acceptance).
    /// The accrual window restarts at `now` and cached interest resets.
    pub fn rewrite_terms(
        &mut self,
        id: LoanId,
        principal: Amount,
        apr_bps: BasisPoints,
        duration_secs: u64,
        now: Timestamp,
    ) -> Result<()> {
        let loan = self.get_mut(id)?;
        if loan.status != LoanStatus::Active {
            return Err(StateError::LoanNotActive {
                id: id.to_string(),
                status: loan.status.to_string(),
            }
            .into());
        }
        loan.principal = principal;
        loan.apr_bps = apr_bps;
        loan.start_time = now;
        loan.due_time = now + duration_secs;
        loan.accrued_interest = 0;
        Ok(())
    }

    /// Create a single-use renegotiation proposal; proposer must be the
    /// loan's current lender and the loan must be Active.
    pub fn create_proposal(
        &mut self,
        loan_id: LoanId,
        proposer: &AccountId,
        principal: Amount,
        apr_bps: BasisPoints,
        duration_secs: u64,
    ) -> Result<ProposalId> {
        let loan = self.get_active(loan_id)?;
        if loan.lender != *proposer {
            return Err(AuthError::NotLender {
                caller: proposer.to_string(),
            }
            .into());
        }
        if principal == 0 {
            return Err(ValidationError::ZeroAmount { field: "principal" }.into());
        }
        if duration_secs == 0 {
            return Err(ValidationError::ZeroAmount { field: "duration" }.into());
        }
        let id = ProposalId::generate();
        self.proposals.insert(
            id,
            RenegotiationProposal {
                id,
                loan_id,
                proposer: proposer.clone(),
                principal,
                apr_bps,
                duration_secs,
                accepted: false,
            },
        );
        Ok(id)
    }

    pub fn proposal(&self, id: ProposalId) -> Result<&RenegotiationProposal> {
        let proposal = self
            .proposals
            .get(&id)
            .ok_or_else(|| StateError::ProposalNotFound { id: id.to_string() })?;
        if proposal.accepted {
            return Err(StateError::ProposalConsumed { id: id.to_string() }.into());
        }
        Ok(proposal)
    }

    /// Mark a proposal consumed. A consumed or unknown proposal fails
    /// explicitly, never silently succeeds.
    pub fn consume_proposal(&mut self, id: ProposalId) -> Result<()> {
        let proposal = self
            .proposals
            .get_mut(&id)
            .ok_or_else(|| StateError::ProposalNotFound { id: id.to_string() })?;
        if proposal.accepted {
            return Err(StateError::ProposalConsumed { id: id.to_string() }.into());
        }
        proposal.accepted = true;
        Ok(())
    }
}
