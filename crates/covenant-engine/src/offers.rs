//! Offer registry
//!
//! Creates, tracks, and cancels loan offers. Offers are never deleted, only
//! deactivated, so accepted history stays queryable. Allow-list checks happen
//! in the façade (they need collaborators); everything shape- and
//! state-related lives here.

use std::collections::HashMap;

use covenant_core::errors::{AuthError, Result, StateError, ValidationError};
use covenant_core::types::{
    constants::BPS_DENOM, AccountId, Amount, AssetRef, BasisPoints, CurrencyId, OfferId, Timestamp,
};

use crate::state::{Offer, OfferKind};

/// Parameters for a new offer
#[derive(Debug, Clone)]
pub struct OfferParams {
    pub lender: AccountId,
    pub kind: OfferKind,
    pub currency: CurrencyId,
    pub apr_bps: BasisPoints,
    pub duration_secs: u64,
    pub expires_at: Timestamp,
    pub origination_fee_bps: BasisPoints,
}

#[derive(Debug, Default)]
pub struct OfferBook {
    offers: HashMap<OfferId, Offer>,
}

impl OfferBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: OfferId) -> Result<&Offer> {
        self.offers
            .get(&id)
            .ok_or_else(|| StateError::OfferNotFound { id: id.to_string() }.into())
    }

    /// Validate shape and store a new active offer under a fresh id
    pub fn insert(&mut self, params: OfferParams, now: Timestamp) -> Result<OfferId> {
        if params.duration_secs == 0 {
            return Err(ValidationError::ZeroAmount { field: "duration" }.into());
        }
        if params.expires_at <= now {
            return Err(ValidationError::ExpirationInPast {
                expires_at: params.expires_at,
                now,
            }
            .into());
        }
        if params.origination_fee_bps > BPS_DENOM {
            return Err(ValidationError::FeeRateTooHigh {
                bps: params.origination_fee_bps,
            }
            .into());
        }
        match &params.kind {
            OfferKind::Standard { principal, .. } => {
                if *principal == 0 {
                    return Err(ValidationError::ZeroAmount { field: "principal" }.into());
                }
            }
            OfferKind::Collection {
                total_capacity,
                max_principal_per_loan,
                ..
            } => {
                if *total_capacity == 0 {
                    return Err(ValidationError::ZeroAmount {
                        field: "total capacity",
                    }
                    .into());
                }
                if *max_principal_per_loan == 0 {
                    return Err(ValidationError::ZeroAmount {
                        field: "per-loan principal cap",
                    }
                    .into());
                }
                if *max_principal_per_loan > *total_capacity {
                    return Err(ValidationError::CapacityShape {
                        max_per_loan: *max_principal_per_loan,
                        capacity: *total_capacity,
                    }
                    .into());
                }
            }
        }

        // a fresh offer starts with nothing drawn, whatever the caller passed
        let mut kind = params.kind;
        if let OfferKind::Collection { drawn, .. } = &mut kind {
            *drawn = 0;
        }

        let id = OfferId::generate();
        let offer = Offer {
            id,
            lender: params.lender,
            kind,
            currency: params.currency,
            apr_bps: params.apr_bps,
            duration_secs: params.duration_secs,
            expires_at: params.expires_at,
            origination_fee_bps: params.origination_fee_bps,
            active: true,
        };
        self.offers.insert(id, offer);
        Ok(id)
    }

    /// Deactivate an offer; lender-only, and only while still active
    pub fn cancel(&mut self, id: OfferId, caller: &AccountId) -> Result<()> {
        let offer = self
            .offers
            .get_mut(&id)
            .ok_or_else(|| StateError::OfferNotFound { id: id.to_string() })?;
        if offer.lender != *caller {
            return Err(AuthError::NotLender {
                caller: caller.to_string(),
            }
            .into());
        }
        if !offer.active {
            return Err(StateError::OfferNotActive { id: id.to_string() }.into());
        }
        offer.active = false;
        Ok(())
    }

    /// Check that `caller` may draw `principal` against `asset` right now.
    /// Pure: no state is touched.
    pub fn validate_draw(
        &self,
        id: OfferId,
        caller: &AccountId,
        asset: &AssetRef,
        principal: Amount,
        now: Timestamp,
    ) -> Result<()> {
        let offer = self.get(id)?;
        if !offer.active {
            return Err(StateError::OfferNotActive { id: id.to_string() }.into());
        }
        if now >= offer.expires_at {
            return Err(StateError::OfferExpired {
                id: id.to_string(),
                expires_at: offer.expires_at,
                now,
            }
            .into());
        }
        if offer.lender == *caller {
            return Err(AuthError::SelfDeal {
                caller: caller.to_string(),
            }
            .into());
        }
        if !offer.collateral_matches(asset) {
            return Err(ValidationError::CollateralMismatch {
                offered: asset.to_string(),
            }
            .into());
        }
        if principal == 0 {
            return Err(ValidationError::ZeroAmount { field: "principal" }.into());
        }
        match &offer.kind {
            OfferKind::Standard {
                principal: fixed, ..
            } => {
                if principal != *fixed {
                    return Err(ValidationError::PrincipalMismatch {
                        requested: principal,
                        expected: *fixed,
                    }
                    .into());
                }
            }
            OfferKind::Collection {
                max_principal_per_loan,
                ..
            } => {
                if principal > *max_principal_per_loan {
                    return Err(ValidationError::AboveLoanCap {
                        requested: principal,
                        max_per_loan: *max_principal_per_loan,
                    }
                    .into());
                }
                let remaining = offer.remaining_capacity();
                if principal > remaining {
                    return Err(ValidationError::CapacityExceeded {
                        requested: principal,
                        remaining,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Record an accepted draw: standard offers deactivate immediately,
    /// collection offers increment `drawn` and deactivate on exhaustion.
    /// Callers must have passed [`Self::validate_draw`] in the same operation.
    pub fn apply_draw(&mut self, id: OfferId, principal: Amount) -> Result<()> {
        let offer = self
            .offers
            .get_mut(&id)
            .ok_or_else(|| StateError::OfferNotFound { id: id.to_string() })?;
        match &mut offer.kind {
            OfferKind::Standard { .. } => {
                offer.active = false;
            }
            OfferKind::Collection {
                total_capacity,
                drawn,
                ..
            } => {
                *drawn += principal;
                if *drawn >= *total_capacity {
                    offer.active = false;
                }
            }
        }
        Ok(())
    }
}
