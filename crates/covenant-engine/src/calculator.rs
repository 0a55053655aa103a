//! Interest, fee, and distribution arithmetic
//!
//! All money math lives here as pure checked-integer functions. Interest uses
//! floor division; the rounding direction is load-bearing and every
//! resolution path must go through these functions rather than re-deriving.

use covenant_core::errors::{Error, Result};
use covenant_core::types::{constants::BPS_DENOM, Amount, BasisPoints};

/// Interest accrued over `elapsed_secs`:
/// `principal * apr_bps * elapsed / (10_000 * seconds_per_year)`, floored.
pub fn accrued_interest(
    principal: Amount,
    apr_bps: BasisPoints,
    elapsed_secs: u64,
    seconds_per_year: u64,
) -> Result<Amount> {
    let numerator = principal
        .checked_mul(apr_bps as u128)
        .and_then(|n| n.checked_mul(elapsed_secs as u128))
        .ok_or(Error::Overflow {
            context: "interest accrual",
        })?;
    let denominator = (BPS_DENOM as u128)
        .checked_mul(seconds_per_year as u128)
        .filter(|d| *d > 0)
        .ok_or(Error::Overflow {
            context: "interest accrual base",
        })?;
    Ok(numerator / denominator)
}

/// Largest interest a loan can ever accrue (accrual stops at the due time)
pub fn max_interest(
    principal: Amount,
    apr_bps: BasisPoints,
    duration_secs: u64,
    seconds_per_year: u64,
) -> Result<Amount> {
    accrued_interest(principal, apr_bps, duration_secs, seconds_per_year)
}

/// One-time origination fee withheld from principal, floored
pub fn origination_fee(principal: Amount, fee_bps: BasisPoints) -> Result<Amount> {
    let numerator = principal
        .checked_mul(fee_bps as u128)
        .ok_or(Error::Overflow {
            context: "origination fee",
        })?;
    Ok(numerator / BPS_DENOM as u128)
}

/// Principal plus interest
pub fn total_debt(principal: Amount, interest: Amount) -> Result<Amount> {
    principal.checked_add(interest).ok_or(Error::Overflow {
        context: "total debt",
    })
}

/// Weighted share of proceeds: `proceeds * weight / total_weight`, floored.
/// Residual dust from flooring stays with the payer.
pub fn pro_rata(proceeds: Amount, weight: u64, total_weight: u64) -> Result<Amount> {
    if total_weight == 0 {
        return Err(Error::Overflow {
            context: "pro-rata weights",
        });
    }
    let numerator = proceeds.checked_mul(weight as u128).ok_or(Error::Overflow {
        context: "pro-rata share",
    })?;
    Ok(numerator / total_weight as u128)
}
