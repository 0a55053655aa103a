//! Configuration types for Covenant

use serde::{Deserialize, Serialize};

use crate::types::{constants, AccountId};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Protocol account holding escrowed collateral and in-flight auction funds
    pub treasury: AccountId,

    /// Recipient of origination fees
    pub fee_recipient: AccountId,

    /// Interest accrual base (seconds per year)
    #[serde(default = "default_seconds_per_year")]
    pub seconds_per_year: u64,
}

fn default_seconds_per_year() -> u64 {
    constants::SECONDS_PER_YEAR
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            treasury: AccountId::new("covenant:treasury"),
            fee_recipient: AccountId::new("covenant:fees"),
            seconds_per_year: default_seconds_per_year(),
        }
    }
}
