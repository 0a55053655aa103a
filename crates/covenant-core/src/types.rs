//! Core type definitions for Covenant

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account identifier (lender, borrower, bidder, fee recipient, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fungible currency identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyId(pub String);

impl CurrencyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collateral collection identifier (the issuing contract or series)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub String);

impl CollectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token identifier within a collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenRef(pub String);

impl TokenRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single non-fungible collateral unit: collection plus token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub collection: CollectionId,
    pub token: TokenRef,
}

impl AssetRef {
    pub fn new(collection: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            collection: CollectionId::new(collection),
            token: TokenRef::new(token),
        }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.token)
    }
}

/// Identifier of a collateral asset in the external royalty registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalAssetId(pub String);

impl ExternalAssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalAssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh, unpredictable identifier
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Loan offer identifier
    OfferId
);
uuid_id!(
    /// Loan identifier
    LoanId
);
uuid_id!(
    /// Renegotiation proposal identifier
    ProposalId
);
uuid_id!(
    /// Auction identifier
    AuctionId
);
uuid_id!(
    /// Sale listing identifier
    ListingId
);

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Fungible amount in the currency's smallest unit
pub type Amount = u128;

/// Rate expressed in basis points (1 bp = 0.01%)
pub type BasisPoints = u64;

/// Constants
pub mod constants {
    use super::BasisPoints;

    /// Basis point denominator (100% = 10_000 bps)
    pub const BPS_DENOM: BasisPoints = 10_000;

    /// Seconds in a 365-day year, the interest accrual base
    pub const SECONDS_PER_YEAR: u64 = 31_536_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_ref_display() {
        let asset = AssetRef::new("punks", "42");
        assert_eq!(asset.to_string(), "punks/42");
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(LoanId::generate(), LoanId::generate());
        assert_ne!(OfferId::generate(), OfferId::generate());
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = LoanId::generate();
        let json = serde_json::to_string(&id).unwrap();
        // serializes as a bare string, not a wrapper object
        assert!(json.starts_with('"') && json.ends_with('"'));
        let back: LoanId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
