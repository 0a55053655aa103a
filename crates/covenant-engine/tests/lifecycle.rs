//! End-to-end loan lifecycle scenarios over the in-memory collaborators

use std::sync::Arc;

use covenant_core::clock::ManualClock;
use covenant_core::config::EngineConfig;
use covenant_core::errors::{AuthError, Error, FundsError, StateError, ValidationError};
use covenant_core::{AssetCustody, FungibleLedger, RoyaltySource};
use covenant_core::memory::{
    MemoryBank, MemoryCollections, MemoryCurrencies, MemoryCustody, MemoryRegistry,
    MemoryRoyalties,
};
use covenant_core::types::{AccountId, Amount, AssetRef, CurrencyId, ExternalAssetId, LoanId};
use covenant_engine::{
    AuctionStatus, Collaborators, LendingEngine, LoanStatus, OfferKind, OfferParams,
};

const T0: u64 = 1_700_000_000;
const WEEK: u64 = 604_800;
const E18: Amount = 1_000_000_000_000_000_000;

fn usd() -> CurrencyId {
    CurrencyId::new("usd")
}

fn lender() -> AccountId {
    AccountId::new("lender")
}

fn borrower() -> AccountId {
    AccountId::new("borrower")
}

struct Harness {
    engine: LendingEngine,
    clock: Arc<ManualClock>,
    bank: Arc<MemoryBank>,
    custody: Arc<MemoryCustody>,
    registry: Arc<MemoryRegistry>,
    royalties: Arc<MemoryRoyalties>,
}

fn setup() -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let clock = Arc::new(ManualClock::new(T0));
    let bank = Arc::new(MemoryBank::new());
    let custody = Arc::new(MemoryCustody::new());
    let registry = Arc::new(MemoryRegistry::new());
    let royalties = Arc::new(MemoryRoyalties::new(bank.clone()));
    let engine = LendingEngine::new(
        EngineConfig::default(),
        Collaborators {
            clock: clock.clone(),
            currencies: Arc::new(MemoryCurrencies::new([usd()])),
            collections: Arc::new(MemoryCollections::new([covenant_core::types::CollectionId::new(
                "punks",
            )])),
            funds: bank.clone(),
            custody: custody.clone(),
            registry: Some(registry.clone()),
            royalties: Some(royalties.clone()),
        },
    );
    Harness {
        engine,
        clock,
        bank,
        custody,
        registry,
        royalties,
    }
}

fn standard_offer(principal: Amount, apr_bps: u64, fee_bps: u64) -> OfferParams {
    OfferParams {
        lender: lender(),
        kind: OfferKind::Standard {
            asset: AssetRef::new("punks", "1"),
            principal,
        },
        currency: usd(),
        apr_bps,
        duration_secs: WEEK,
        expires_at: T0 + 30 * 86_400,
        origination_fee_bps: fee_bps,
    }
}

/// Mint working balances and collateral, post an offer, and accept it.
/// Returns the loan id for a 1e18 / 500 bps / 7 day / 100 bps fee loan.
fn open_standard_loan(h: &mut Harness) -> LoanId {
    let asset = AssetRef::new("punks", "1");
    h.bank.mint(&usd(), &lender(), 10 * E18);
    h.bank.mint(&usd(), &borrower(), 10 * E18);
    h.custody.register(asset.clone(), borrower());
    let offer_id = h.engine.make_offer(standard_offer(E18, 500, 100)).unwrap();
    h.engine
        .accept_offer(offer_id, &borrower(), &asset, E18)
        .unwrap()
}

#[test]
fn accept_offer_moves_funds_fee_and_collateral() {
    let mut h = setup();
    let asset = AssetRef::new("punks", "1");
    h.bank.mint(&usd(), &lender(), 2 * E18);
    h.custody.register(asset.clone(), borrower());

    let offer_id = h.engine.make_offer(standard_offer(E18, 500, 100)).unwrap();
    let loan_id = h
        .engine
        .accept_offer(offer_id, &borrower(), &asset, E18)
        .unwrap();

    // borrower receives principal minus the 1% origination fee
    assert_eq!(h.bank.balance_of(&usd(), &borrower()), E18 - E18 / 100);
    assert_eq!(
        h.bank.balance_of(&usd(), &AccountId::new("covenant:fees")),
        E18 / 100
    );
    assert_eq!(h.bank.balance_of(&usd(), &lender()), E18);
    // collateral sits with the treasury
    assert_eq!(
        h.custody.holder_of(&asset).unwrap(),
        AccountId::new("covenant:treasury")
    );

    let loan = h.engine.get_loan(loan_id).unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.principal, E18);
    assert_eq!(loan.origination_fee_paid, E18 / 100);
    assert_eq!(loan.due_time, T0 + WEEK);

    // standard offers deactivate on first acceptance; a second draw fails
    let err = h
        .engine
        .accept_offer(offer_id, &borrower(), &asset, E18)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::State(StateError::OfferNotActive { .. })
    ));
}

#[test]
fn interest_fixture_and_repay_boundary() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);
    let asset = AssetRef::new("punks", "1");

    // 1e18 * 500 * 604800 / (10000 * 31536000), floored
    h.clock.set(T0 + WEEK);
    let interest = h.engine.calculate_interest(loan_id).unwrap();
    assert_eq!(interest, 958_904_109_589_041);

    // repayment is inclusive at the due instant
    let lender_before = h.bank.balance_of(&usd(), &lender());
    h.engine.repay(loan_id, &borrower()).unwrap();
    assert_eq!(
        h.bank.balance_of(&usd(), &lender()),
        lender_before + E18 + interest
    );
    assert_eq!(h.custody.holder_of(&asset).unwrap(), borrower());

    let loan = h.engine.get_loan(loan_id).unwrap();
    assert_eq!(loan.status, LoanStatus::Repaid);
    assert_eq!(loan.accrued_interest, interest);

    // interest stays frozen at the cached value after resolution
    h.clock.advance(10 * WEEK);
    assert_eq!(h.engine.calculate_interest(loan_id).unwrap(), interest);

    // the release happened exactly once; a replayed repay fails
    let err = h.engine.repay(loan_id, &borrower()).unwrap_err();
    assert!(matches!(err, Error::State(StateError::LoanNotActive { .. })));
}

#[test]
fn repay_one_second_late_is_a_state_error() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);

    h.clock.set(T0 + WEEK + 1);
    let err = h.engine.repay(loan_id, &borrower()).unwrap_err();
    assert!(matches!(err, Error::State(StateError::LoanPastDue { .. })));

    // the default path is now open to the lender instead
    let asset = AssetRef::new("punks", "1");
    h.engine.claim_collateral(loan_id, &lender()).unwrap();
    assert_eq!(h.custody.holder_of(&asset).unwrap(), lender());
    assert_eq!(
        h.engine.get_loan(loan_id).unwrap().status,
        LoanStatus::Liquidated
    );

    // and the claim cannot be replayed
    assert!(h.engine.claim_collateral(loan_id, &lender()).is_err());
}

#[test]
fn repay_requires_the_borrower() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);
    h.bank.mint(&usd(), &AccountId::new("mallory"), 10 * E18);
    let err = h
        .engine
        .repay(loan_id, &AccountId::new("mallory"))
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::NotBorrower { .. })));
}

#[test]
fn failed_repay_transfer_leaves_state_untouched() {
    let mut h = setup();
    let asset = AssetRef::new("punks", "1");
    h.bank.mint(&usd(), &lender(), 2 * E18);
    h.custody.register(asset.clone(), borrower());
    let offer_id = h.engine.make_offer(standard_offer(E18, 500, 0)).unwrap();
    let loan_id = h
        .engine
        .accept_offer(offer_id, &borrower(), &asset, E18)
        .unwrap();

    // drain the borrower so the repayment leg must fail
    h.bank
        .transfer(&usd(), &borrower(), &AccountId::new("sink"), E18)
        .unwrap();
    h.clock.set(T0 + WEEK);
    let err = h.engine.repay(loan_id, &borrower()).unwrap_err();
    assert!(matches!(
        err,
        Error::Funds(FundsError::InsufficientBalance { .. })
    ));

    // nothing moved: loan still active, collateral still escrowed
    assert_eq!(h.engine.get_loan(loan_id).unwrap().status, LoanStatus::Active);
    assert_eq!(
        h.custody.holder_of(&asset).unwrap(),
        AccountId::new("covenant:treasury")
    );
    assert_eq!(h.bank.balance_of(&usd(), &borrower()), 0);
}

#[test]
fn failed_acceptance_returns_collateral() {
    let mut h = setup();
    let asset = AssetRef::new("punks", "1");
    // lender never funded: the principal leg fails after escrow
    h.custody.register(asset.clone(), borrower());
    let offer_id = h.engine.make_offer(standard_offer(E18, 500, 100)).unwrap();

    let err = h
        .engine
        .accept_offer(offer_id, &borrower(), &asset, E18)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Funds(FundsError::InsufficientBalance { .. })
    ));
    // collateral is back with the borrower and the offer still accepts
    assert_eq!(h.custody.holder_of(&asset).unwrap(), borrower());
    assert!(h.engine.get_offer(offer_id).unwrap().active);

    h.bank.mint(&usd(), &lender(), E18);
    h.engine
        .accept_offer(offer_id, &borrower(), &asset, E18)
        .unwrap();
}

#[test]
fn cancelled_offer_rejects_acceptance_and_recancellation() {
    let mut h = setup();
    let asset = AssetRef::new("punks", "1");
    h.bank.mint(&usd(), &lender(), E18);
    h.custody.register(asset.clone(), borrower());
    let offer_id = h.engine.make_offer(standard_offer(E18, 500, 100)).unwrap();

    h.engine.cancel_offer(offer_id, &lender()).unwrap();
    assert!(matches!(
        h.engine.cancel_offer(offer_id, &lender()).unwrap_err(),
        Error::State(StateError::OfferNotActive { .. })
    ));
    assert!(h
        .engine
        .accept_offer(offer_id, &borrower(), &asset, E18)
        .is_err());
}

#[test]
fn make_offer_enforces_allow_lists() {
    let mut h = setup();
    let mut params = standard_offer(E18, 500, 100);
    params.currency = CurrencyId::new("shells");
    assert!(matches!(
        h.engine.make_offer(params).unwrap_err(),
        Error::Validation(ValidationError::UnsupportedCurrency { .. })
    ));

    let mut params = standard_offer(E18, 500, 100);
    params.kind = OfferKind::Standard {
        asset: AssetRef::new("rugs", "1"),
        principal: E18,
    };
    assert!(matches!(
        h.engine.make_offer(params).unwrap_err(),
        Error::Validation(ValidationError::CollectionNotWhitelisted { .. })
    ));
}

#[test]
fn collection_offer_draws_until_capacity() {
    let mut h = setup();
    h.bank.mint(&usd(), &lender(), 20 * E18);
    let params = OfferParams {
        lender: lender(),
        kind: OfferKind::Collection {
            collection: covenant_core::types::CollectionId::new("punks"),
            total_capacity: 5 * E18 + E18 / 2,
            max_principal_per_loan: E18,
            drawn: 0,
        },
        currency: usd(),
        apr_bps: 500,
        duration_secs: WEEK,
        expires_at: T0 + 30 * 86_400,
        origination_fee_bps: 0,
    };
    let offer_id = h.engine.make_offer(params).unwrap();

    for i in 0..5 {
        let who = AccountId::new(format!("borrower-{i}"));
        let asset = AssetRef::new("punks", format!("{i}"));
        h.custody.register(asset.clone(), who.clone());
        h.engine.accept_offer(offer_id, &who, &asset, E18).unwrap();
    }

    // a sixth full-size draw exceeds the remaining half-capacity
    let who = AccountId::new("borrower-5");
    let asset = AssetRef::new("punks", "5");
    h.custody.register(asset.clone(), who.clone());
    let err = h
        .engine
        .accept_offer(offer_id, &who, &asset, E18)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::CapacityExceeded { .. })
    ));

    // drawn amount untouched by the failed draw, offer still active
    let offer = h.engine.get_offer(offer_id).unwrap();
    assert!(offer.active);
    assert!(
        matches!(offer.kind, OfferKind::Collection { drawn, .. } if drawn == 5 * E18)
    );

    // a half-size draw finishes the capacity and deactivates the offer
    h.engine
        .accept_offer(offer_id, &who, &asset, E18 / 2)
        .unwrap();
    assert!(!h.engine.get_offer(offer_id).unwrap().active);
}

#[test]
fn auction_refunds_displaced_bidders_exactly() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);
    let asset = AssetRef::new("punks", "1");
    let alice = AccountId::new("alice");
    let bob = AccountId::new("bob");
    h.bank.mint(&usd(), &alice, 5 * E18);
    h.bank.mint(&usd(), &bob, 5 * E18);

    h.clock.set(T0 + WEEK + 1);
    let auction_id = h
        .engine
        .liquidate_by_auction(loan_id, &lender(), E18, 3_600)
        .unwrap();
    assert_eq!(
        h.engine.get_loan(loan_id).unwrap().status,
        LoanStatus::Defaulted
    );

    // the direct claim path is blocked while the auction owns the collateral
    assert!(matches!(
        h.engine.claim_collateral(loan_id, &lender()).unwrap_err(),
        Error::State(StateError::AuctionExists { .. })
    ));

    h.engine.place_bid(auction_id, &alice, E18).unwrap();
    assert_eq!(h.bank.balance_of(&usd(), &alice), 4 * E18);

    // bob outbids; alice's exact prior bid comes back in the same call
    h.engine.place_bid(auction_id, &bob, 3 * E18 / 2).unwrap();
    assert_eq!(h.bank.balance_of(&usd(), &alice), 5 * E18);
    assert_eq!(h.bank.balance_of(&usd(), &bob), 5 * E18 - 3 * E18 / 2);

    // equal bids never displace
    assert!(matches!(
        h.engine.place_bid(auction_id, &alice, 3 * E18 / 2).unwrap_err(),
        Error::Validation(ValidationError::BidTooLow { .. })
    ));

    // finalization waits for the end time, then is one-shot
    assert!(matches!(
        h.engine.end_auction(auction_id).unwrap_err(),
        Error::State(StateError::AuctionStillRunning { .. })
    ));
    h.clock.advance(3_600);
    assert_eq!(
        h.engine.end_auction(auction_id).unwrap(),
        AuctionStatus::EndedSold
    );
    assert!(h.engine.place_bid(auction_id, &alice, 2 * E18).is_err());

    // settlement pays the sole claimant and hands the asset to the winner
    let lender_before = h.bank.balance_of(&usd(), &lender());
    h.engine.distribute_proceeds(auction_id).unwrap();
    assert_eq!(
        h.bank.balance_of(&usd(), &lender()),
        lender_before + 3 * E18 / 2
    );
    assert_eq!(h.custody.holder_of(&asset).unwrap(), bob);
    assert_eq!(
        h.engine.get_loan(loan_id).unwrap().status,
        LoanStatus::Liquidated
    );
    assert_eq!(
        h.engine.get_auction(auction_id).unwrap().status,
        AuctionStatus::Settled
    );

    // no double distribution
    assert!(h.engine.distribute_proceeds(auction_id).is_err());
}

#[test]
fn unsold_auction_returns_collateral_to_claimant() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);
    let asset = AssetRef::new("punks", "1");

    h.clock.set(T0 + WEEK + 1);
    let auction_id = h
        .engine
        .liquidate_by_auction(loan_id, &lender(), E18, 3_600)
        .unwrap();
    h.clock.advance(3_601);
    assert_eq!(
        h.engine.end_auction(auction_id).unwrap(),
        AuctionStatus::EndedNoBids
    );

    // wrong settlement path for this outcome
    assert!(matches!(
        h.engine.distribute_proceeds(auction_id).unwrap_err(),
        Error::State(StateError::AuctionWrongOutcome { .. })
    ));

    h.engine.claim_collateral_post_auction(auction_id).unwrap();
    assert_eq!(h.custody.holder_of(&asset).unwrap(), lender());
    assert_eq!(
        h.engine.get_loan(loan_id).unwrap().status,
        LoanStatus::Liquidated
    );
}

#[test]
fn buyout_window_excludes_auctions_and_pays_claimants() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);
    let asset = AssetRef::new("punks", "1");
    let partner = AccountId::new("partner");
    h.bank.mint(&usd(), &partner, 5 * E18);

    h.clock.set(T0 + WEEK + 1);
    h.engine
        .initiate_buyout(loan_id, &lender(), partner.clone(), 2 * E18, 3_600)
        .unwrap();

    // no auction while the window is open
    assert!(matches!(
        h.engine
            .liquidate_by_auction(loan_id, &lender(), E18, 3_600)
            .unwrap_err(),
        Error::State(StateError::BuyoutOpen { .. })
    ));

    // only the designated claimant may execute
    assert!(matches!(
        h.engine
            .execute_buyout(loan_id, &AccountId::new("mallory"))
            .unwrap_err(),
        Error::Auth(AuthError::NotClaimant { .. })
    ));

    let lender_before = h.bank.balance_of(&usd(), &lender());
    h.engine.execute_buyout(loan_id, &partner).unwrap();
    assert_eq!(h.bank.balance_of(&usd(), &lender()), lender_before + 2 * E18);
    assert_eq!(h.custody.holder_of(&asset).unwrap(), partner);
    assert_eq!(
        h.engine.get_loan(loan_id).unwrap().status,
        LoanStatus::Liquidated
    );
    let buyout = h.engine.get_buyout(loan_id).unwrap();
    assert!(buyout.completed && !buyout.active);
}

#[test]
fn expired_buyout_reopens_the_auction_path() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);
    let partner = AccountId::new("partner");
    h.bank.mint(&usd(), &partner, 5 * E18);

    h.clock.set(T0 + WEEK + 1);
    h.engine
        .initiate_buyout(loan_id, &lender(), partner.clone(), 2 * E18, 3_600)
        .unwrap();
    h.clock.advance(3_601);

    assert!(matches!(
        h.engine.execute_buyout(loan_id, &partner).unwrap_err(),
        Error::State(StateError::BuyoutExpired { .. })
    ));
    h.engine
        .liquidate_by_auction(loan_id, &lender(), E18, 3_600)
        .unwrap();
}

#[test]
fn renegotiation_settles_delta_and_consumes_proposal() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);

    h.clock.advance(WEEK / 2);
    // lender proposes doubling the principal on a longer term
    let proposal_id = h
        .engine
        .propose_renegotiation(loan_id, &lender(), 2 * E18, 300, 2 * WEEK)
        .unwrap();

    // only the borrower accepts
    assert!(matches!(
        h.engine
            .accept_renegotiation(proposal_id, &lender())
            .unwrap_err(),
        Error::Auth(AuthError::NotBorrower { .. })
    ));

    let borrower_before = h.bank.balance_of(&usd(), &borrower());
    h.engine
        .accept_renegotiation(proposal_id, &borrower())
        .unwrap();
    // principal delta flows lender -> borrower
    assert_eq!(h.bank.balance_of(&usd(), &borrower()), borrower_before + E18);

    let loan = h.engine.get_loan(loan_id).unwrap();
    assert_eq!(loan.principal, 2 * E18);
    assert_eq!(loan.apr_bps, 300);
    assert_eq!(loan.start_time, T0 + WEEK / 2);
    assert_eq!(loan.due_time, T0 + WEEK / 2 + 2 * WEEK);
    assert_eq!(loan.status, LoanStatus::Active);
    // accrual restarted at acceptance
    assert_eq!(h.engine.calculate_interest(loan_id).unwrap(), 0);

    // no replay of a consumed proposal
    assert!(matches!(
        h.engine
            .accept_renegotiation(proposal_id, &borrower())
            .unwrap_err(),
        Error::State(StateError::ProposalConsumed { .. })
    ));
}

#[test]
fn refinance_pays_off_old_lender_and_rebinds_escrow() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);
    let asset = AssetRef::new("punks", "1");
    let new_lender = AccountId::new("newlender");
    h.bank.mint(&usd(), &new_lender, 5 * E18);

    h.clock.advance(WEEK / 2);
    let interest = h.engine.calculate_interest(loan_id).unwrap();
    assert_eq!(interest, 479_452_054_794_520);
    let old_debt = E18 + interest;

    let old_lender_before = h.bank.balance_of(&usd(), &lender());
    let borrower_before = h.bank.balance_of(&usd(), &borrower());
    let new_loan_id = h
        .engine
        .refinance(loan_id, &new_lender, 2 * E18, 300, WEEK, 0)
        .unwrap();

    // the old lender is made whole as of now from the new lender's funds
    assert_eq!(
        h.bank.balance_of(&usd(), &lender()),
        old_lender_before + old_debt
    );
    // the principal increase lands with the borrower
    assert_eq!(
        h.bank.balance_of(&usd(), &borrower()),
        borrower_before + (2 * E18 - old_debt)
    );
    assert_eq!(h.bank.balance_of(&usd(), &new_lender), 3 * E18);

    let old = h.engine.get_loan(loan_id).unwrap();
    assert_eq!(old.status, LoanStatus::Refinanced);
    assert_eq!(old.accrued_interest, interest);

    let new = h.engine.get_loan(new_loan_id).unwrap();
    assert_eq!(new.lender, new_lender);
    assert_eq!(new.principal, 2 * E18);
    assert_eq!(new.start_time, T0 + WEEK / 2);
    assert_eq!(new.due_time, T0 + WEEK / 2 + WEEK);

    // no custody round-trip: the asset never left the treasury
    assert_eq!(
        h.custody.holder_of(&asset).unwrap(),
        AccountId::new("covenant:treasury")
    );

    // old loan can no longer resolve; the single release belongs to the new one
    assert!(h.engine.repay(loan_id, &borrower()).is_err());
    h.engine.repay(new_loan_id, &borrower()).unwrap();
    assert_eq!(h.custody.holder_of(&asset).unwrap(), borrower());
}

#[test]
fn sale_listing_settles_debt_and_pays_surplus() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);
    let asset = AssetRef::new("punks", "1");
    let buyer = AccountId::new("buyer");
    h.bank.mint(&usd(), &buyer, 10 * E18);

    let max_debt = E18 + 958_904_109_589_041;
    // price must cover the worst-case debt
    assert!(matches!(
        h.engine
            .list_for_sale(loan_id, max_debt - 1, &borrower())
            .unwrap_err(),
        Error::Validation(ValidationError::PriceBelowDebt { .. })
    ));
    let listing_id = h.engine.list_for_sale(loan_id, 2 * E18, &borrower()).unwrap();

    // one listing per loan
    assert!(matches!(
        h.engine
            .list_for_sale(loan_id, 2 * E18, &borrower())
            .unwrap_err(),
        Error::State(StateError::ListingExists { .. })
    ));

    h.clock.advance(WEEK / 2);
    let debt = E18 + h.engine.calculate_interest(loan_id).unwrap();
    let lender_before = h.bank.balance_of(&usd(), &lender());
    let seller_before = h.bank.balance_of(&usd(), &borrower());

    h.engine.buy_listed(listing_id, &buyer, 2 * E18).unwrap();
    assert_eq!(h.bank.balance_of(&usd(), &lender()), lender_before + debt);
    assert_eq!(
        h.bank.balance_of(&usd(), &borrower()),
        seller_before + (2 * E18 - debt)
    );
    assert_eq!(h.custody.holder_of(&asset).unwrap(), buyer);
    assert_eq!(h.engine.get_loan(loan_id).unwrap().status, LoanStatus::Repaid);

    // the listing is consumed exactly once
    assert!(matches!(
        h.engine.buy_listed(listing_id, &buyer, 2 * E18).unwrap_err(),
        Error::State(StateError::ListingNotActive { .. })
    ));
}

#[test]
fn cancelled_listing_allows_relisting() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);
    let listing_id = h.engine.list_for_sale(loan_id, 2 * E18, &borrower()).unwrap();

    assert!(matches!(
        h.engine
            .cancel_listing(listing_id, &AccountId::new("mallory"))
            .unwrap_err(),
        Error::Auth(AuthError::NotSeller { .. })
    ));
    h.engine.cancel_listing(listing_id, &borrower()).unwrap();
    assert!(h.engine.cancel_listing(listing_id, &borrower()).is_err());

    h.engine.list_for_sale(loan_id, 2 * E18, &borrower()).unwrap();
}

#[test]
fn underpriced_purchase_is_rejected() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);
    let buyer = AccountId::new("buyer");
    h.bank.mint(&usd(), &buyer, 10 * E18);

    let listing_id = h.engine.list_for_sale(loan_id, 2 * E18, &borrower()).unwrap();
    let err = h
        .engine
        .buy_listed(listing_id, &buyer, 2 * E18 - 1)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::PaymentTooLow { .. })
    ));
}

#[test]
fn royalty_income_splits_repayment_with_borrower() {
    let mut h = setup();
    let asset = AssetRef::new("punks", "1");
    let external = ExternalAssetId::new("ip-1");
    h.registry.register(asset.clone(), external.clone());
    h.bank.mint(&usd(), &lender(), 2 * E18);
    h.custody.register(asset.clone(), borrower());

    // zero-rate loan so the debt is exactly the principal
    let offer_id = h.engine.make_offer(standard_offer(E18, 0, 0)).unwrap();
    let loan_id = h
        .engine
        .accept_offer(offer_id, &borrower(), &asset, E18)
        .unwrap();
    assert_eq!(
        h.engine.get_loan(loan_id).unwrap().external_asset,
        Some(external.clone())
    );

    h.royalties.accrue(&external, &usd(), E18 / 2);

    let borrower_before = h.bank.balance_of(&usd(), &borrower());
    let lender_before = h.bank.balance_of(&usd(), &lender());
    let applied = h.engine.claim_and_repay(loan_id, &borrower()).unwrap();

    // half from royalties, half from the borrower, lender made whole
    assert_eq!(applied, E18 / 2);
    assert_eq!(
        h.bank.balance_of(&usd(), &borrower()),
        borrower_before - E18 / 2
    );
    assert_eq!(h.bank.balance_of(&usd(), &lender()), lender_before + E18);
    assert_eq!(h.royalties.available_balance(&external, &usd()), 0);
    assert_eq!(h.engine.get_loan(loan_id).unwrap().status, LoanStatus::Repaid);
    assert_eq!(h.custody.holder_of(&asset).unwrap(), borrower());
}

#[test]
fn royalties_covering_the_debt_skip_the_borrower_entirely() {
    let mut h = setup();
    let asset = AssetRef::new("punks", "1");
    let external = ExternalAssetId::new("ip-1");
    h.registry.register(asset.clone(), external.clone());
    h.bank.mint(&usd(), &lender(), 2 * E18);
    h.custody.register(asset.clone(), borrower());

    let offer_id = h.engine.make_offer(standard_offer(E18, 0, 0)).unwrap();
    let loan_id = h
        .engine
        .accept_offer(offer_id, &borrower(), &asset, E18)
        .unwrap();
    h.royalties.accrue(&external, &usd(), 2 * E18);

    let borrower_before = h.bank.balance_of(&usd(), &borrower());
    let applied = h.engine.claim_and_repay(loan_id, &borrower()).unwrap();
    assert_eq!(applied, E18);
    assert_eq!(h.bank.balance_of(&usd(), &borrower()), borrower_before);
    assert_eq!(h.royalties.available_balance(&external, &usd()), E18);
    assert_eq!(h.engine.get_loan(loan_id).unwrap().status, LoanStatus::Repaid);
}

#[test]
fn unregistered_collateral_repays_entirely_from_borrower() {
    let mut h = setup();
    let loan_id = open_standard_loan(&mut h);
    let asset = AssetRef::new("punks", "1");

    // never registered with the external registry: royalty leg applies zero
    assert_eq!(h.engine.get_loan(loan_id).unwrap().external_asset, None);
    assert_eq!(
        h.engine
            .attempt_royalty_payment(loan_id, E18, &lender())
            .unwrap(),
        0
    );

    h.clock.set(T0 + WEEK);
    let debt = E18 + h.engine.calculate_interest(loan_id).unwrap();
    let borrower_before = h.bank.balance_of(&usd(), &borrower());
    let applied = h.engine.claim_and_repay(loan_id, &borrower()).unwrap();
    assert_eq!(applied, 0);
    assert_eq!(
        h.bank.balance_of(&usd(), &borrower()),
        borrower_before - debt
    );
    assert_eq!(h.custody.holder_of(&asset).unwrap(), borrower());
}
