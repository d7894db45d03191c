//! End-to-end test for the full will lifecycle.
//!
//! Walks one will through every state transition the engine supports:
//!
//! 1. Owner escrows funds across two beneficiaries
//! 2. Owner reshapes allocations during the pre-lock window
//! 3. Beneficiaries claim after the release threshold, in both orders
//! 4. Owner cancels and receives exactly the unclaimed remainder
//!
//! Balance conservation is asserted at every observable point.

use testament_core::{EscrowEvent, Identity, WillError};
use testament_escrow::EscrowEngine;
use testament_ledger::{LedgerPort, ManualHeight, MemoryLedger};

const CUSTODY: &str = "escrow-custody";

fn id(s: &str) -> Identity {
    Identity::new(s)
}

fn funded_engine(start_height: u64) -> EscrowEngine<MemoryLedger, ManualHeight> {
    let engine = EscrowEngine::new(
        MemoryLedger::new(),
        ManualHeight::new(start_height),
        id(CUSTODY),
    );
    engine.ledger().deposit(&id("alice"), 10_000_000);
    engine
}

/// `total_claimed <= total_allocated`, allocation sum == `total_allocated`,
/// and no funds created or destroyed anywhere.
fn assert_invariants(engine: &EscrowEngine<MemoryLedger, ManualHeight>, will_id: u64) {
    let state = engine.state_snapshot();
    let will = state.will(will_id).expect("will exists");
    assert!(will.total_claimed <= will.total_allocated);
    assert_eq!(state.allocation_total(will_id), will.total_allocated);
    assert_eq!(engine.ledger().total_supply(), 10_000_000);
}

#[test]
fn test_full_will_lifecycle() {
    let engine = funded_engine(1_000);
    let height = engine.current_height();

    // ═══════════════════════════════════════════════════════════════════
    // STEP 1: Create — escrow 3M across two beneficiaries
    // ═══════════════════════════════════════════════════════════════════
    let will_id = engine
        .create(
            &id("alice"),
            &[id("bob"), id("carol")],
            &[1_000_000, 2_000_000],
            height + 100,
        )
        .expect("create");

    assert_eq!(will_id, 1);
    assert_eq!(engine.ledger().balance(&id("alice")), 7_000_000);
    assert_eq!(engine.contract_balance(), 3_000_000);

    let stats = engine.will_stats(will_id).unwrap();
    assert_eq!(stats.total_allocated, 3_000_000);
    assert_eq!(stats.total_claimed, 0);
    assert_eq!(stats.beneficiary_count, 2);
    assert!(!stats.cancelled);
    assert_invariants(&engine, will_id);

    // Pre-lock: nobody can claim yet
    assert!(!engine.can_claim(will_id, &id("bob")));
    assert_eq!(
        engine.claim(&id("bob"), will_id).unwrap_err(),
        WillError::ReleaseConditionNotMet {
            current: 1_000,
            threshold: 1_100,
        }
    );

    // ═══════════════════════════════════════════════════════════════════
    // STEP 2: Reshape allocations before the lock
    // ═══════════════════════════════════════════════════════════════════
    engine
        .update_beneficiary(&id("alice"), &id("bob"), 1_500_000)
        .expect("raise bob");
    engine
        .update_beneficiary(&id("alice"), &id("dave"), 500_000)
        .expect("add dave");

    assert_eq!(engine.contract_balance(), 4_000_000);
    assert_eq!(engine.ledger().balance(&id("alice")), 6_000_000);
    assert_eq!(engine.will_stats(will_id).unwrap().beneficiary_count, 3);
    assert_invariants(&engine, will_id);

    // ═══════════════════════════════════════════════════════════════════
    // STEP 3: Threshold reached — claims open, updates close
    // ═══════════════════════════════════════════════════════════════════
    engine.oracle().advance_to(1_100);
    assert_eq!(engine.is_release_condition_met(will_id), Some(true));
    assert_eq!(
        engine
            .update_beneficiary(&id("alice"), &id("bob"), 1_000)
            .unwrap_err(),
        WillError::ReleaseConditionAlreadyMet {
            current: 1_100,
            threshold: 1_100,
        }
    );

    assert_eq!(engine.claim(&id("bob"), will_id).unwrap(), 1_500_000);
    assert_eq!(engine.claim(&id("dave"), will_id).unwrap(), 500_000);
    assert_eq!(engine.ledger().balance(&id("bob")), 1_500_000);
    assert_eq!(engine.ledger().balance(&id("dave")), 500_000);
    assert_invariants(&engine, will_id);

    // Double claim is rejected without moving funds
    assert_eq!(
        engine.claim(&id("bob"), will_id).unwrap_err(),
        WillError::AlreadyClaimed
    );
    assert_eq!(engine.ledger().balance(&id("bob")), 1_500_000);

    // ═══════════════════════════════════════════════════════════════════
    // STEP 4: Cancel — refund is exactly the unclaimed remainder
    // ═══════════════════════════════════════════════════════════════════
    let refund = engine.cancel(&id("alice")).expect("cancel");
    assert_eq!(refund, 2_000_000); // carol never claimed
    assert_eq!(engine.ledger().balance(&id("alice")), 8_000_000);
    assert_eq!(engine.contract_balance(), 0);

    // Carol's claim now fails; her allocation stays queryable forever
    assert_eq!(
        engine.claim(&id("carol"), will_id).unwrap_err(),
        WillError::Cancelled
    );
    assert_eq!(
        engine
            .beneficiary_info(will_id, &id("carol"))
            .unwrap()
            .amount,
        2_000_000
    );

    // Second cancel: no second refund
    assert_eq!(engine.cancel(&id("alice")).unwrap_err(), WillError::Cancelled);
    assert_eq!(engine.ledger().balance(&id("alice")), 8_000_000);

    // Alice's lifetime slot is spent for good
    assert_eq!(
        engine
            .create(&id("alice"), &[id("bob")], &[1_000], 2_000)
            .unwrap_err(),
        WillError::AlreadyExists(will_id)
    );
}

#[test]
fn test_claim_order_does_not_matter() {
    let final_state = |order: [&str; 2]| {
        let engine = funded_engine(1_000);
        let will_id = engine
            .create(
                &id("alice"),
                &[id("bob"), id("carol")],
                &[1_000_000, 2_000_000],
                1_100,
            )
            .unwrap();
        engine.oracle().advance_to(1_100);

        for who in order {
            engine.claim(&id(who), will_id).unwrap();
        }
        assert_invariants(&engine, will_id);
        (
            engine.ledger().balance(&id("bob")),
            engine.ledger().balance(&id("carol")),
            engine.contract_balance(),
            engine.will_stats(will_id).unwrap(),
        )
    };

    assert_eq!(final_state(["bob", "carol"]), final_state(["carol", "bob"]));
}

#[test]
fn test_independent_wills_never_interact() {
    let engine = funded_engine(1_000);
    engine.ledger().deposit(&id("erin"), 4_000_000);

    let alice_will = engine
        .create(&id("alice"), &[id("bob")], &[1_000_000], 1_100)
        .unwrap();
    let erin_will = engine
        .create(&id("erin"), &[id("bob")], &[4_000_000], 1_500)
        .unwrap();

    assert_eq!(alice_will, 1);
    assert_eq!(erin_will, 2);
    assert_eq!(engine.will_counter(), 2);
    assert_eq!(engine.contract_balance(), 5_000_000);

    // Alice's will unlocks first; bob's claim there leaves erin's untouched
    engine.oracle().advance_to(1_100);
    assert_eq!(engine.claim(&id("bob"), alice_will).unwrap(), 1_000_000);
    assert_eq!(
        engine.claim(&id("bob"), erin_will).unwrap_err(),
        WillError::ReleaseConditionNotMet {
            current: 1_100,
            threshold: 1_500,
        }
    );

    // Cancelling erin's will refunds her full escrow, alice's is unaffected
    assert_eq!(engine.cancel(&id("erin")).unwrap(), 4_000_000);
    assert_eq!(engine.will_stats(alice_will).unwrap().total_claimed, 1_000_000);
    assert!(!engine.will_stats(alice_will).unwrap().cancelled);
    assert_eq!(engine.contract_balance(), 0);
}

#[test]
fn test_audit_trail_reflects_lifecycle() {
    let engine = funded_engine(1_000);
    let will_id = engine
        .create(
            &id("alice"),
            &[id("bob"), id("carol")],
            &[1_000_000, 2_000_000],
            1_100,
        )
        .unwrap();
    engine
        .update_beneficiary(&id("alice"), &id("carol"), 1_500_000)
        .unwrap();
    engine.oracle().advance_to(1_100);
    engine.claim(&id("bob"), will_id).unwrap();
    engine.cancel(&id("alice")).unwrap();

    match engine.last_created_event() {
        Some(EscrowEvent::Created {
            total_allocated, ..
        }) => assert_eq!(total_allocated, 3_000_000),
        other => panic!("expected Created, got {:?}", other),
    }
    match engine.last_updated_event() {
        Some(EscrowEvent::Updated {
            old_allocation,
            new_allocation,
            ..
        }) => {
            assert_eq!(old_allocation, 2_000_000);
            assert_eq!(new_allocation, 1_500_000);
        }
        other => panic!("expected Updated, got {:?}", other),
    }
    match engine.last_claimed_event() {
        Some(EscrowEvent::Claimed { amount, .. }) => assert_eq!(amount, 1_000_000),
        other => panic!("expected Claimed, got {:?}", other),
    }
    match engine.last_cancelled_event() {
        Some(EscrowEvent::Cancelled { refund, .. }) => assert_eq!(refund, 1_500_000),
        other => panic!("expected Cancelled, got {:?}", other),
    }
}
