//! End-to-end test for durability: the engine's state and event history
//! survive a full stop/restart through the SQLite store, and the watch
//! service picks up release conditions over the restored snapshot.

use testament_core::{EventKind, Identity, WillError};
use testament_escrow::EscrowEngine;
use testament_ledger::{ManualHeight, MemoryLedger};
use testament_store::{
    event_list, event_list_for_will, load_state, open_store, save_state, SqliteEventSink,
};
use testament_watch::{ReleaseEvent, ReleaseWatch, WatchConfig};

fn id(s: &str) -> Identity {
    Identity::new(s)
}

#[test]
fn test_state_and_history_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("testament.db");

    // ── Session 1: operate the engine with a durable event sink ─────────
    {
        let engine = EscrowEngine::new(
            MemoryLedger::new(),
            ManualHeight::new(1_000),
            id("escrow-custody"),
        );
        engine.ledger().deposit(&id("alice"), 10_000_000);
        engine.add_sink(Box::new(SqliteEventSink::open(&db_path).unwrap()));

        let will_id = engine
            .create(
                &id("alice"),
                &[id("bob"), id("carol")],
                &[1_000_000, 2_000_000],
                1_100,
            )
            .unwrap();
        engine
            .update_beneficiary(&id("alice"), &id("bob"), 1_200_000)
            .unwrap();
        engine.oracle().advance_to(1_100);
        engine.claim(&id("bob"), will_id).unwrap();

        let mut conn = open_store(&db_path).unwrap();
        save_state(&mut conn, &engine.state_snapshot(), &engine.audit_snapshot()).unwrap();
    }

    // ── Session 2: restore and keep operating where session 1 stopped ───
    {
        let conn = open_store(&db_path).unwrap();
        let (state, audit) = load_state(&conn).unwrap();

        // The append-only log kept the full history, not just the cells
        let history = event_list(&conn).unwrap();
        let kinds: Vec<EventKind> = history.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Created, EventKind::Updated, EventKind::Claimed]
        );
        assert_eq!(event_list_for_will(&conn, 1).unwrap().len(), 3);

        // Rebuild the ledger side: custody still owes carol her 2M
        let ledger = MemoryLedger::new();
        ledger.deposit(&id("escrow-custody"), 2_000_000);
        let engine = EscrowEngine::restore(
            ledger,
            ManualHeight::new(1_150),
            id("escrow-custody"),
            state,
            audit,
        );

        assert_eq!(engine.will_counter(), 1);
        assert_eq!(engine.last_claimed_event().unwrap().will_id(), 1);
        assert!(engine.beneficiary_info(1, &id("bob")).unwrap().claimed);
        assert_eq!(
            engine.claim(&id("bob"), 1).unwrap_err(),
            WillError::AlreadyClaimed
        );

        // Carol's pending claim settles against the restored snapshot
        assert_eq!(engine.claim(&id("carol"), 1).unwrap(), 2_000_000);
        assert_eq!(engine.contract_balance(), 0);

        let stats = engine.will_stats(1).unwrap();
        assert_eq!(stats.total_claimed, stats.total_allocated);
    }
}

#[test]
fn test_watch_announces_release_over_restored_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("testament.db");

    // Persist a locked will
    {
        let engine = EscrowEngine::new(
            MemoryLedger::new(),
            ManualHeight::new(1_000),
            id("escrow-custody"),
        );
        engine.ledger().deposit(&id("alice"), 1_000_000);
        engine
            .create(&id("alice"), &[id("bob")], &[1_000_000], 1_100)
            .unwrap();

        let mut conn = open_store(&db_path).unwrap();
        save_state(&mut conn, &engine.state_snapshot(), &engine.audit_snapshot()).unwrap();
    }

    let (state, _) = load_state(&open_store(&db_path).unwrap()).unwrap();
    let config = WatchConfig {
        state_path: dir.path().join("watch_state.json"),
        poll_interval_secs: 600,
        min_poll_interval_secs: 0,
        warning_threshold_blocks: 50,
    };

    // Below the warning window: quiet
    let oracle = ManualHeight::new(1_000);
    let mut watch = ReleaseWatch::new(oracle, config.clone()).unwrap();
    assert!(watch.poll(&state).unwrap().is_empty());

    // Inside the window: one approaching announcement
    watch = ReleaseWatch::new(ManualHeight::new(1_070), config.clone()).unwrap();
    let events = watch.poll(&state).unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        ReleaseEvent::ReleaseApproaching {
            will_id: 1,
            blocks_remaining: 30,
            ..
        }
    ));

    // Past the threshold: one reached announcement, then silence
    watch = ReleaseWatch::new(ManualHeight::new(1_100), config).unwrap();
    let events = watch.poll(&state).unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        ReleaseEvent::ReleaseReached { will_id: 1, .. }
    ));
    assert!(watch.poll(&state).unwrap().is_empty());
}
