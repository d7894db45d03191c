//! SQLite persistence layer.
//!
//! Stores all durable escrow state so a deployment survives restarts:
//! the will registry, the beneficiary ledger, the owner index, the four
//! single-slot audit cells, and an append-only event log. The engine never
//! touches SQL — it stays in memory and this crate is wired in from the
//! outside, as a snapshot target plus an [`EventSink`].

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use testament_core::{BeneficiaryAllocation, EscrowEvent, EventKind, Identity, WillId, WillRecord};
use testament_escrow::{AuditLog, EscrowState, EventSink};
use thiserror::Error;

/// Errors from store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("event encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Open (or create) the database at `path` and run migrations.
pub fn open_store(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;

    // WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS wills (
            id                INTEGER PRIMARY KEY,
            owner             TEXT NOT NULL,
            release_threshold INTEGER NOT NULL,
            total_allocated   INTEGER NOT NULL,
            total_claimed     INTEGER NOT NULL,
            beneficiary_count INTEGER NOT NULL,
            cancelled         INTEGER NOT NULL DEFAULT 0,
            created_at        INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS beneficiaries (
            will_id     INTEGER NOT NULL,
            beneficiary TEXT NOT NULL,
            amount      INTEGER NOT NULL,
            claimed     INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (will_id, beneficiary)
        );

        CREATE TABLE IF NOT EXISTS owner_index (
            owner   TEXT PRIMARY KEY,
            will_id INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_cells (
            kind    TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS event_log (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            kind    TEXT NOT NULL,
            will_id INTEGER NOT NULL,
            payload TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    Ok(conn)
}

// ============================================================================
// Will registry
// ============================================================================

/// Insert or replace a will record.
pub fn will_upsert(conn: &Connection, will: &WillRecord) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO wills (id, owner, release_threshold, total_allocated,
                            total_claimed, beneficiary_count, cancelled, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            total_allocated = excluded.total_allocated,
            total_claimed = excluded.total_claimed,
            beneficiary_count = excluded.beneficiary_count,
            cancelled = excluded.cancelled",
        params![
            will.id,
            will.owner.as_str(),
            will.release_threshold,
            will.total_allocated,
            will.total_claimed,
            will.beneficiary_count,
            will.cancelled as i32,
            will.created_at,
        ],
    )?;
    Ok(())
}

/// Get a will by id.
pub fn will_get(conn: &Connection, will_id: WillId) -> Result<Option<WillRecord>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, owner, release_threshold, total_allocated, total_claimed,
                beneficiary_count, cancelled, created_at
         FROM wills WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![will_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(will_from_row(row)?)),
        None => Ok(None),
    }
}

/// List all wills, id-ordered.
pub fn will_list(conn: &Connection) -> Result<Vec<WillRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, owner, release_threshold, total_allocated, total_claimed,
                beneficiary_count, cancelled, created_at
         FROM wills ORDER BY id",
    )?;
    let rows = stmt.query_map([], will_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn will_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WillRecord> {
    Ok(WillRecord {
        id: row.get(0)?,
        owner: Identity::new(row.get::<_, String>(1)?),
        release_threshold: row.get(2)?,
        total_allocated: row.get(3)?,
        total_claimed: row.get(4)?,
        beneficiary_count: row.get(5)?,
        cancelled: row.get::<_, i32>(6)? != 0,
        created_at: row.get(7)?,
    })
}

// ============================================================================
// Beneficiary ledger
// ============================================================================

/// Insert or replace a beneficiary allocation.
pub fn beneficiary_upsert(
    conn: &Connection,
    alloc: &BeneficiaryAllocation,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO beneficiaries (will_id, beneficiary, amount, claimed)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(will_id, beneficiary) DO UPDATE SET
            amount = excluded.amount,
            claimed = excluded.claimed",
        params![
            alloc.will_id,
            alloc.beneficiary.as_str(),
            alloc.amount,
            alloc.claimed as i32,
        ],
    )?;
    Ok(())
}

/// Get one beneficiary's allocation.
pub fn beneficiary_get(
    conn: &Connection,
    will_id: WillId,
    beneficiary: &Identity,
) -> Result<Option<BeneficiaryAllocation>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT will_id, beneficiary, amount, claimed
         FROM beneficiaries WHERE will_id = ?1 AND beneficiary = ?2",
    )?;
    let mut rows = stmt.query(params![will_id, beneficiary.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(beneficiary_from_row(row)?)),
        None => Ok(None),
    }
}

/// List a will's allocations, beneficiary-ordered.
pub fn beneficiary_list(
    conn: &Connection,
    will_id: WillId,
) -> Result<Vec<BeneficiaryAllocation>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT will_id, beneficiary, amount, claimed
         FROM beneficiaries WHERE will_id = ?1 ORDER BY beneficiary",
    )?;
    let rows = stmt.query_map(params![will_id], beneficiary_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn beneficiary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BeneficiaryAllocation> {
    Ok(BeneficiaryAllocation {
        will_id: row.get(0)?,
        beneficiary: Identity::new(row.get::<_, String>(1)?),
        amount: row.get(2)?,
        claimed: row.get::<_, i32>(3)? != 0,
    })
}

// ============================================================================
// Owner index
// ============================================================================

/// Record `owner`'s lifetime will slot. The slot is write-once: a second
/// insert for the same owner is a no-op, matching the never-removed index
/// the engine maintains.
pub fn owner_index_set(
    conn: &Connection,
    owner: &Identity,
    will_id: WillId,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO owner_index (owner, will_id) VALUES (?1, ?2)
         ON CONFLICT(owner) DO NOTHING",
        params![owner.as_str(), will_id],
    )?;
    Ok(())
}

/// The will id in `owner`'s slot, if any.
pub fn owner_index_get(conn: &Connection, owner: &Identity) -> Result<Option<WillId>, StoreError> {
    let mut stmt = conn.prepare_cached("SELECT will_id FROM owner_index WHERE owner = ?1")?;
    let mut rows = stmt.query(params![owner.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

// ============================================================================
// Will counter
// ============================================================================

/// Persist the global will counter.
pub fn will_counter_set(conn: &Connection, counter: WillId) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES ('will_counter', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![counter.to_string()],
    )?;
    Ok(())
}

/// Read the global will counter (0 when never persisted).
pub fn will_counter_get(conn: &Connection) -> Result<WillId, StoreError> {
    let mut stmt = conn.prepare_cached("SELECT value FROM meta WHERE key = 'will_counter'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let value: String = row.get(0)?;
            Ok(value.parse().unwrap_or(0))
        }
        None => Ok(0),
    }
}

// ============================================================================
// Audit cells + event log
// ============================================================================

/// Overwrite the single-slot audit cell for the event's kind.
pub fn audit_set(conn: &Connection, event: &EscrowEvent) -> Result<(), StoreError> {
    let payload = serde_json::to_string(event)?;
    conn.execute(
        "INSERT INTO audit_cells (kind, payload) VALUES (?1, ?2)
         ON CONFLICT(kind) DO UPDATE SET payload = excluded.payload",
        params![event.kind().as_str(), payload],
    )?;
    Ok(())
}

/// The most recent event of `kind`, if one was ever persisted.
pub fn audit_get(conn: &Connection, kind: EventKind) -> Result<Option<EscrowEvent>, StoreError> {
    let mut stmt = conn.prepare_cached("SELECT payload FROM audit_cells WHERE kind = ?1")?;
    let mut rows = stmt.query(params![kind.as_str()])?;
    match rows.next()? {
        Some(row) => {
            let payload: String = row.get(0)?;
            Ok(Some(serde_json::from_str(&payload)?))
        }
        None => Ok(None),
    }
}

/// Append an event to the durable history.
pub fn event_append(conn: &Connection, event: &EscrowEvent) -> Result<(), StoreError> {
    let payload = serde_json::to_string(event)?;
    conn.execute(
        "INSERT INTO event_log (kind, will_id, payload) VALUES (?1, ?2, ?3)",
        params![event.kind().as_str(), event.will_id(), payload],
    )?;
    Ok(())
}

/// Full event history, oldest first.
pub fn event_list(conn: &Connection) -> Result<Vec<EscrowEvent>, StoreError> {
    let mut stmt = conn.prepare("SELECT payload FROM event_log ORDER BY id")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut events = Vec::new();
    for payload in rows {
        events.push(serde_json::from_str(&payload?)?);
    }
    Ok(events)
}

/// Event history for one will, oldest first.
pub fn event_list_for_will(
    conn: &Connection,
    will_id: WillId,
) -> Result<Vec<EscrowEvent>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT payload FROM event_log WHERE will_id = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![will_id], |row| row.get::<_, String>(0))?;
    let mut events = Vec::new();
    for payload in rows {
        events.push(serde_json::from_str(&payload?)?);
    }
    Ok(events)
}

/// Event history of one kind, oldest first.
pub fn event_list_by_kind(
    conn: &Connection,
    kind: EventKind,
) -> Result<Vec<EscrowEvent>, StoreError> {
    let mut stmt = conn.prepare("SELECT payload FROM event_log WHERE kind = ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![kind.as_str()], |row| row.get::<_, String>(0))?;
    let mut events = Vec::new();
    for payload in rows {
        events.push(serde_json::from_str(&payload?)?);
    }
    Ok(events)
}

// ============================================================================
// Snapshot save / load
// ============================================================================

/// Persist a full engine snapshot in one transaction.
///
/// Records are upserted, never deleted — the engine never deletes either, so
/// the tables converge on exactly the in-memory state.
pub fn save_state(
    conn: &mut Connection,
    state: &EscrowState,
    audit: &AuditLog,
) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    {
        for will in state.wills.values() {
            will_upsert(&tx, will)?;
        }
        for allocations in state.allocations.values() {
            for alloc in allocations.values() {
                beneficiary_upsert(&tx, alloc)?;
            }
        }
        for (owner, &will_id) in &state.owner_index {
            owner_index_set(&tx, owner, will_id)?;
        }
        will_counter_set(&tx, state.will_counter)?;
        for kind in EventKind::ALL {
            if let Some(event) = audit.last(kind) {
                audit_set(&tx, event)?;
            }
        }
    }
    tx.commit()?;
    Ok(())
}

/// Rebuild a full engine snapshot from the database.
pub fn load_state(conn: &Connection) -> Result<(EscrowState, AuditLog), StoreError> {
    let mut state = EscrowState::new();

    for will in will_list(conn)? {
        state.allocations.entry(will.id).or_default();
        state.wills.insert(will.id, will);
    }
    {
        let mut stmt =
            conn.prepare("SELECT will_id, beneficiary, amount, claimed FROM beneficiaries")?;
        let rows = stmt.query_map([], beneficiary_from_row)?;
        for alloc in rows {
            let alloc = alloc?;
            state
                .allocations
                .entry(alloc.will_id)
                .or_default()
                .insert(alloc.beneficiary.clone(), alloc);
        }
    }
    {
        let mut stmt = conn.prepare("SELECT owner, will_id FROM owner_index")?;
        let rows = stmt.query_map([], |row| {
            Ok((Identity::new(row.get::<_, String>(0)?), row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (owner, will_id) = row?;
            state.owner_index.insert(owner, will_id);
        }
    }
    state.will_counter = will_counter_get(conn)?;

    let mut audit = AuditLog::new();
    for kind in EventKind::ALL {
        if let Some(event) = audit_get(conn, kind)? {
            audit.restore(event);
        }
    }

    Ok((state, audit))
}

// ============================================================================
// Event sink
// ============================================================================

/// Durable [`EventSink`]: appends every engine event to the `event_log`
/// table and mirrors the audit cells.
///
/// Failures are logged, not propagated — the sink is an observer and must
/// not unwind into the engine's operation lock.
pub struct SqliteEventSink {
    conn: Mutex<Connection>,
}

impl SqliteEventSink {
    /// Wrap an open store connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open a dedicated connection to the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(open_store(path)?))
    }
}

impl EventSink for SqliteEventSink {
    fn append(&self, event: &EscrowEvent) {
        let conn = self.conn.lock().expect("sink lock poisoned");
        if let Err(e) = event_append(&conn, event) {
            log::error!("failed to append event to store: {}", e);
        }
        if let Err(e) = audit_set(&conn, event) {
            log::error!("failed to persist audit cell: {}", e);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
