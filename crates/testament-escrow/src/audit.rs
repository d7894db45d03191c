//! Audit cells and event sinks
//!
//! The engine keeps exactly one cell per event kind, overwritten on every
//! occurrence — the queries in the external interface only ever ask for the
//! most recent event of a kind. Consumers that need full history register an
//! [`EventSink`]; the engine forwards every event to every sink, in emission
//! order, before the operation returns.

use serde::{Deserialize, Serialize};
use testament_core::{EscrowEvent, EventKind};

/// Append-only observer of escrow events.
///
/// Sinks are observability, not bookkeeping: a sink that fails must handle
/// (or log) the failure itself rather than unwind into the engine.
pub trait EventSink: Send + Sync {
    /// Called once per emitted event, under the engine's operation lock.
    fn append(&self, event: &EscrowEvent);
}

/// Most-recent-event-per-kind cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLog {
    last_created: Option<EscrowEvent>,
    last_updated: Option<EscrowEvent>,
    last_cancelled: Option<EscrowEvent>,
    last_claimed: Option<EscrowEvent>,
}

impl AuditLog {
    /// Empty cells.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the cell matching the event's kind.
    pub fn record(&mut self, event: EscrowEvent) {
        let cell = self.cell_mut(event.kind());
        *cell = Some(event);
    }

    /// The most recent event of `kind`, if any has occurred.
    pub fn last(&self, kind: EventKind) -> Option<&EscrowEvent> {
        match kind {
            EventKind::Created => self.last_created.as_ref(),
            EventKind::Updated => self.last_updated.as_ref(),
            EventKind::Cancelled => self.last_cancelled.as_ref(),
            EventKind::Claimed => self.last_claimed.as_ref(),
        }
    }

    /// Install a cell directly; used when restoring from storage.
    pub fn restore(&mut self, event: EscrowEvent) {
        self.record(event);
    }

    fn cell_mut(&mut self, kind: EventKind) -> &mut Option<EscrowEvent> {
        match kind {
            EventKind::Created => &mut self.last_created,
            EventKind::Updated => &mut self.last_updated,
            EventKind::Cancelled => &mut self.last_cancelled,
            EventKind::Claimed => &mut self.last_claimed,
        }
    }
}
