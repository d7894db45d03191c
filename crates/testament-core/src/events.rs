//! Events emitted by the escrow engine
//!
//! One event per successful operation. The engine keeps only the most
//! recent event of each kind (the audit cells); consumers that need full
//! history attach an append-only sink instead.

use crate::account::Identity;
use crate::will::WillId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Events emitted by the escrow engine on each successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowEvent {
    /// A will was created and funded.
    Created {
        will_id: WillId,
        owner: Identity,
        /// Sum escrowed into custody.
        total_allocated: u64,
        beneficiary_count: u32,
        release_threshold: u64,
        /// Height observed at creation.
        height: u64,
    },

    /// A beneficiary allocation was raised, lowered, or added.
    Updated {
        will_id: WillId,
        beneficiary: Identity,
        /// 0 when the beneficiary was newly added.
        old_allocation: u64,
        new_allocation: u64,
        height: u64,
    },

    /// The will was cancelled and the unclaimed remainder refunded.
    Cancelled {
        will_id: WillId,
        owner: Identity,
        refund: u64,
        height: u64,
    },

    /// A beneficiary claimed their share.
    Claimed {
        will_id: WillId,
        beneficiary: Identity,
        amount: u64,
        height: u64,
    },
}

impl EscrowEvent {
    /// The will this event concerns.
    pub fn will_id(&self) -> WillId {
        match self {
            EscrowEvent::Created { will_id, .. }
            | EscrowEvent::Updated { will_id, .. }
            | EscrowEvent::Cancelled { will_id, .. }
            | EscrowEvent::Claimed { will_id, .. } => *will_id,
        }
    }

    /// The event's kind (audit-cell key).
    pub fn kind(&self) -> EventKind {
        match self {
            EscrowEvent::Created { .. } => EventKind::Created,
            EscrowEvent::Updated { .. } => EventKind::Updated,
            EscrowEvent::Cancelled { .. } => EventKind::Cancelled,
            EscrowEvent::Claimed { .. } => EventKind::Claimed,
        }
    }
}

/// The four event kinds, one audit cell each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Updated,
    Cancelled,
    Claimed,
}

impl EventKind {
    /// All kinds, in emission-precedence order.
    pub const ALL: [EventKind; 4] = [
        EventKind::Created,
        EventKind::Updated,
        EventKind::Cancelled,
        EventKind::Claimed,
    ];

    /// Stable string form used as storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Cancelled => "cancelled",
            EventKind::Claimed => "claimed",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(EventKind::Created),
            "updated" => Some(EventKind::Updated),
            "cancelled" => Some(EventKind::Cancelled),
            "claimed" => Some(EventKind::Claimed),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
