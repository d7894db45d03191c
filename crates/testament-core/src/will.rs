//! Will and beneficiary records
//!
//! A will custodies one owner's escrowed balance and subdivides it among up
//! to [`MAX_BENEFICIARIES`] beneficiaries. Records are never deleted: a
//! cancelled will keeps its rows (and its owner-index slot) for historical
//! queries.

use crate::account::Identity;
use serde::{Deserialize, Serialize};

/// Will identifier. Assigned monotonically by the engine, starting at 1.
pub type WillId = u64;

/// Upper bound on beneficiaries per will.
pub const MAX_BENEFICIARIES: usize = 50;

/// A will record.
///
/// Invariants maintained by the escrow engine:
/// - `total_claimed <= total_allocated`
/// - `beneficiary_count <= MAX_BENEFICIARIES`
/// - `release_threshold > created_at`
/// - the sum of the will's active allocations equals `total_allocated`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WillRecord {
    /// Unique will id.
    pub id: WillId,
    /// The owner who created (and funds) this will.
    pub owner: Identity,
    /// Height at which beneficiary claims become valid.
    pub release_threshold: u64,
    /// Sum of all beneficiary allocations.
    pub total_allocated: u64,
    /// Sum already paid out to beneficiaries.
    pub total_claimed: u64,
    /// Number of beneficiary allocations.
    pub beneficiary_count: u32,
    /// Set by `cancel`; terminal.
    pub cancelled: bool,
    /// Height observed when the will was created.
    pub created_at: u64,
}

impl WillRecord {
    /// Escrowed balance not yet claimed. This is the refund paid on cancel.
    pub fn remaining(&self) -> u64 {
        self.total_allocated - self.total_claimed
    }

    /// Whether the release condition is met at `height`.
    pub fn is_unlockable(&self, height: u64) -> bool {
        height >= self.release_threshold
    }

    /// Read-model snapshot for the stats query.
    pub fn stats(&self) -> WillStats {
        WillStats {
            total_allocated: self.total_allocated,
            total_claimed: self.total_claimed,
            beneficiary_count: self.beneficiary_count,
            cancelled: self.cancelled,
        }
    }
}

/// One beneficiary's share of a will.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryAllocation {
    /// The will this allocation belongs to.
    pub will_id: WillId,
    /// The beneficiary entitled to the share.
    pub beneficiary: Identity,
    /// Entitled amount. Positive while the allocation is active.
    pub amount: u64,
    /// Set once the beneficiary has claimed; terminal.
    pub claimed: bool,
}

/// Aggregate figures reported by the stats query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WillStats {
    pub total_allocated: u64,
    pub total_claimed: u64,
    pub beneficiary_count: u32,
    pub cancelled: bool,
}
