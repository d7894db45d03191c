//! Escrow state container
//!
//! Holds the will registry, the beneficiary ledger, the owner index, and the
//! global will counter. The container is dumb storage plus lookups; all
//! invariant enforcement happens in the engine, which mutates it under one
//! exclusive lock.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use testament_core::{BeneficiaryAllocation, Identity, WillId, WillRecord};

/// Full mutable state of the escrow engine. Serializable so the store can
/// snapshot and restore it across restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscrowState {
    /// Will registry, keyed by will id.
    pub wills: BTreeMap<WillId, WillRecord>,
    /// Beneficiary ledger, keyed by will id then beneficiary identity.
    pub allocations: BTreeMap<WillId, BTreeMap<Identity, BeneficiaryAllocation>>,
    /// Owner identity -> will id. One lifetime slot per owner, never removed.
    pub owner_index: BTreeMap<Identity, WillId>,
    /// Last assigned will id; 0 means no will has ever been created.
    pub will_counter: WillId,
}

impl EscrowState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the global counter and return the id for a new will.
    pub fn next_will_id(&mut self) -> WillId {
        self.will_counter += 1;
        self.will_counter
    }

    /// Look up a will record.
    pub fn will(&self, will_id: WillId) -> Option<&WillRecord> {
        self.wills.get(&will_id)
    }

    /// Mutable will lookup.
    pub fn will_mut(&mut self, will_id: WillId) -> Option<&mut WillRecord> {
        self.wills.get_mut(&will_id)
    }

    /// Look up one beneficiary's allocation.
    pub fn allocation(&self, will_id: WillId, beneficiary: &Identity) -> Option<&BeneficiaryAllocation> {
        self.allocations.get(&will_id)?.get(beneficiary)
    }

    /// Mutable allocation lookup.
    pub fn allocation_mut(
        &mut self,
        will_id: WillId,
        beneficiary: &Identity,
    ) -> Option<&mut BeneficiaryAllocation> {
        self.allocations.get_mut(&will_id)?.get_mut(beneficiary)
    }

    /// All allocations of a will, beneficiary-ordered.
    pub fn allocations_for(&self, will_id: WillId) -> Vec<&BeneficiaryAllocation> {
        self.allocations
            .get(&will_id)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    /// Sum of a will's active allocations. Equals the will's
    /// `total_allocated` whenever the engine's invariants hold.
    pub fn allocation_total(&self, will_id: WillId) -> u64 {
        self.allocations
            .get(&will_id)
            .map(|m| m.values().map(|a| a.amount).sum())
            .unwrap_or(0)
    }

    /// The will id occupying `owner`'s lifetime slot, if any.
    pub fn owner_will_id(&self, owner: &Identity) -> Option<WillId> {
        self.owner_index.get(owner).copied()
    }
}
