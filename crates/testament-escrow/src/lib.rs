//! Testament Escrow Engine
//!
//! The will/beneficiary state machine: create, pre-lock update, cancel, and
//! post-lock claim, over a trusted atomic-transfer ledger and a monotonic
//! height oracle.
//!
//! # Guarantees
//!
//! - Every operation validates completely before touching state or moving
//!   funds; a failed operation is observably a no-op
//! - One exclusive lock spans each operation's validate-mutate-transfer
//!   sequence, so no partial mutation is ever visible
//! - `total_claimed <= total_allocated` and "sum of active allocations ==
//!   `total_allocated`" hold at every point between operations
//! - A beneficiary can claim at most once per will
//!
//! # Example
//!
//! ```ignore
//! use testament_escrow::EscrowEngine;
//! use testament_ledger::{ManualHeight, MemoryLedger};
//!
//! let engine = EscrowEngine::new(MemoryLedger::new(), ManualHeight::new(1_000), "escrow".into());
//! engine.ledger().deposit(&"alice".into(), 5_000_000);
//!
//! let will_id = engine.create(
//!     &"alice".into(),
//!     &["bob".into(), "carol".into()],
//!     &[1_000_000, 2_000_000],
//!     1_100,
//! )?;
//!
//! engine.oracle().advance_to(1_100);
//! let claimed = engine.claim(&"bob".into(), will_id)?;
//! assert_eq!(claimed, 1_000_000);
//! ```

pub mod audit;
pub mod state;

pub use audit::{AuditLog, EventSink};
pub use state::EscrowState;

use std::collections::HashSet;
use std::sync::Mutex;
use testament_core::{
    BeneficiaryAllocation, EscrowEvent, EventKind, Identity, WillError, WillId, WillRecord,
    WillStats, MAX_BENEFICIARIES,
};
use testament_ledger::{HeightOracle, LedgerError, LedgerPort};

/// The escrow state machine.
///
/// Owns the ledger port, the height oracle, and all shared mutable state
/// (will registry, beneficiary ledger, owner index, will counter, audit
/// cells). All four operations and all queries go through `&self`; interior
/// mutability is a single [`Mutex`] whose guard spans each operation end to
/// end, so concurrent callers serialize per operation and never observe a
/// partially applied one.
pub struct EscrowEngine<L, H> {
    ledger: L,
    oracle: H,
    custody: Identity,
    inner: Mutex<Inner>,
}

struct Inner {
    state: EscrowState,
    audit: AuditLog,
    sinks: Vec<Box<dyn EventSink>>,
}

impl<L: LedgerPort, H: HeightOracle> EscrowEngine<L, H> {
    /// Create an engine with empty state. `custody` is the reserved ledger
    /// identity that pools all escrowed funds.
    pub fn new(ledger: L, oracle: H, custody: Identity) -> Self {
        Self::restore(ledger, oracle, custody, EscrowState::new(), AuditLog::new())
    }

    /// Rebuild an engine from a persisted snapshot.
    pub fn restore(
        ledger: L,
        oracle: H,
        custody: Identity,
        state: EscrowState,
        audit: AuditLog,
    ) -> Self {
        Self {
            ledger,
            oracle,
            custody,
            inner: Mutex::new(Inner {
                state,
                audit,
                sinks: Vec::new(),
            }),
        }
    }

    /// Register an append-only event observer. Every subsequent event is
    /// forwarded to it, in emission order, before the operation returns.
    pub fn add_sink(&self, sink: Box<dyn EventSink>) {
        self.lock().sinks.push(sink);
    }

    /// The ledger collaborator.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The height oracle collaborator.
    pub fn oracle(&self) -> &H {
        &self.oracle
    }

    /// The custody account identity.
    pub fn custody(&self) -> &Identity {
        &self.custody
    }

    /// Height as reported by the oracle right now.
    pub fn current_height(&self) -> u64 {
        self.oracle.current_height()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Create the caller's will: escrow the summed allocations into custody
    /// and record one allocation per beneficiary.
    ///
    /// `beneficiaries` and `allocations` are parallel lists (1..=50 entries,
    /// pairwise-distinct identities, positive amounts). `release_threshold`
    /// must be strictly above the current height. The caller keeps exactly
    /// one will slot for life — even a cancelled will blocks a second
    /// `create`.
    ///
    /// Returns the new will id (ids start at 1 and grow monotonically).
    pub fn create(
        &self,
        owner: &Identity,
        beneficiaries: &[Identity],
        allocations: &[u64],
        release_threshold: u64,
    ) -> Result<WillId, WillError> {
        let mut inner = self.lock();
        let height = self.oracle.current_height();

        if let Some(existing) = inner.state.owner_will_id(owner) {
            return Err(WillError::AlreadyExists(existing));
        }
        if release_threshold <= height {
            return Err(WillError::InvalidReleaseThreshold {
                threshold: release_threshold,
                current: height,
            });
        }
        if beneficiaries.is_empty() || beneficiaries.len() > MAX_BENEFICIARIES {
            return Err(WillError::InvalidBeneficiary);
        }
        if beneficiaries.len() != allocations.len() {
            return Err(WillError::InvalidAllocation);
        }
        if allocations.iter().any(|&a| a == 0) {
            return Err(WillError::ZeroAllocation);
        }

        let mut seen = HashSet::with_capacity(beneficiaries.len());
        for beneficiary in beneficiaries {
            if !seen.insert(beneficiary) {
                return Err(WillError::DuplicateBeneficiary(beneficiary.clone()));
            }
        }

        let mut total: u64 = 0;
        for &amount in allocations {
            total = total
                .checked_add(amount)
                .ok_or(WillError::InvalidAllocation)?;
        }
        let available = self.ledger.balance(owner);
        if total == 0 || available < total {
            return Err(WillError::InsufficientBalance {
                needed: total,
                available,
            });
        }

        // All preconditions hold; escrow the funds, then record everything.
        self.ledger
            .transfer(owner, &self.custody, total)
            .map_err(Self::map_insufficient)?;

        let will_id = inner.state.next_will_id();
        inner.state.wills.insert(
            will_id,
            WillRecord {
                id: will_id,
                owner: owner.clone(),
                release_threshold,
                total_allocated: total,
                total_claimed: 0,
                beneficiary_count: beneficiaries.len() as u32,
                cancelled: false,
                created_at: height,
            },
        );
        inner.state.owner_index.insert(owner.clone(), will_id);
        let entries = inner.state.allocations.entry(will_id).or_default();
        for (beneficiary, &amount) in beneficiaries.iter().zip(allocations) {
            entries.insert(
                beneficiary.clone(),
                BeneficiaryAllocation {
                    will_id,
                    beneficiary: beneficiary.clone(),
                    amount,
                    claimed: false,
                },
            );
        }

        log::info!(
            "will {} created by {}: {} escrowed across {} beneficiaries, unlocks at {}",
            will_id,
            owner,
            total,
            beneficiaries.len(),
            release_threshold
        );
        Self::emit(
            &mut inner,
            EscrowEvent::Created {
                will_id,
                owner: owner.clone(),
                total_allocated: total,
                beneficiary_count: beneficiaries.len() as u32,
                release_threshold,
                height,
            },
        );
        Ok(will_id)
    }

    /// Raise, lower, or add one beneficiary allocation on the caller's will.
    ///
    /// Only valid in the pre-lock window (height below the release
    /// threshold) and on a non-cancelled will. Exactly the delta moves:
    /// raising debits the caller, lowering refunds them. Adding a new
    /// beneficiary debits the full amount and counts against the 50-entry
    /// limit.
    pub fn update_beneficiary(
        &self,
        caller: &Identity,
        beneficiary: &Identity,
        new_allocation: u64,
    ) -> Result<bool, WillError> {
        let mut inner = self.lock();
        let height = self.oracle.current_height();

        let will_id = inner.state.owner_will_id(caller).ok_or(WillError::NotFound)?;
        let (owner_matches, cancelled, threshold, count) = {
            let will = inner
                .state
                .will(will_id)
                .expect("owner index points at missing will");
            (
                will.owner == *caller,
                will.cancelled,
                will.release_threshold,
                will.beneficiary_count,
            )
        };
        if !owner_matches {
            return Err(WillError::Unauthorized);
        }
        if cancelled {
            return Err(WillError::Cancelled);
        }
        if height >= threshold {
            return Err(WillError::ReleaseConditionAlreadyMet {
                current: height,
                threshold,
            });
        }
        if new_allocation == 0 {
            return Err(WillError::ZeroAllocation);
        }

        let old_allocation = inner.state.allocation(will_id, beneficiary).map(|a| a.amount);

        match old_allocation {
            Some(old) => {
                if new_allocation > old {
                    let delta = new_allocation - old;
                    let available = self.ledger.balance(caller);
                    if available < delta {
                        return Err(WillError::InsufficientBalance {
                            needed: delta,
                            available,
                        });
                    }
                    self.ledger
                        .transfer(caller, &self.custody, delta)
                        .map_err(Self::map_insufficient)?;
                } else if new_allocation < old {
                    self.pay_out(caller, old - new_allocation);
                }

                let alloc = inner
                    .state
                    .allocation_mut(will_id, beneficiary)
                    .expect("allocation just read");
                alloc.amount = new_allocation;
                alloc.claimed = false;

                let will = inner.state.will_mut(will_id).expect("will just read");
                will.total_allocated = will.total_allocated - old + new_allocation;
            }
            None => {
                if count as usize >= MAX_BENEFICIARIES {
                    return Err(WillError::AllocationLimitExceeded(MAX_BENEFICIARIES));
                }
                let available = self.ledger.balance(caller);
                if available < new_allocation {
                    return Err(WillError::InsufficientBalance {
                        needed: new_allocation,
                        available,
                    });
                }
                self.ledger
                    .transfer(caller, &self.custody, new_allocation)
                    .map_err(Self::map_insufficient)?;

                inner.state.allocations.entry(will_id).or_default().insert(
                    beneficiary.clone(),
                    BeneficiaryAllocation {
                        will_id,
                        beneficiary: beneficiary.clone(),
                        amount: new_allocation,
                        claimed: false,
                    },
                );
                let will = inner.state.will_mut(will_id).expect("will just read");
                will.beneficiary_count += 1;
                will.total_allocated += new_allocation;
            }
        }

        log::info!(
            "will {} allocation for {} set to {} (was {})",
            will_id,
            beneficiary,
            new_allocation,
            old_allocation.unwrap_or(0)
        );
        Self::emit(
            &mut inner,
            EscrowEvent::Updated {
                will_id,
                beneficiary: beneficiary.clone(),
                old_allocation: old_allocation.unwrap_or(0),
                new_allocation,
                height,
            },
        );
        Ok(true)
    }

    /// Cancel the caller's will and refund the unclaimed remainder.
    ///
    /// The record is retained (cancelled flag set), so all queries keep
    /// answering and the owner's lifetime slot stays occupied. A second
    /// cancel fails with [`WillError::Cancelled`] and refunds nothing.
    ///
    /// # Panics
    ///
    /// If the custody account cannot cover the refund. That is a
    /// bookkeeping defect, not a user error.
    pub fn cancel(&self, caller: &Identity) -> Result<u64, WillError> {
        let mut inner = self.lock();
        let height = self.oracle.current_height();

        let will_id = inner.state.owner_will_id(caller).ok_or(WillError::NotFound)?;
        let refund = {
            let will = inner
                .state
                .will(will_id)
                .expect("owner index points at missing will");
            if will.owner != *caller {
                return Err(WillError::Unauthorized);
            }
            if will.cancelled {
                return Err(WillError::Cancelled);
            }
            will.remaining()
        };

        let custody_balance = self.ledger.balance(&self.custody);
        assert!(
            custody_balance >= refund,
            "custody account underfunded: holds {}, owes {} refund on will {}",
            custody_balance,
            refund,
            will_id
        );

        inner
            .state
            .will_mut(will_id)
            .expect("will just read")
            .cancelled = true;
        self.pay_out(caller, refund);

        log::info!("will {} cancelled by {}, {} refunded", will_id, caller, refund);
        Self::emit(
            &mut inner,
            EscrowEvent::Cancelled {
                will_id,
                owner: caller.clone(),
                refund,
                height,
            },
        );
        Ok(refund)
    }

    /// Claim the caller's share of `will_id` once the release condition is
    /// met. Returns the claimed amount.
    ///
    /// Beneficiaries of the same will claim independently, in any order;
    /// claims across different wills never interact.
    ///
    /// # Panics
    ///
    /// If the custody account cannot cover the allocation (bookkeeping
    /// defect).
    pub fn claim(&self, caller: &Identity, will_id: WillId) -> Result<u64, WillError> {
        let mut inner = self.lock();
        let height = self.oracle.current_height();

        // One error for "no such will" and "not a beneficiary of it": the
        // caller resolves through the allocation, nothing else.
        let (amount, claimed) = inner
            .state
            .allocation(will_id, caller)
            .map(|a| (a.amount, a.claimed))
            .ok_or(WillError::InvalidBeneficiary)?;
        let (cancelled, threshold) = {
            let will = inner
                .state
                .will(will_id)
                .expect("allocation without will record");
            (will.cancelled, will.release_threshold)
        };

        if cancelled {
            return Err(WillError::Cancelled);
        }
        if height < threshold {
            return Err(WillError::ReleaseConditionNotMet {
                current: height,
                threshold,
            });
        }
        if claimed {
            return Err(WillError::AlreadyClaimed);
        }

        let custody_balance = self.ledger.balance(&self.custody);
        assert!(
            custody_balance >= amount,
            "custody account underfunded: holds {}, owes {} to {} on will {}",
            custody_balance,
            amount,
            caller,
            will_id
        );
        if amount == 0 {
            return Err(WillError::InvalidAllocation);
        }

        inner
            .state
            .allocation_mut(will_id, caller)
            .expect("allocation just read")
            .claimed = true;
        inner
            .state
            .will_mut(will_id)
            .expect("will just read")
            .total_claimed += amount;
        self.pay_out(caller, amount);

        log::info!("will {}: {} claimed {}", will_id, caller, amount);
        Self::emit(
            &mut inner,
            EscrowEvent::Claimed {
                will_id,
                beneficiary: caller.clone(),
                amount,
                height,
            },
        );
        Ok(amount)
    }

    // ========================================================================
    // Read-only queries
    // ========================================================================

    /// The will record, if `will_id` exists.
    pub fn will_info(&self, will_id: WillId) -> Option<WillRecord> {
        self.lock().state.will(will_id).cloned()
    }

    /// One beneficiary's allocation, if present.
    pub fn beneficiary_info(
        &self,
        will_id: WillId,
        beneficiary: &Identity,
    ) -> Option<BeneficiaryAllocation> {
        self.lock().state.allocation(will_id, beneficiary).cloned()
    }

    /// The will occupying `owner`'s lifetime slot (cancelled or not).
    pub fn owner_will_id(&self, owner: &Identity) -> Option<WillId> {
        self.lock().state.owner_will_id(owner)
    }

    /// Whether `will_id`'s release condition is met at the current height.
    /// `None` for an unknown will.
    pub fn is_release_condition_met(&self, will_id: WillId) -> Option<bool> {
        let height = self.oracle.current_height();
        self.lock()
            .state
            .will(will_id)
            .map(|w| w.is_unlockable(height))
    }

    /// Whether a `claim(beneficiary, will_id)` would succeed right now.
    pub fn can_claim(&self, will_id: WillId, beneficiary: &Identity) -> bool {
        let height = self.oracle.current_height();
        let inner = self.lock();
        match (
            inner.state.will(will_id),
            inner.state.allocation(will_id, beneficiary),
        ) {
            (Some(will), Some(alloc)) => {
                !will.cancelled && will.is_unlockable(height) && !alloc.claimed && alloc.amount > 0
            }
            _ => false,
        }
    }

    /// Aggregate stats for a will.
    pub fn will_stats(&self, will_id: WillId) -> Option<WillStats> {
        self.lock().state.will(will_id).map(|w| w.stats())
    }

    /// The last assigned will id (0 before the first `create`).
    pub fn will_counter(&self) -> WillId {
        self.lock().state.will_counter
    }

    /// Balance of the custody account as reported by the ledger.
    pub fn contract_balance(&self) -> u64 {
        self.ledger.balance(&self.custody)
    }

    /// Most recent event of `kind`.
    pub fn last_event(&self, kind: EventKind) -> Option<EscrowEvent> {
        self.lock().audit.last(kind).cloned()
    }

    /// Most recent `Created` event.
    pub fn last_created_event(&self) -> Option<EscrowEvent> {
        self.last_event(EventKind::Created)
    }

    /// Most recent `Updated` event.
    pub fn last_updated_event(&self) -> Option<EscrowEvent> {
        self.last_event(EventKind::Updated)
    }

    /// Most recent `Cancelled` event.
    pub fn last_cancelled_event(&self) -> Option<EscrowEvent> {
        self.last_event(EventKind::Cancelled)
    }

    /// Most recent `Claimed` event.
    pub fn last_claimed_event(&self) -> Option<EscrowEvent> {
        self.last_event(EventKind::Claimed)
    }

    /// Clone of the full state, for persistence.
    pub fn state_snapshot(&self) -> EscrowState {
        self.lock().state.clone()
    }

    /// Clone of the audit cells, for persistence.
    pub fn audit_snapshot(&self) -> AuditLog {
        self.lock().audit.clone()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("engine lock poisoned")
    }

    /// Pay `amount` out of custody. Solvency was asserted by the caller;
    /// a failing transfer here is the same bookkeeping defect and aborts.
    fn pay_out(&self, to: &Identity, amount: u64) {
        if amount == 0 {
            return;
        }
        self.ledger
            .transfer(&self.custody, to, amount)
            .expect("custody solvency checked before payout");
    }

    fn emit(inner: &mut Inner, event: EscrowEvent) {
        for sink in &inner.sinks {
            sink.append(&event);
        }
        inner.audit.record(event);
    }

    fn map_insufficient(err: LedgerError) -> WillError {
        match err {
            LedgerError::InsufficientFunds {
                available, needed, ..
            } => WillError::InsufficientBalance { needed, available },
        }
    }
}
