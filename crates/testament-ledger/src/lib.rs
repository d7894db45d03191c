//! Testament Ledger Port
//!
//! Contracts for the two external collaborators the escrow engine relies on:
//!
//! - [`LedgerPort`]: atomic debit/credit of a single fungible asset between
//!   two identities, plus balance query. The underlying ledger is trusted;
//!   the engine never implements consensus.
//! - [`HeightOracle`]: a monotonically non-decreasing counter (block height)
//!   that drives release conditions.
//!
//! Reference implementations are provided for tests and the daemon:
//! [`MemoryLedger`], [`ManualHeight`], and [`FileHeight`] (a height fed by
//! an external process through a file).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use testament_core::Identity;
use thiserror::Error;

/// Errors from ledger transfers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient funds: {account} holds {available}, transfer needs {needed}")]
    InsufficientFunds {
        account: Identity,
        available: u64,
        needed: u64,
    },
}

/// Atomic single-asset transfer between identities.
///
/// A transfer either moves the full amount or fails with
/// [`LedgerError::InsufficientFunds`] and moves nothing.
pub trait LedgerPort: Send + Sync {
    /// Atomically debit `from` and credit `to` by `amount`.
    fn transfer(&self, from: &Identity, to: &Identity, amount: u64) -> Result<(), LedgerError>;

    /// Current balance of `account` (0 for unknown accounts).
    fn balance(&self, account: &Identity) -> u64;
}

/// Monotonically non-decreasing counter.
pub trait HeightOracle: Send + Sync {
    /// The current height. Never decreases across calls.
    fn current_height(&self) -> u64;
}

/// In-memory ledger for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    accounts: Mutex<HashMap<Identity, u64>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `account` out of thin air. Test/funding helper.
    pub fn deposit(&self, account: &Identity, amount: u64) {
        let mut accounts = self.accounts.lock().expect("ledger lock poisoned");
        *accounts.entry(account.clone()).or_insert(0) += amount;
    }

    /// Sum of all balances. Conservation checks in tests rely on this.
    pub fn total_supply(&self) -> u64 {
        let accounts = self.accounts.lock().expect("ledger lock poisoned");
        accounts.values().sum()
    }
}

impl LedgerPort for MemoryLedger {
    fn transfer(&self, from: &Identity, to: &Identity, amount: u64) -> Result<(), LedgerError> {
        let mut accounts = self.accounts.lock().expect("ledger lock poisoned");

        let available = accounts.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                account: from.clone(),
                available,
                needed: amount,
            });
        }

        *accounts.get_mut(from).expect("debtor just checked") -= amount;
        *accounts.entry(to.clone()).or_insert(0) += amount;
        log::debug!("transfer {} -> {}: {}", from, to, amount);
        Ok(())
    }

    fn balance(&self, account: &Identity) -> u64 {
        let accounts = self.accounts.lock().expect("ledger lock poisoned");
        accounts.get(account).copied().unwrap_or(0)
    }
}

/// Height oracle driven by explicit `advance_to` calls. Tests use this to
/// step past release thresholds.
#[derive(Debug, Default)]
pub struct ManualHeight {
    height: AtomicU64,
}

impl ManualHeight {
    /// Start at `height`.
    pub fn new(height: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
        }
    }

    /// Advance to `height`. Calls that would move the counter backwards are
    /// ignored, preserving monotonicity.
    pub fn advance_to(&self, height: u64) {
        self.height.fetch_max(height, Ordering::SeqCst);
    }

    /// Advance by `blocks`.
    pub fn advance_by(&self, blocks: u64) {
        self.height.fetch_add(blocks, Ordering::SeqCst);
    }
}

impl HeightOracle for ManualHeight {
    fn current_height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }
}

/// Height oracle backed by a file an external process keeps current.
///
/// The file holds a single decimal number. Reads that fail, parse badly, or
/// would move the height backwards leave the last good value in place, so
/// the oracle stays monotonic even against a misbehaving writer.
#[derive(Debug)]
pub struct FileHeight {
    path: PathBuf,
    last_seen: AtomicU64,
}

impl FileHeight {
    /// Watch `path` for height updates.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_seen: AtomicU64::new(0),
        }
    }
}

impl HeightOracle for FileHeight {
    fn current_height(&self) -> u64 {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match contents.trim().parse::<u64>() {
                Ok(h) => {
                    self.last_seen.fetch_max(h, Ordering::SeqCst);
                }
                Err(e) => {
                    log::warn!("height file {} unparsable: {}", self.path.display(), e);
                }
            },
            Err(e) => {
                log::warn!("height file {} unreadable: {}", self.path.display(), e);
            }
        }
        self.last_seen.load(Ordering::SeqCst)
    }
}
