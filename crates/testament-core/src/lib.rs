//! Testament Core
//!
//! Shared domain types for the Testament time-locked escrow engine.
//!
//! # Concepts
//!
//! - **Will**: one owner's escrowed balance, split among beneficiaries,
//!   locked until a release height
//! - **Beneficiary allocation**: a single beneficiary's share plus its
//!   claim status
//! - **Release threshold**: the height at which claims become valid
//!
//! The types here are pure data. The state machine that mutates them lives
//! in `testament-escrow`; ledger and storage collaborators live in
//! `testament-ledger` and `testament-store`.

pub mod account;
pub mod error;
pub mod events;
pub mod will;

pub use account::Identity;
pub use error::WillError;
pub use events::{EscrowEvent, EventKind};
pub use will::{BeneficiaryAllocation, WillId, WillRecord, WillStats, MAX_BENEFICIARIES};
