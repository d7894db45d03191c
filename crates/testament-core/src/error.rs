//! Escrow operation errors
//!
//! Every failure of a state-machine operation surfaces as one of these
//! kinds, synchronously, before any state or balance has changed. Custody
//! solvency violations are deliberately NOT represented here: a custody
//! balance that cannot cover an imminent payout is a bookkeeping defect and
//! aborts instead of returning an error.

use crate::account::Identity;
use crate::will::WillId;
use thiserror::Error;

/// Typed failure of an escrow operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WillError {
    #[error("caller is not the owner of this will")]
    Unauthorized,

    #[error("caller owns no will")]
    NotFound,

    #[error("caller already owns will {0}")]
    AlreadyExists(WillId),

    #[error("no such beneficiary allocation")]
    InvalidBeneficiary,

    #[error("invalid allocation list")]
    InvalidAllocation,

    #[error("release condition not met: height {current} < threshold {threshold}")]
    ReleaseConditionNotMet { current: u64, threshold: u64 },

    #[error("release condition already met: height {current} >= threshold {threshold}")]
    ReleaseConditionAlreadyMet { current: u64, threshold: u64 },

    #[error("will is cancelled")]
    Cancelled,

    #[error("allocation already claimed")]
    AlreadyClaimed,

    #[error("insufficient balance: {available} available, {needed} needed")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("release threshold {threshold} is not above current height {current}")]
    InvalidReleaseThreshold { threshold: u64, current: u64 },

    #[error("allocation amount must be positive")]
    ZeroAllocation,

    #[error("beneficiary limit reached ({0} allocations)")]
    AllocationLimitExceeded(usize),

    #[error("duplicate beneficiary: {0}")]
    DuplicateBeneficiary(Identity),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = WillError::InsufficientBalance {
            needed: 3_000_000,
            available: 1_000_000,
        };
        assert_eq!(
            err.to_string(),
            "insufficient balance: 1000000 available, 3000000 needed"
        );

        let err = WillError::DuplicateBeneficiary(Identity::new("bob"));
        assert_eq!(err.to_string(), "duplicate beneficiary: bob");

        let err = WillError::InvalidReleaseThreshold {
            threshold: 100,
            current: 150,
        };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("150"));
    }
}
