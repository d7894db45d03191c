//! Watch events emitted by the release monitor

use serde::{Deserialize, Serialize};
use testament_core::WillId;

/// Events emitted by [`ReleaseWatch`](crate::ReleaseWatch) when a will's
/// release condition changes state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReleaseEvent {
    /// A will's release threshold is within the warning window.
    ReleaseApproaching {
        /// The will approaching release.
        will_id: WillId,
        /// Its release threshold.
        release_threshold: u64,
        /// Blocks left until claims unlock.
        blocks_remaining: u64,
    },

    /// A will's release threshold has been reached; claims are now valid.
    ReleaseReached {
        /// The unlocked will.
        will_id: WillId,
        /// Its release threshold.
        release_threshold: u64,
        /// Height at which the watch observed the condition.
        height: u64,
    },

    /// Error during polling (oracle unavailable or stale).
    PollError {
        /// Error message.
        message: String,
    },
}

impl ReleaseEvent {
    /// Get the will id if this event is associated with one.
    pub fn will_id(&self) -> Option<WillId> {
        match self {
            ReleaseEvent::ReleaseApproaching { will_id, .. } => Some(*will_id),
            ReleaseEvent::ReleaseReached { will_id, .. } => Some(*will_id),
            ReleaseEvent::PollError { .. } => None,
        }
    }

    /// Check if this is an error event.
    pub fn is_error(&self) -> bool {
        matches!(self, ReleaseEvent::PollError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_will_id() {
        let event = ReleaseEvent::ReleaseReached {
            will_id: 3,
            release_threshold: 1_100,
            height: 1_105,
        };
        assert_eq!(event.will_id(), Some(3));
        assert!(!event.is_error());
    }

    #[test]
    fn test_poll_error() {
        let event = ReleaseEvent::PollError {
            message: "height oracle has no data yet".to_string(),
        };
        assert!(event.will_id().is_none());
        assert!(event.is_error());
    }
}
