//! Testament Watch Service
//!
//! Monitors wills for release-condition changes against the height oracle.
//!
//! # Features
//!
//! - Rate-limited polling over an escrow state snapshot
//! - Emits `ReleaseApproaching` once a will enters the warning window and
//!   `ReleaseReached` once its threshold is hit — each exactly once per will
//! - Persistent announcement tracking across restarts
//!
//! # Example
//!
//! ```ignore
//! use testament_watch::{ReleaseWatch, WatchConfig};
//! use testament_ledger::ManualHeight;
//!
//! let config = WatchConfig {
//!     state_path: "/data/watch_state.json".into(),
//!     ..WatchConfig::default()
//! };
//! let mut watch = ReleaseWatch::new(ManualHeight::new(1_000), config)?;
//!
//! let events = watch.poll(&engine.state_snapshot())?;
//! for event in events {
//!     println!("Event: {:?}", event);
//! }
//! ```

pub mod events;
pub mod state;

pub use events::ReleaseEvent;
pub use state::WatchState;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use testament_escrow::EscrowState;
use testament_ledger::HeightOracle;
use thiserror::Error;

/// Errors from the watch service
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("State error: {0}")]
    State(#[from] state::StateError),

    #[error("Poll interval too short (minimum {min} seconds)")]
    PollTooFrequent { min: u64 },
}

/// Configuration for the watch service
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Path to state file
    pub state_path: PathBuf,
    /// Default poll interval in seconds
    pub poll_interval_secs: u64,
    /// Minimum allowed poll interval (rate limiting)
    pub min_poll_interval_secs: u64,
    /// Warning window in blocks (emit ReleaseApproaching when below)
    pub warning_threshold_blocks: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("watch_state.json"),
            poll_interval_secs: 600,       // 10 minutes
            min_poll_interval_secs: 60,    // 1 minute minimum
            warning_threshold_blocks: 144, // ~1 day at one block per 10 min
        }
    }
}

/// Release-condition monitoring service
pub struct ReleaseWatch<H> {
    oracle: H,
    config: WatchConfig,
    state: WatchState,
}

impl<H: HeightOracle> ReleaseWatch<H> {
    /// Create a new watch service, restoring announcement state from disk.
    pub fn new(oracle: H, config: WatchConfig) -> Result<Self, WatchError> {
        let state = WatchState::load(&config.state_path).unwrap_or_default();
        Ok(Self {
            oracle,
            config,
            state,
        })
    }

    /// Poll all wills in `escrow` and return events.
    ///
    /// This is the main entry point; callers pass a fresh engine snapshot
    /// each cycle. Cancelled wills are never announced.
    pub fn poll(&mut self, escrow: &EscrowState) -> Result<Vec<ReleaseEvent>, WatchError> {
        // Rate limiting
        let now = current_timestamp();
        if let Some(last) = self.state.last_poll {
            let elapsed = now.saturating_sub(last);
            if elapsed < self.config.min_poll_interval_secs {
                return Err(WatchError::PollTooFrequent {
                    min: self.config.min_poll_interval_secs,
                });
            }
        }

        let mut events = Vec::new();
        let height = self.oracle.current_height();
        if height == 0 {
            events.push(ReleaseEvent::PollError {
                message: "height oracle has no data yet".to_string(),
            });
            return Ok(events);
        }

        for will in escrow.wills.values() {
            if will.cancelled {
                continue;
            }

            if will.is_unlockable(height) {
                if self.state.mark_reached(will.id) {
                    events.push(ReleaseEvent::ReleaseReached {
                        will_id: will.id,
                        release_threshold: will.release_threshold,
                        height,
                    });
                    log::info!(
                        "will {} release condition met at height {}",
                        will.id,
                        height
                    );
                }
            } else {
                let blocks_remaining = will.release_threshold - height;
                if blocks_remaining <= self.config.warning_threshold_blocks
                    && self.state.mark_approaching(will.id)
                {
                    events.push(ReleaseEvent::ReleaseApproaching {
                        will_id: will.id,
                        release_threshold: will.release_threshold,
                        blocks_remaining,
                    });
                }
            }
        }

        // Update poll timestamp
        self.state.update_poll(now, height);
        self.save_state()?;

        Ok(events)
    }

    /// Get the current state (for inspection)
    pub fn state(&self) -> &WatchState {
        &self.state
    }

    /// Force a state save
    pub fn flush(&self) -> Result<(), WatchError> {
        self.save_state()
    }

    fn save_state(&self) -> Result<(), WatchError> {
        self.state.save(&self.config.state_path)?;
        Ok(())
    }
}

/// Get current unix timestamp
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
