//! Persistent state for the watch service
//!
//! Tracks the last poll and which wills have already been announced, so
//! approach/reached events fire exactly once per will across restarts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use testament_core::WillId;
use thiserror::Error;

/// Errors from state operations
#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Full watch state
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WatchState {
    /// Last successful poll (unix timestamp)
    pub last_poll: Option<u64>,
    /// Last observed height
    pub last_height: Option<u64>,
    /// Wills already announced as approaching release
    pub announced_approaching: BTreeSet<WillId>,
    /// Wills already announced as released
    pub announced_reached: BTreeSet<WillId>,
}

impl WatchState {
    /// Create empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Load state from file, or create empty if not exists
    pub fn load(path: &Path) -> Result<Self, StateError> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            let state: WatchState = serde_json::from_str(&contents)?;
            Ok(state)
        } else {
            Ok(Self::new())
        }
    }

    /// Save state to file
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Mark a will as announced-approaching. Returns true the first time.
    pub fn mark_approaching(&mut self, will_id: WillId) -> bool {
        self.announced_approaching.insert(will_id)
    }

    /// Mark a will as announced-reached. Returns true the first time.
    pub fn mark_reached(&mut self, will_id: WillId) -> bool {
        self.announced_reached.insert(will_id)
    }

    /// Update last poll info
    pub fn update_poll(&mut self, timestamp: u64, height: u64) {
        self.last_poll = Some(timestamp);
        self.last_height = Some(height);
    }
}
