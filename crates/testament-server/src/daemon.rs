//! The daemon loop — periodically checks release conditions and logs events.

use crate::config::ServerConfig;
use anyhow::{Context, Result};
use testament_ledger::FileHeight;
use testament_store::{load_state, open_store};
use testament_watch::{ReleaseEvent, ReleaseWatch, WatchConfig};
use std::time::Duration;

/// Run the daemon loop. Blocks forever (until shutdown signal).
pub async fn run(config: ServerConfig) -> Result<()> {
    log::info!("Testament server starting…");
    log::info!("  Data dir:    {}", config.server.data_dir.display());
    log::info!("  Height file: {}", config.escrow.height_file.display());
    log::info!("  Custody:     {}", config.escrow.custody_account);
    log::info!(
        "  Interval:    {} seconds ({:.1} minutes)",
        config.server.check_interval_secs,
        config.server.check_interval_secs as f64 / 60.0
    );

    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data dir: {}",
            config.server.data_dir.display()
        )
    })?;

    let interval = Duration::from_secs(config.server.check_interval_secs);

    // Run first check immediately, then loop
    let mut first = true;
    loop {
        if !first {
            log::info!(
                "Sleeping {} seconds until next check…",
                config.server.check_interval_secs
            );
            tokio::time::sleep(interval).await;
        }
        first = false;

        match run_check_cycle(&config) {
            Ok(()) => log::info!("Check cycle completed successfully."),
            Err(e) => log::error!("Check cycle failed: {:#}", e),
        }
    }
}

/// Execute a single check cycle: restore escrow state, poll release
/// conditions, log resulting events.
pub fn run_check_cycle(config: &ServerConfig) -> Result<()> {
    log::info!("Starting check cycle…");

    // Restore the escrow snapshot from the store
    let db_path = config.db_path();
    let conn = open_store(&db_path)
        .with_context(|| format!("Failed to open store at {}", db_path.display()))?;
    let (escrow, _audit) = load_state(&conn).context("Failed to load escrow state")?;

    let active = escrow.wills.values().filter(|w| !w.cancelled).count();
    log::info!(
        "Escrow state: {} wills ({} active), counter at {}",
        escrow.wills.len(),
        active,
        escrow.will_counter
    );

    // Set up the watch over the height-oracle file
    let oracle = FileHeight::new(&config.escrow.height_file);
    let watch_config = WatchConfig {
        state_path: config.watch_state_path(),
        poll_interval_secs: config.server.check_interval_secs,
        min_poll_interval_secs: 0, // Server manages its own interval via tokio::sleep
        warning_threshold_blocks: config.escrow.warning_threshold_blocks,
    };
    let mut watch =
        ReleaseWatch::new(oracle, watch_config).context("Failed to create ReleaseWatch")?;

    let events = watch.poll(&escrow).context("Watch poll failed")?;
    let height = watch.state().last_height.unwrap_or(0);
    log::info!("Height: {}  |  Events: {}", height, events.len());

    for event in &events {
        match event {
            ReleaseEvent::ReleaseApproaching {
                will_id,
                release_threshold,
                blocks_remaining,
            } => {
                log::warn!(
                    "[will {}] release approaching: {} blocks until threshold {}",
                    will_id,
                    blocks_remaining,
                    release_threshold
                );
            }
            ReleaseEvent::ReleaseReached {
                will_id,
                release_threshold,
                height,
            } => {
                log::warn!(
                    "[will {}] release condition met at height {} (threshold {}) — claims are open",
                    will_id,
                    height,
                    release_threshold
                );
            }
            ReleaseEvent::PollError { message } => {
                log::error!("Poll error: {}", message);
            }
        }
    }

    Ok(())
}
