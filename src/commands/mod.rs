//! CLI command implementations

pub mod batch;
pub mod db;
pub mod schedule;

use std::sync::Arc;

use anyhow::{Context, Result};

use shiftline::clock::SystemClock;
use shiftline::config::Config;
use shiftline::notifications;
use shiftline::storage::SqliteStore;
use shiftline::SchedulingEngine;

// Re-export command functions for convenience
pub use batch::batch;
pub use db::{init_db, roster};
pub use schedule::{allocate, auto_schedule, reschedule, slots};

/// Open the configured store and build an engine over it
pub(crate) fn open_engine(config: Config) -> Result<(SchedulingEngine, Arc<SqliteStore>)> {
    let store = Arc::new(
        SqliteStore::new(&config.database.sqlite_path).with_context(|| {
            format!(
                "Failed to open database at {}",
                config.database.sqlite_path.display()
            )
        })?,
    );
    let notifier =
        notifications::from_config(&config.notifier).context("Failed to build notifier")?;

    let engine = SchedulingEngine::new(config, store.clone(), Arc::new(SystemClock), notifier)
        .context("Failed to build scheduling engine")?;
    Ok((engine, store))
}
