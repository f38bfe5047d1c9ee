//! shiftline - Shift-aware capacity scheduling for field service jobs
//!
//! Assigns time-bound jobs (device upgrades, maintenance visits) to qualified
//! workers inside their recurring duty shifts, with per-window capacity,
//! leave exclusions and least-loaded balancing.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`scheduler`] - Windows, coverage, allocation, reschedule and batch reconciliation
//! - [`models`] - Core data structures and types
//! - [`storage`] - Persistence (SQLite, in-memory)
//! - [`notifications`] - Process engine notification (webhook, log)
//! - [`metrics`] - Prometheus metrics
//! - [`clock`] - Injectable time source
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shiftline::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(SqliteStore::new(&config.database.sqlite_path)?);
//!     let engine = SchedulingEngine::new(
//!         config,
//!         store,
//!         Arc::new(SystemClock),
//!         Arc::new(LoggingNotifier),
//!     )?;
//!     // engine.allocate(&mut job, requested_time, "Upgrade").await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod scheduler;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::Config;
    pub use crate::error::{ErrorCategory, ShiftlineErrorTrait};
    pub use crate::models::{
        BatchProposal, Job, JobStatus, Leave, Shift, Task, TimeWindow, Worker, WorkerSchedule,
    };
    pub use crate::notifications::{LoggingNotifier, ProcessNotifier, ProcessUpdate};
    pub use crate::scheduler::{Assignee, SchedulingEngine, SchedulerError, SchedulerResult};
    pub use crate::storage::{InMemoryStore, SchedulingStore, SqliteStore};
}

// Direct re-exports for convenience
pub use models::{Job, JobStatus, Task, TimeWindow, Worker};
pub use scheduler::SchedulingEngine;
