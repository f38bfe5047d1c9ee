//! Shift-aware capacity scheduling
//!
//! This module assigns time-bound jobs to qualified workers within their
//! recurring duty shifts, subject to per-window capacity, leave exclusions
//! and least-loaded balancing. It also reconciles bulk submissions against
//! already-scheduled jobs through a two-phase confirm flow.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      SchedulingEngine                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐    │
//! │  │ Availability│  │  Reschedule │  │ Batch Reconciliation│    │
//! │  │    Query    │  │    Guard    │  │  + SessionStore     │    │
//! │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘    │
//! │         │                │                     │              │
//! │         │                └──────────┬──────────┘              │
//! │         │                    ┌──────▼──────┐                  │
//! │         │                    │  Allocator  │                  │
//! │         │                    └──────┬──────┘                  │
//! │  ┌──────▼──────────────────────────▼──────┐                  │
//! │  │ Window Generator · Coverage · Eligibility│                 │
//! │  └─────────────────────────────────────────┘                  │
//! └───────────────────────────────────────────────────────────────┘
//!                            │
//!                    ┌───────▼────────┐
//!                    │ SchedulingStore│
//!                    └────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`window`] - Canonical window generation
//! - [`coverage`] - Shift coverage including overnight shifts
//! - [`eligibility`] - Per-(worker, window) eligibility rules
//! - [`availability`] - Read-only availability query
//! - [`allocator`] - Load-balanced assignment with task reuse and detach
//! - [`reschedule`] - Reschedule cap enforcement
//! - [`reconcile`] - Batch reconciliation and overwrite confirmation
//! - [`session`] - TTL-bounded pending overwrite sessions
//! - [`sweeper`] - Background expiry sweep
//! - [`engine`] - Facade tying it together
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use shiftline::scheduler::SchedulingEngine;
//! use shiftline::{clock::SystemClock, config::Config};
//! use shiftline::notifications::LoggingNotifier;
//! use shiftline::storage::InMemoryStore;
//!
//! let engine = SchedulingEngine::new(
//!     Config::default(),
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(SystemClock),
//!     Arc::new(LoggingNotifier),
//! )?;
//!
//! let slots = engine.find_available_windows(start, end, "Upgrade").await?;
//! let task = engine.allocate(&mut job, slots[0], "Upgrade").await?;
//! ```

pub mod allocator;
pub mod availability;
pub mod coverage;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod locks;
pub mod reconcile;
pub mod reschedule;
pub mod session;
pub mod sweeper;
pub mod window;

// Re-exports
pub use allocator::{Allocator, Assignee};
pub use coverage::shift_covers;
pub use engine::SchedulingEngine;
pub use error::{SchedulerError, SchedulerResult};
pub use reconcile::{AppliedOverwrite, BatchOutcome, BlockedChange, ConfirmOutcome, NewJob, RowFailure};
pub use session::SessionStore;
pub use sweeper::SessionSweeper;
pub use window::WindowGenerator;
