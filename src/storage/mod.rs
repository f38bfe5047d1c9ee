//! Persistence for workers, tasks and jobs
//!
//! Business logic only sees the [`SchedulingStore`] trait, so the engine runs
//! unchanged against SQLite in production and the in-memory store in tests.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SchedulingEngine                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SchedulingStore                          │
//! └─────────────────────────────────────────────────────────────┘
//!                   │                         │
//!                   ▼                         ▼
//!          ┌─────────────────┐       ┌─────────────────┐
//!          │   SqliteStore   │       │  InMemoryStore  │
//!          └─────────────────┘       └─────────────────┘
//! ```

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Job, Task, TimeWindow, Worker, WorkerSchedule};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Persistence collaborator for the scheduling engine
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    // ------------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------------

    /// Get a worker by id
    async fn find_worker(&self, id: &str) -> Result<Option<Worker>>;

    /// Insert or replace a worker together with its leaves
    async fn save_worker(&self, worker: &Worker) -> Result<()>;

    /// Active workers, optionally filtered by skill, each with the tasks that
    /// overlap `range`. Ordered by worker id.
    async fn find_worker_schedules(
        &self,
        skill: Option<&str>,
        range: TimeWindow,
    ) -> Result<Vec<WorkerSchedule>>;

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// A worker's tasks overlapping `range`, ordered by start
    async fn find_tasks_for_worker(&self, worker_id: &str, range: TimeWindow) -> Result<Vec<Task>>;

    /// Get a task by id
    async fn find_task(&self, id: Uuid) -> Result<Option<Task>>;

    /// The worker's task with exactly this `[start, end)`, if any
    async fn find_task_by_window(&self, worker_id: &str, window: TimeWindow)
        -> Result<Option<Task>>;

    /// Insert or replace a task
    async fn save_task(&self, task: &Task) -> Result<()>;

    /// Delete a task, returning whether it existed
    async fn delete_task(&self, id: Uuid) -> Result<bool>;

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Get a job by id
    async fn find_job(&self, id: &str) -> Result<Option<Job>>;

    /// Non-terminal jobs for the given devices
    async fn find_active_jobs_by_devices(&self, device_ids: &[String]) -> Result<Vec<Job>>;

    /// Insert or replace a job
    async fn save_job(&self, job: &Job) -> Result<()>;
}
