//! Assignment allocator
//!
//! Binds a job to a worker's task for a requested window. Selection is
//! least-loaded-first over the window's UTC day; commits are serialized per
//! worker and per job so concurrent callers cannot push a worker past the
//! window capacity.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::eligibility::Eligibility;
use super::error::{SchedulerError, SchedulerResult};
use super::locks::KeyedLocks;
use crate::clock::Clock;
use crate::metrics;
use crate::models::{Job, JobStatus, Task, TimeWindow, WorkerSchedule};
use crate::storage::SchedulingStore;

/// Upper bound on selection rounds lost to concurrent commits
const MAX_SELECTION_ROUNDS: usize = 8;

/// Worker preference for one allocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Assignee {
    /// Least-loaded eligible worker
    #[default]
    LeastLoaded,
    /// This worker when eligible, otherwise least-loaded
    Prefer(String),
    /// This worker or nothing
    Require(String),
}

impl Assignee {
    /// Prefer the given worker when one is named
    pub fn prefer(worker_id: Option<&str>) -> Self {
        match worker_id {
            Some(id) if !id.is_empty() => Self::Prefer(id.to_string()),
            _ => Self::LeastLoaded,
        }
    }
}

/// Allocator configuration and collaborators
pub struct Allocator {
    store: Arc<dyn SchedulingStore>,
    clock: Arc<dyn Clock>,
    worker_locks: KeyedLocks,
    job_locks: KeyedLocks,
    window_hours: u32,
    capacity: u32,
}

impl Allocator {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        clock: Arc<dyn Clock>,
        window_hours: u32,
        capacity: u32,
    ) -> Self {
        Self {
            store,
            clock,
            worker_locks: KeyedLocks::new(),
            job_locks: KeyedLocks::new(),
            window_hours,
            capacity,
        }
    }

    /// Window width
    pub fn width(&self) -> Duration {
        Duration::hours(i64::from(self.window_hours))
    }

    pub fn window_hours(&self) -> u32 {
        self.window_hours
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Take the per-job lock; hold it across read-modify-write of a job
    pub async fn lock_job(&self, job_id: &str) -> OwnedMutexGuard<()> {
        self.job_locks.lock(job_id).await
    }

    /// Allocate `job` into the window starting at `requested`
    pub async fn allocate(
        &self,
        job: &mut Job,
        requested: DateTime<Utc>,
        skill: &str,
        assignee: Assignee,
    ) -> SchedulerResult<Task> {
        let result = {
            let _job_guard = self.lock_job(&job.id).await;
            self.allocate_held(job, requested, skill, assignee).await
        };
        self.prune_locks();
        result
    }

    /// Forget lock entries nobody holds; call after releasing a job guard
    pub fn prune_locks(&self) {
        self.worker_locks.prune();
        self.job_locks.prune();
    }

    /// Worker and job keys currently tracked
    pub fn tracked_locks(&self) -> usize {
        self.worker_locks.len() + self.job_locks.len()
    }

    /// Allocate while the caller already holds the job lock
    pub async fn allocate_held(
        &self,
        job: &mut Job,
        requested: DateTime<Utc>,
        skill: &str,
        assignee: Assignee,
    ) -> SchedulerResult<Task> {
        let _timer = metrics::start_allocation_timer();
        let result = self.select_and_commit(job, requested, skill, &assignee).await;
        if let Err(e) = &result {
            metrics::record_allocation_failure(e.reason());
            debug!(job_id = %job.id, error = %e, "Allocation rejected");
        }
        result
    }

    async fn select_and_commit(
        &self,
        job: &mut Job,
        requested: DateTime<Utc>,
        skill: &str,
        assignee: &Assignee,
    ) -> SchedulerResult<Task> {
        let now = self.clock.now();
        if requested <= now {
            return Err(SchedulerError::past_time(requested, now));
        }

        let window = TimeWindow::starting_at(requested, self.width());
        let day = TimeWindow::utc_day_of(requested);
        let range = window.union(&day);

        // The caller's copy may predate a concurrent move of the same job
        if let Some(stored) = self
            .store
            .find_job(&job.id)
            .await
            .map_err(|e| SchedulerError::storage("find_job", e))?
        {
            job.task_id = stored.task_id;
        }

        let job_id = job.id.clone();
        let rules = Eligibility::new(skill, self.capacity).ignoring_job(&job_id);
        let mut excluded: HashSet<String> = HashSet::new();
        let mut examined = 0;

        for _ in 0..MAX_SELECTION_ROUNDS {
            let schedules = self
                .store
                .find_worker_schedules(Some(skill), range)
                .await
                .map_err(|e| SchedulerError::storage("find_worker_schedules", e))?;
            examined = schedules.len();

            let Some(candidate) =
                select_worker(&schedules, &window, &day, &rules, assignee, &excluded, &job_id)
            else {
                break;
            };

            let previous_owner = match job.task_id {
                Some(task_id) => self
                    .store
                    .find_task(task_id)
                    .await
                    .map_err(|e| SchedulerError::storage("find_task", e))?
                    .map(|t| t.worker_id),
                None => None,
            };

            let _guards = self
                .worker_locks
                .lock_all(std::iter::once(candidate.as_str()).chain(previous_owner.as_deref()))
                .await;

            let tasks = self
                .store
                .find_tasks_for_worker(&candidate, window)
                .await
                .map_err(|e| SchedulerError::storage("find_tasks_for_worker", e))?;
            let load: u32 = tasks.iter().map(|t| t.load_excluding(&job_id)).sum();
            if load >= self.capacity {
                debug!(
                    worker_id = %candidate,
                    window = %window,
                    load,
                    "Candidate filled up concurrently, reselecting"
                );
                excluded.insert(candidate);
                continue;
            }

            return self.commit(job, &candidate, window, now).await;
        }

        Err(SchedulerError::NoCapacity {
            window_start: window.start,
            window_end: window.end,
            skill: skill.to_string(),
            candidates_examined: examined,
        })
    }

    /// Move the job into the worker's task for `window`
    ///
    /// Must run under the worker locks of both the target and the previous
    /// owner.
    async fn commit(
        &self,
        job: &mut Job,
        worker_id: &str,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Task> {
        let store = &self.store;

        if let Some(previous_id) = job.task_id {
            let previous = store
                .find_task(previous_id)
                .await
                .map_err(|e| SchedulerError::storage("find_task", e))?;

            if let Some(mut previous) = previous {
                let same_slot = previous.worker_id == worker_id && previous.window() == window;
                if !same_slot && previous.detach(&job.id) {
                    if previous.is_empty() {
                        store
                            .delete_task(previous.id)
                            .await
                            .map_err(|e| SchedulerError::storage("delete_task", e))?;
                        debug!(task_id = %previous.id, "Deleted empty task");
                    } else {
                        store
                            .save_task(&previous)
                            .await
                            .map_err(|e| SchedulerError::storage("save_task", e))?;
                    }
                }
            }
        }

        let existing = store
            .find_task_by_window(worker_id, window)
            .await
            .map_err(|e| SchedulerError::storage("find_task_by_window", e))?;
        let reused = existing.is_some();
        let mut task = existing.unwrap_or_else(|| Task::new(worker_id, window));
        task.attach(&job.id);
        store
            .save_task(&task)
            .await
            .map_err(|e| SchedulerError::storage("save_task", e))?;

        job.scheduled_time = Some(window.start);
        job.assigned_worker = Some(worker_id.to_string());
        job.task_id = Some(task.id);
        job.status = JobStatus::Scheduled;
        job.updated_at = now;
        store
            .save_job(job)
            .await
            .map_err(|e| SchedulerError::storage("save_job", e))?;

        metrics::record_allocation(reused);
        info!(
            job_id = %job.id,
            worker_id = %worker_id,
            task_id = %task.id,
            window = %window,
            workflow_count = task.workflow_count(),
            reused,
            "Job allocated"
        );

        Ok(task)
    }
}

/// Pick a worker for `window`, honoring the assignee preference
fn select_worker(
    schedules: &[WorkerSchedule],
    window: &TimeWindow,
    day: &TimeWindow,
    rules: &Eligibility<'_>,
    assignee: &Assignee,
    excluded: &HashSet<String>,
    job_id: &str,
) -> Option<String> {
    let eligible: Vec<&WorkerSchedule> = schedules
        .iter()
        .filter(|s| !excluded.contains(&s.worker.id))
        .filter(|s| rules.is_eligible(s, window))
        .collect();

    match assignee {
        Assignee::Require(id) => {
            return eligible
                .iter()
                .find(|s| &s.worker.id == id)
                .map(|s| s.worker.id.clone());
        }
        Assignee::Prefer(id) => {
            if let Some(s) = eligible.iter().find(|s| &s.worker.id == id) {
                return Some(s.worker.id.clone());
            }
            warn!(
                worker_id = %id,
                window = %window,
                "Preferred worker not eligible, falling back to least-loaded"
            );
        }
        Assignee::LeastLoaded => {}
    }

    // min_by_key keeps the first of equal minima
    eligible
        .into_iter()
        .min_by_key(|s| s.load_in(day, Some(job_id)))
        .map(|s| s.worker.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Shift, Worker};
    use crate::storage::InMemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap()
    }

    fn slot(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, 0, 0).unwrap()
    }

    fn day_worker(id: &str) -> Worker {
        Worker::new(id)
            .with_skill("Upgrade")
            .with_shift(Shift::parse("DAY", "08:00", "17:00").unwrap())
    }

    async fn setup(workers: &[&str], capacity: u32) -> (Arc<InMemoryStore>, Allocator) {
        let store = Arc::new(InMemoryStore::new());
        for id in workers {
            store.save_worker(&day_worker(id)).await.unwrap();
        }
        let clock = Arc::new(ManualClock::new(now()));
        let allocator = Allocator::new(store.clone(), clock, 4, capacity);
        (store, allocator)
    }

    fn job(id: &str) -> Job {
        Job::new(id, format!("dev-{id}"), "Upgrade", now())
    }

    #[tokio::test]
    async fn test_rejects_past_time() {
        let (_, allocator) = setup(&["a"], 5).await;
        let mut j = job("j1");
        let err = allocator
            .allocate(&mut j, now(), "Upgrade", Assignee::LeastLoaded)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::PastTime { .. }));
        assert!(j.task_id.is_none());
    }

    #[tokio::test]
    async fn test_least_loaded_with_first_wins_ties() {
        let (_, allocator) = setup(&["a", "b"], 5).await;

        let mut j1 = job("j1");
        let t1 = allocator
            .allocate(&mut j1, slot(8), "Upgrade", Assignee::LeastLoaded)
            .await
            .unwrap();
        assert_eq!(t1.worker_id, "a");

        let mut j2 = job("j2");
        let t2 = allocator
            .allocate(&mut j2, slot(8), "Upgrade", Assignee::LeastLoaded)
            .await
            .unwrap();
        assert_eq!(t2.worker_id, "b");
        assert_eq!(j2.status, JobStatus::Scheduled);
        assert_eq!(j2.assigned_worker.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_reuses_matching_task() {
        let (store, allocator) = setup(&["a"], 5).await;
        let mut j1 = job("j1");
        let mut j2 = job("j2");
        let t1 = allocator
            .allocate(&mut j1, slot(8), "Upgrade", Assignee::LeastLoaded)
            .await
            .unwrap();
        let t2 = allocator
            .allocate(&mut j2, slot(8), "Upgrade", Assignee::LeastLoaded)
            .await
            .unwrap();

        assert_eq!(t1.id, t2.id);
        assert_eq!(t2.workflow_count(), 2);
        assert_eq!(store.task_count().await, 1);
    }

    #[tokio::test]
    async fn test_reallocation_detaches_and_deletes_empty_task() {
        let (store, allocator) = setup(&["a"], 5).await;
        let mut j = job("j1");
        let first = allocator
            .allocate(&mut j, slot(8), "Upgrade", Assignee::LeastLoaded)
            .await
            .unwrap();
        let second = allocator
            .allocate(&mut j, slot(12), "Upgrade", Assignee::LeastLoaded)
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert!(store.find_task(first.id).await.unwrap().is_none());
        assert_eq!(store.task_count().await, 1);
        assert_eq!(j.task_id, Some(second.id));
    }

    #[tokio::test]
    async fn test_same_slot_reallocation_keeps_task() {
        let (store, allocator) = setup(&["a"], 1).await;
        let mut j = job("j1");
        let first = allocator
            .allocate(&mut j, slot(8), "Upgrade", Assignee::LeastLoaded)
            .await
            .unwrap();
        // At capacity 1 the job's own attachment must not block it
        let again = allocator
            .allocate(&mut j, slot(8), "Upgrade", Assignee::LeastLoaded)
            .await
            .unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(again.workflow_count(), 1);
        assert_eq!(store.task_count().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_exhaustion_leaves_state_intact() {
        let (store, allocator) = setup(&["a"], 1).await;
        let mut j1 = job("j1");
        allocator
            .allocate(&mut j1, slot(8), "Upgrade", Assignee::LeastLoaded)
            .await
            .unwrap();

        let mut j2 = job("j2");
        allocator
            .allocate(&mut j2, slot(12), "Upgrade", Assignee::LeastLoaded)
            .await
            .unwrap();
        let before = store.all_tasks().await;

        let err = allocator
            .allocate(&mut j2, slot(8), "Upgrade", Assignee::LeastLoaded)
            .await
            .unwrap_err();
        match err {
            SchedulerError::NoCapacity {
                candidates_examined,
                ..
            } => assert_eq!(candidates_examined, 1),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.all_tasks().await, before);
    }

    #[tokio::test]
    async fn test_prefer_and_require() {
        let (_, allocator) = setup(&["a", "b"], 5).await;

        let mut j1 = job("j1");
        let t = allocator
            .allocate(&mut j1, slot(8), "Upgrade", Assignee::Prefer("b".into()))
            .await
            .unwrap();
        assert_eq!(t.worker_id, "b");

        let mut j2 = job("j2");
        let t = allocator
            .allocate(&mut j2, slot(8), "Upgrade", Assignee::Prefer("ghost".into()))
            .await
            .unwrap();
        assert_eq!(t.worker_id, "a");

        let mut j3 = job("j3");
        let err = allocator
            .allocate(&mut j3, slot(8), "Upgrade", Assignee::Require("ghost".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NoCapacity { .. }));
    }
}
