//! In-memory store used by tests and dry runs

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::SchedulingStore;
use crate::models::{Job, Task, TimeWindow, Worker, WorkerSchedule};

#[derive(Debug, Default)]
struct State {
    workers: BTreeMap<String, Worker>,
    tasks: HashMap<Uuid, Task>,
    jobs: HashMap<String, Job>,
}

impl State {
    fn tasks_for(&self, worker_id: &str, range: &TimeWindow) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| t.worker_id == worker_id && t.window().overlaps(range))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.start, t.id));
        tasks
    }
}

/// `SchedulingStore` backed by tokio `RwLock`-guarded maps
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks
    pub async fn task_count(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    /// Number of stored jobs
    pub async fn job_count(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    /// Snapshot of every stored task
    pub async fn all_tasks(&self) -> Vec<Task> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| (t.worker_id.clone(), t.start));
        tasks
    }
}

#[async_trait]
impl SchedulingStore for InMemoryStore {
    async fn find_worker(&self, id: &str) -> Result<Option<Worker>> {
        Ok(self.state.read().await.workers.get(id).cloned())
    }

    async fn save_worker(&self, worker: &Worker) -> Result<()> {
        self.state
            .write()
            .await
            .workers
            .insert(worker.id.clone(), worker.clone());
        Ok(())
    }

    async fn find_worker_schedules(
        &self,
        skill: Option<&str>,
        range: TimeWindow,
    ) -> Result<Vec<WorkerSchedule>> {
        let state = self.state.read().await;
        let schedules = state
            .workers
            .values()
            .filter(|w| w.active)
            .filter(|w| skill.map_or(true, |s| w.has_skill(s)))
            .map(|w| WorkerSchedule::new(w.clone(), state.tasks_for(&w.id, &range)))
            .collect();
        Ok(schedules)
    }

    async fn find_tasks_for_worker(&self, worker_id: &str, range: TimeWindow) -> Result<Vec<Task>> {
        Ok(self.state.read().await.tasks_for(worker_id, &range))
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.state.read().await.tasks.get(&id).cloned())
    }

    async fn find_task_by_window(
        &self,
        worker_id: &str,
        window: TimeWindow,
    ) -> Result<Option<Task>> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .values()
            .find(|t| t.worker_id == worker_id && t.window() == window)
            .cloned())
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        self.state.write().await.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.write().await.tasks.remove(&id).is_some())
    }

    async fn find_job(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.state.read().await.jobs.get(id).cloned())
    }

    async fn find_active_jobs_by_devices(&self, device_ids: &[String]) -> Result<Vec<Job>> {
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| !j.status.is_terminal() && device_ids.contains(&j.device_id))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.device_id.clone(), j.created_at));
        Ok(jobs)
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        self.state
            .write()
            .await
            .jobs
            .insert(job.id.clone(), job.clone());
        Ok(())
    }
}
