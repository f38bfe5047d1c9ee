//! Scheduling engine facade
//!
//! Wires the allocator, session store and collaborators together and exposes
//! the operations callers use.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use super::allocator::{Allocator, Assignee};
use super::availability::{self, AvailabilityQuery};
use super::error::{SchedulerError, SchedulerResult};
use super::reconcile::{self, BatchOutcome, ConfirmOutcome, Reconciler};
use super::reschedule;
use super::session::SessionStore;
use super::sweeper::SessionSweeper;
use crate::clock::Clock;
use crate::config::Config;
use crate::models::{BatchProposal, Job, PendingOverwriteSession, Task, TimeWindow, WorkerSchedule};
use crate::notifications::ProcessNotifier;
use crate::storage::SchedulingStore;

/// Entry point for all scheduling operations
pub struct SchedulingEngine {
    config: Config,
    store: Arc<dyn SchedulingStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn ProcessNotifier>,
    allocator: Allocator,
    sessions: Arc<SessionStore>,
}

impl SchedulingEngine {
    /// Build an engine; fails when `config` does not validate
    pub fn new(
        config: Config,
        store: Arc<dyn SchedulingStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn ProcessNotifier>,
    ) -> SchedulerResult<Self> {
        config
            .validate()
            .map_err(|e| SchedulerError::invalid_config("config", e.to_string()))?;

        let allocator = Allocator::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.scheduling.window_hours,
            config.scheduling.capacity_per_window,
        );
        let sessions = Arc::new(SessionStore::new(config.session_ttl(), Arc::clone(&clock)));

        Ok(Self {
            config,
            store,
            clock,
            notifier,
            allocator,
            sessions,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Pending overwrite sessions
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// A sweeper for this engine's sessions, not yet started
    pub fn sweeper(&self) -> SessionSweeper {
        SessionSweeper::new(Arc::clone(&self.sessions), self.config.sweep_interval())
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler {
            allocator: &self.allocator,
            store: self.store.as_ref(),
            clock: self.clock.as_ref(),
            sessions: &self.sessions,
            notifier: self.notifier.as_ref(),
            policy: &self.config.scheduling,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Bookable window starts in `[range_start, range_end)` for `skill`
    pub async fn find_available_windows(
        &self,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        skill: &str,
    ) -> SchedulerResult<Vec<DateTime<Utc>>> {
        availability::find_available_windows(
            self.store.as_ref(),
            self.clock.now(),
            AvailabilityQuery {
                range: TimeWindow::new(range_start, range_end),
                skill,
                window_hours: self.config.scheduling.window_hours,
                capacity: self.config.scheduling.capacity_per_window,
            },
        )
        .await
    }

    /// Active workers with their tasks overlapping `[start, end)`
    pub async fn roster(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SchedulerResult<Vec<WorkerSchedule>> {
        self.store
            .find_worker_schedules(None, TimeWindow::new(start, end))
            .await
            .map_err(|e| SchedulerError::storage("find_worker_schedules", e))
    }

    /// A pending session, if it exists and has not expired
    pub async fn pending_session(&self, id: Uuid) -> Option<PendingOverwriteSession> {
        self.sessions.get(id).await
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Allocate `job` to the least-loaded eligible worker
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn allocate(
        &self,
        job: &mut Job,
        requested_time: DateTime<Utc>,
        skill: &str,
    ) -> SchedulerResult<Task> {
        self.allocator
            .allocate(job, requested_time, skill, Assignee::LeastLoaded)
            .await
    }

    /// Allocate with an explicit worker preference
    pub async fn allocate_with(
        &self,
        job: &mut Job,
        requested_time: DateTime<Utc>,
        skill: &str,
        assignee: Assignee,
    ) -> SchedulerResult<Task> {
        self.allocator
            .allocate(job, requested_time, skill, assignee)
            .await
    }

    /// Move a stored job to `new_time`, enforcing the reschedule cap
    ///
    /// The process engine receives the new time and pre-upgrade time.
    #[instrument(skip(self))]
    pub async fn reschedule(&self, job_id: &str, new_time: DateTime<Utc>) -> SchedulerResult<Task> {
        let (task, job) = reschedule::reschedule(
            &self.allocator,
            self.store.as_ref(),
            self.clock.as_ref(),
            job_id,
            new_time,
            self.config.scheduling.max_reschedules,
        )
        .await?;

        reconcile::notify_schedule(self.notifier.as_ref(), &job, self.pre_upgrade_offset()).await;
        Ok(task)
    }

    /// Place a stored job in the first available window of the auto-schedule range
    ///
    /// Candidate windows are tried in order, so a window taken concurrently
    /// between the availability query and the commit falls through to the
    /// next one.
    #[instrument(skip(self))]
    pub async fn auto_schedule(&self, job_id: &str) -> SchedulerResult<Task> {
        let policy = &self.config.scheduling;
        let job = self
            .store
            .find_job(job_id)
            .await
            .map_err(|e| SchedulerError::storage("find_job", e))?
            .ok_or_else(|| SchedulerError::job_not_found(job_id))?;

        if job.status.is_terminal() {
            return Err(SchedulerError::JobClosed {
                job_id: job.id,
                status: job.status,
            });
        }

        let start = self.clock.now() + Duration::days(policy.auto_schedule_lead_days);
        let end = start + Duration::days(policy.auto_schedule_horizon_days);
        let candidates = self.find_available_windows(start, end, &job.skill).await?;

        let mut job = job;
        let skill = job.skill.clone();
        let mut last_error = None;
        for slot in candidates {
            match self
                .allocator
                .allocate(&mut job, slot, &skill, Assignee::LeastLoaded)
                .await
            {
                Ok(task) => {
                    info!(job_id = %job.id, slot = %slot.to_rfc3339(), "Job auto-scheduled");
                    reconcile::notify_schedule(
                        self.notifier.as_ref(),
                        &job,
                        self.pre_upgrade_offset(),
                    )
                    .await;
                    return Ok(task);
                }
                Err(e @ SchedulerError::NoCapacity { .. }) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(SchedulerError::NoCapacity {
            window_start: start,
            window_end: end,
            skill,
            candidates_examined: 0,
        }))
    }

    /// Classify a bulk submission; conflicts wait in a pending session
    #[instrument(skip(self, proposals), fields(rows = proposals.len()))]
    pub async fn reconcile_batch(&self, proposals: &[BatchProposal]) -> SchedulerResult<BatchOutcome> {
        self.reconciler().reconcile_batch(proposals).await
    }

    /// Apply a pending overwrite session
    #[instrument(skip(self))]
    pub async fn confirm_overwrites(&self, session_id: Uuid) -> SchedulerResult<ConfirmOutcome> {
        let result = self.reconciler().confirm_overwrites(session_id).await;
        self.allocator.prune_locks();
        result
    }

    /// Lock entries still tracked by the allocator
    pub fn tracked_locks(&self) -> usize {
        self.allocator.tracked_locks()
    }

    fn pre_upgrade_offset(&self) -> Duration {
        Duration::days(self.config.scheduling.pre_upgrade_offset_days)
    }
}
