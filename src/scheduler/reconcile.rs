//! Batch reconciliation
//!
//! A bulk upload is split into new jobs (allocated immediately), duplicates
//! (ignored), and conflicting changes to existing jobs. Conflicts are held in
//! a pending overwrite session until confirmed. Time changes to jobs inside
//! the freeze period are never proposed; they are reported as blocked.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::allocator::{Allocator, Assignee};
use super::error::{SchedulerError, SchedulerResult};
use super::session::SessionStore;
use crate::clock::Clock;
use crate::config::SchedulingConfig;
use crate::metrics;
use crate::models::{BatchProposal, ChangedField, DeviceValues, Job, JobStatus, OverwriteProposal};
use crate::notifications::{ProcessNotifier, ProcessUpdate};
use crate::storage::SchedulingStore;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+$").expect("valid email regex"));

// ============================================================================
// Outcomes
// ============================================================================

/// A job created by a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub device_id: String,
    pub job_id: String,
    /// Set when the row carried a time and allocation succeeded
    pub task_id: Option<Uuid>,
    pub scheduled_time: Option<DateTime<Utc>>,
}

/// A time change refused because the job is too close
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedChange {
    pub device_id: String,
    pub current_time: DateTime<Utc>,
    pub requested_time: DateTime<Utc>,
}

/// A row or overwrite that could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub device_id: String,
    pub reason: String,
}

impl RowFailure {
    fn new(device_id: &str, reason: impl ToString) -> Self {
        Self {
            device_id: device_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result of reconciling one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub new: Vec<NewJob>,
    pub duplicates: usize,
    pub blocked: Vec<BlockedChange>,
    pub failed: Vec<RowFailure>,
    /// Present only when `conflicts` is non-empty
    pub pending_session_id: Option<Uuid>,
    pub conflicts: Vec<OverwriteProposal>,
}

/// An overwrite that was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedOverwrite {
    pub device_id: String,
    pub job_id: String,
    pub task_id: Option<Uuid>,
}

/// Result of confirming a pending overwrite session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOutcome {
    pub applied: Vec<AppliedOverwrite>,
    pub failed: Vec<RowFailure>,
}

// ============================================================================
// Validation
// ============================================================================

/// Check every row, collecting all problems with 1-based row numbers
pub fn validate_rows(proposals: &[BatchProposal]) -> SchedulerResult<()> {
    let mut errors = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for (index, row) in proposals.iter().enumerate() {
        let line = index + 1;
        let device = row.device_id.trim();

        if device.is_empty() {
            errors.push(format!("Row {line}: device id is required"));
        } else if !seen.insert(device) {
            errors.push(format!("Row {line}: device '{device}' appears more than once"));
        }

        if row.assigned_worker.trim().is_empty() {
            errors.push(format!("Row {line}: assigned worker is required"));
        }

        if let Some(contact) = &row.contact {
            if !EMAIL_REGEX.is_match(contact.trim()) {
                errors.push(format!("Row {line}: invalid contact email '{contact}'"));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchedulerError::InvalidBatch { errors })
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Borrowed view of the collaborators batch reconciliation needs
pub struct Reconciler<'a> {
    pub allocator: &'a Allocator,
    pub store: &'a dyn SchedulingStore,
    pub clock: &'a dyn Clock,
    pub sessions: &'a SessionStore,
    pub notifier: &'a dyn ProcessNotifier,
    pub policy: &'a SchedulingConfig,
}

enum RowDiff {
    Duplicate,
    Blocked(BlockedChange),
    Conflict(OverwriteProposal, Option<BlockedChange>),
}

impl Reconciler<'_> {
    /// Classify each proposal and stage conflicts for confirmation
    pub async fn reconcile_batch(&self, proposals: &[BatchProposal]) -> SchedulerResult<BatchOutcome> {
        validate_rows(proposals)?;

        let devices: Vec<String> = proposals.iter().map(|p| p.device_id.trim().to_string()).collect();
        let existing = self.latest_jobs_by_device(&devices).await?;

        let now = self.clock.now();
        let freeze_until = now + Duration::days(self.policy.reschedule_freeze_days);
        let mut outcome = BatchOutcome::default();

        for proposal in proposals {
            let device_id = proposal.device_id.trim();
            match existing.get(device_id) {
                None => self.create_job(proposal, device_id, now, &mut outcome).await,
                Some(job) => match diff_row(job, proposal, freeze_until) {
                    RowDiff::Duplicate => outcome.duplicates += 1,
                    RowDiff::Blocked(blocked) => outcome.blocked.push(blocked),
                    RowDiff::Conflict(conflict, blocked) => {
                        outcome.blocked.extend(blocked);
                        outcome.conflicts.push(conflict);
                    }
                },
            }
        }

        for blocked in &outcome.blocked {
            warn!(
                device_id = %blocked.device_id,
                current_time = %blocked.current_time.to_rfc3339(),
                "Time change blocked inside freeze period"
            );
        }

        if !outcome.conflicts.is_empty() {
            let session = self.sessions.create(outcome.conflicts.clone()).await;
            outcome.pending_session_id = Some(session.id);
        }

        metrics::record_batch_rows(
            outcome.new.len(),
            outcome.duplicates,
            outcome.conflicts.len(),
            outcome.failed.len(),
        );
        info!(
            rows = proposals.len(),
            new = outcome.new.len(),
            duplicates = outcome.duplicates,
            conflicts = outcome.conflicts.len(),
            blocked = outcome.blocked.len(),
            failed = outcome.failed.len(),
            "Batch reconciled"
        );

        Ok(outcome)
    }

    /// Apply every overwrite held by a session
    ///
    /// The session is consumed up front, so a second confirmation of the same
    /// id reports `SessionNotFound`.
    pub async fn confirm_overwrites(&self, session_id: Uuid) -> SchedulerResult<ConfirmOutcome> {
        let session = self.sessions.take(session_id).await?;
        let mut outcome = ConfirmOutcome::default();

        for entry in &session.overwrites {
            match self.apply_overwrite(entry).await {
                Ok(applied) => outcome.applied.push(applied),
                Err(e) => {
                    warn!(device_id = %entry.device_id, error = %e, "Overwrite not applied");
                    outcome.failed.push(RowFailure::new(&entry.device_id, e));
                }
            }
        }

        metrics::record_session_confirmed(self.sessions.len().await);
        info!(
            session_id = %session_id,
            applied = outcome.applied.len(),
            failed = outcome.failed.len(),
            "Overwrite session confirmed"
        );

        Ok(outcome)
    }

    async fn latest_jobs_by_device(&self, devices: &[String]) -> SchedulerResult<HashMap<String, Job>> {
        let jobs = self
            .store
            .find_active_jobs_by_devices(devices)
            .await
            .map_err(|e| SchedulerError::storage("find_active_jobs_by_devices", e))?;

        let mut latest: HashMap<String, Job> = HashMap::new();
        for job in jobs {
            match latest.get(&job.device_id) {
                Some(current) if current.created_at > job.created_at => {}
                _ => {
                    latest.insert(job.device_id.clone(), job);
                }
            }
        }
        Ok(latest)
    }

    async fn create_job(
        &self,
        proposal: &BatchProposal,
        device_id: &str,
        now: DateTime<Utc>,
        outcome: &mut BatchOutcome,
    ) {
        let worker = proposal.assigned_worker.trim();
        let mut job = Job::new(
            Uuid::new_v4().to_string(),
            device_id,
            self.policy.default_skill.clone(),
            now,
        )
        .with_assigned_worker(worker);
        job.contact = proposal.contact.as_ref().map(|c| c.trim().to_string());

        if let Err(e) = self.store.save_job(&job).await {
            outcome
                .failed
                .push(RowFailure::new(device_id, SchedulerError::storage("save_job", e)));
            return;
        }

        let mut task_id = None;
        if let Some(requested) = proposal.scheduled_time {
            let skill = job.skill.clone();
            match self
                .allocator
                .allocate(&mut job, requested, &skill, Assignee::prefer(Some(worker)))
                .await
            {
                Ok(task) => task_id = Some(task.id),
                Err(e) => outcome.failed.push(RowFailure::new(device_id, e)),
            }
        }

        outcome.new.push(NewJob {
            device_id: device_id.to_string(),
            job_id: job.id,
            task_id,
            scheduled_time: job.scheduled_time,
        });
    }

    async fn apply_overwrite(&self, entry: &OverwriteProposal) -> SchedulerResult<AppliedOverwrite> {
        let devices = [entry.device_id.clone()];
        let job_id = self
            .latest_jobs_by_device(&devices)
            .await?
            .remove(&entry.device_id)
            .map(|job| job.id)
            .ok_or_else(|| SchedulerError::EntityNotFound {
                entity: "Job",
                id: entry.device_id.clone(),
            })?;

        let _job_guard = self.allocator.lock_job(&job_id).await;
        let mut job = self
            .store
            .find_job(&job_id)
            .await
            .map_err(|e| SchedulerError::storage("find_job", e))?
            .ok_or_else(|| SchedulerError::job_not_found(&job_id))?;

        if entry.touches(ChangedField::Contact) {
            job.contact = entry.new.contact.clone();
        }

        let time_changed = entry.touches(ChangedField::ScheduledTime);
        let worker_changed = entry.touches(ChangedField::AssignedWorker);

        if time_changed || worker_changed {
            let time = if time_changed {
                entry.new.scheduled_time
            } else {
                job.scheduled_time
            };
            let assignee = if worker_changed {
                match entry.new.assigned_worker.clone() {
                    Some(worker) => Assignee::Require(worker),
                    None => Assignee::LeastLoaded,
                }
            } else {
                Assignee::prefer(job.assigned_worker.as_deref())
            };

            match time {
                Some(t) => {
                    let skill = job.skill.clone();
                    self.allocator
                        .allocate_held(&mut job, t, &skill, assignee)
                        .await?;
                }
                // Unscheduled job: nothing to allocate, record the worker only
                None => job.assigned_worker = entry.new.assigned_worker.clone(),
            }
        }

        job.status = JobStatus::Overwritten;
        job.updated_at = self.clock.now();
        self.store
            .save_job(&job)
            .await
            .map_err(|e| SchedulerError::storage("save_job", e))?;

        notify_schedule(
            self.notifier,
            &job,
            Duration::days(self.policy.pre_upgrade_offset_days),
        )
        .await;

        Ok(AppliedOverwrite {
            device_id: job.device_id,
            job_id: job.id,
            task_id: job.task_id,
        })
    }
}

/// Push a job's current schedule to the process engine
///
/// Delivery failures are logged and otherwise ignored.
pub(crate) async fn notify_schedule(
    notifier: &dyn ProcessNotifier,
    job: &Job,
    pre_upgrade_offset: Duration,
) {
    let update = ProcessUpdate {
        job_id: job.id.clone(),
        device_id: job.device_id.clone(),
        scheduled_time: job.scheduled_time,
        pre_upgrade_time: job.scheduled_time.map(|t| t - pre_upgrade_offset),
        assigned_worker: job.assigned_worker.clone(),
        contact: job.contact.clone(),
    };

    if let Err(e) = notifier.schedule_updated(&update).await {
        warn!(
            job_id = %job.id,
            notifier = notifier.name(),
            error = %e,
            "Failed to notify process engine"
        );
    }
}

/// Compare an existing job with a proposal for the same device
fn diff_row(job: &Job, proposal: &BatchProposal, freeze_until: DateTime<Utc>) -> RowDiff {
    let old = DeviceValues::of_job(job);
    let mut new = old.clone();
    let mut changes = BTreeSet::new();
    let mut blocked = None;

    let worker = proposal.assigned_worker.trim();
    if job.assigned_worker.as_deref() != Some(worker) {
        changes.insert(ChangedField::AssignedWorker);
        new.assigned_worker = Some(worker.to_string());
    }

    if let Some(contact) = proposal.contact.as_deref().map(str::trim) {
        if job.contact.as_deref() != Some(contact) {
            changes.insert(ChangedField::Contact);
            new.contact = Some(contact.to_string());
        }
    }

    if let Some(requested) = proposal.scheduled_time {
        if job.scheduled_time != Some(requested) {
            match job.scheduled_time {
                Some(current) if current < freeze_until => {
                    blocked = Some(BlockedChange {
                        device_id: job.device_id.clone(),
                        current_time: current,
                        requested_time: requested,
                    });
                }
                _ => {
                    changes.insert(ChangedField::ScheduledTime);
                    new.scheduled_time = Some(requested);
                }
            }
        }
    }

    match (changes.is_empty(), blocked) {
        (true, None) => RowDiff::Duplicate,
        (true, Some(blocked)) => RowDiff::Blocked(blocked),
        (false, blocked) => RowDiff::Conflict(
            OverwriteProposal {
                device_id: job.device_id.clone(),
                old,
                new,
                changes,
            },
            blocked,
        ),
    }
}
