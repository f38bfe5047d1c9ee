//! Reschedule guard
//!
//! Caps how many times a job may be moved. The counter only advances when
//! the allocator commits; a moved job ends up `Rescheduled`.

use chrono::{DateTime, Utc};
use tracing::info;

use super::allocator::{Allocator, Assignee};
use super::error::{SchedulerError, SchedulerResult};
use crate::clock::Clock;
use crate::metrics;
use crate::models::{Job, JobStatus, Task};
use crate::storage::SchedulingStore;

/// Move a job to `new_time`, enforcing the reschedule cap
///
/// Returns the committed task together with the stored job.
pub async fn reschedule(
    allocator: &Allocator,
    store: &dyn SchedulingStore,
    clock: &dyn Clock,
    job_id: &str,
    new_time: DateTime<Utc>,
    max_reschedules: u32,
) -> SchedulerResult<(Task, Job)> {
    let result = {
        let _job_guard = allocator.lock_job(job_id).await;
        reschedule_held(allocator, store, clock, job_id, new_time, max_reschedules).await
    };
    allocator.prune_locks();
    result
}

async fn reschedule_held(
    allocator: &Allocator,
    store: &dyn SchedulingStore,
    clock: &dyn Clock,
    job_id: &str,
    new_time: DateTime<Utc>,
    max_reschedules: u32,
) -> SchedulerResult<(Task, Job)> {

    let mut job = store
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

    if job.reschedule_count >= max_reschedules {
        return Err(SchedulerError::RescheduleLimit {
            job_id: job.id,
            count: job.reschedule_count,
            max: max_reschedules,
        });
    }

    let now = clock.now();
    if new_time <= now {
        return Err(SchedulerError::past_time(new_time, now));
    }

    job.reschedule_count += 1;
    let skill = job.skill.clone();

    // The incremented count is only persisted by a successful commit
    let task = allocator
        .allocate_held(&mut job, new_time, &skill, Assignee::LeastLoaded)
        .await?;

    job.status = JobStatus::Rescheduled;
    job.updated_at = clock.now();
    store
        .save_job(&job)
        .await
        .map_err(|e| SchedulerError::storage("save_job", e))?;

    metrics::record_reschedule();
    info!(
        job_id = %job.id,
        reschedule_count = job.reschedule_count,
        new_time = %new_time.to_rfc3339(),
        "Job rescheduled"
    );

    Ok((task, job))
}
