//! Availability query
//!
//! Read-only: lists the canonical window starts in a range that at least one
//! eligible worker can still take.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::eligibility::Eligibility;
use super::error::{SchedulerError, SchedulerResult};
use super::window::WindowGenerator;
use crate::models::TimeWindow;
use crate::storage::SchedulingStore;

/// Parameters for one availability query
#[derive(Debug, Clone, Copy)]
pub struct AvailabilityQuery<'a> {
    pub range: TimeWindow,
    pub skill: &'a str,
    pub window_hours: u32,
    pub capacity: u32,
}

/// Window starts strictly after `now` with at least one eligible worker
///
/// Worker schedules are fetched once for the whole range (extended by one
/// window so the last slot's tasks are included).
pub async fn find_available_windows(
    store: &dyn SchedulingStore,
    now: DateTime<Utc>,
    query: AvailabilityQuery<'_>,
) -> SchedulerResult<Vec<DateTime<Utc>>> {
    if query.range.is_empty() {
        return Ok(Vec::new());
    }

    let width = Duration::hours(i64::from(query.window_hours));
    let fetch_range = TimeWindow::new(query.range.start, query.range.end + width);
    let schedules = store
        .find_worker_schedules(Some(query.skill), fetch_range)
        .await
        .map_err(|e| SchedulerError::storage("find_worker_schedules", e))?;

    let rules = Eligibility::new(query.skill, query.capacity);
    let mut available = Vec::new();

    for start in WindowGenerator::new(query.range.start, query.range.end, query.window_hours) {
        if start <= now {
            continue;
        }
        let window = TimeWindow::starting_at(start, width);
        if schedules.iter().any(|s| rules.is_eligible(s, &window)) {
            available.push(start);
        }
    }

    // Generator output is already ordered; keep the guarantee explicit
    available.dedup();

    debug!(
        skill = %query.skill,
        range = %query.range,
        workers = schedules.len(),
        available = available.len(),
        "Availability computed"
    );

    Ok(available)
}
