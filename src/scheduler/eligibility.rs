//! Per-(worker, window) eligibility rules

use tracing::debug;

use super::coverage::worker_covers;
use crate::models::{TimeWindow, WorkerSchedule};

/// Why a worker was passed over for a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    Inactive,
    MissingSkill,
    OutsideShift,
    OnLeave,
    AtCapacity,
}

/// Capacity and skill requirements for one eligibility check
#[derive(Debug, Clone, Copy)]
pub struct Eligibility<'a> {
    pub skill: &'a str,
    pub capacity: u32,
    /// Job whose current attachment does not count against load
    pub moving_job: Option<&'a str>,
}

impl<'a> Eligibility<'a> {
    pub fn new(skill: &'a str, capacity: u32) -> Self {
        Self {
            skill,
            capacity,
            moving_job: None,
        }
    }

    pub fn ignoring_job(mut self, job_id: &'a str) -> Self {
        self.moving_job = Some(job_id);
        self
    }

    /// Check every rule in order, returning the first failure
    pub fn check(&self, schedule: &WorkerSchedule, window: &TimeWindow) -> Result<(), Ineligible> {
        let worker = &schedule.worker;

        if !worker.active {
            return Err(Ineligible::Inactive);
        }
        if !worker.has_skill(self.skill) {
            return Err(Ineligible::MissingSkill);
        }
        if !worker_covers(worker, window) {
            return Err(Ineligible::OutsideShift);
        }
        if worker.is_on_leave(window) {
            return Err(Ineligible::OnLeave);
        }
        if schedule.load_in(window, self.moving_job) >= self.capacity {
            return Err(Ineligible::AtCapacity);
        }

        Ok(())
    }

    pub fn is_eligible(&self, schedule: &WorkerSchedule, window: &TimeWindow) -> bool {
        match self.check(schedule, window) {
            Ok(()) => true,
            Err(reason) => {
                debug!(
                    worker_id = %schedule.worker.id,
                    window = %window,
                    reason = ?reason,
                    "Worker not eligible"
                );
                false
            }
        }
    }
}
