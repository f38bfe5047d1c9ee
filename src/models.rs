// Core data structures for the shiftline scheduling engine

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Time Window
// ============================================================================

/// Absolute half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window from explicit bounds
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Create a window of `width` starting at `start`
    pub fn starting_at(start: DateTime<Utc>, width: Duration) -> Self {
        Self {
            start,
            end: start + width,
        }
    }

    /// The whole UTC calendar day containing `instant`
    pub fn utc_day_of(instant: DateTime<Utc>) -> Self {
        let start = instant.date_naive().and_time(NaiveTime::MIN).and_utc();
        Self::starting_at(start, Duration::days(1))
    }

    /// Smallest window covering both `self` and `other`
    pub fn union(&self, other: &TimeWindow) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Strict overlap; windows that only touch do not overlap
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Whether `other` lies entirely inside this window
    pub fn contains(&self, other: &TimeWindow) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Length of the window
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether the window is empty or inverted
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

// ============================================================================
// Shift
// ============================================================================

/// Daily-recurring duty pattern in UTC wall-clock time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    /// Short shift code (e.g., "DAY", "NIGHT")
    pub code: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Nominal length in minutes
    pub duration_minutes: u32,
}

impl Shift {
    /// Create a shift, deriving the nominal duration from the wall times
    pub fn new(code: impl Into<String>, start: NaiveTime, end: NaiveTime) -> Self {
        let mut minutes = (end - start).num_minutes();
        if minutes < 0 {
            minutes += 24 * 60;
        }
        Self {
            code: code.into(),
            start,
            end,
            duration_minutes: minutes as u32,
        }
    }

    /// Parse a shift from `HH:MM` wall times
    pub fn parse(code: impl Into<String>, start: &str, end: &str) -> Option<Self> {
        let start = NaiveTime::parse_from_str(start, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(end, "%H:%M").ok()?;
        Some(Self::new(code, start, end))
    }

    /// End-of-day earlier than start-of-day: the shift runs into the next day
    pub fn is_overnight(&self) -> bool {
        self.end < self.start
    }

    /// The concrete shift instance that starts on `day`
    pub fn instance_on(&self, day: NaiveDate) -> TimeWindow {
        let start = day.and_time(self.start).and_utc();
        let end_day = if self.is_overnight() {
            day + Duration::days(1)
        } else {
            day
        };
        TimeWindow::new(start, end_day.and_time(self.end).and_utc())
    }
}

// ============================================================================
// Leave
// ============================================================================

/// Worker absence over an absolute interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leave {
    pub id: String,
    /// Free-form leave type ("vacation", "sick", ...)
    pub kind: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Leave {
    pub fn new(kind: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            start,
            end,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Field employee who can be assigned jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    /// Login identifier (att-uid style)
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub skills: BTreeSet<String>,
    /// Without a shift the worker is never eligible
    #[serde(default)]
    pub shift: Option<Shift>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Ordered by start time
    #[serde(default)]
    pub leaves: Vec<Leave>,
}

fn default_active() -> bool {
    true
}

impl Worker {
    /// Create an active worker with no skills and no shift
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            role: String::new(),
            skills: BTreeSet::new(),
            shift: None,
            active: true,
            leaves: Vec::new(),
        }
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skills.insert(skill.into());
        self
    }

    pub fn with_shift(mut self, shift: Shift) -> Self {
        self.shift = Some(shift);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    /// Add a leave period, keeping leaves ordered by start
    pub fn with_leave(mut self, leave: Leave) -> Self {
        self.add_leave(leave);
        self
    }

    pub fn add_leave(&mut self, leave: Leave) {
        let pos = self.leaves.partition_point(|l| l.start <= leave.start);
        self.leaves.insert(pos, leave);
    }

    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.contains(skill)
    }

    /// Whether any leave overlaps `window`
    pub fn is_on_leave(&self, window: &TimeWindow) -> bool {
        self.leaves.iter().any(|l| l.window().overlaps(window))
    }

    pub fn display_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (true, true) => self.id.clone(),
            _ => format!("{} {}", self.first_name, self.last_name).trim().to_string(),
        }
    }
}

// ============================================================================
// Task
// ============================================================================

/// A worker's concrete duty window aggregating one or more jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub worker_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Attached job ids; the workflow count is always the length of this list
    pub job_ids: Vec<String>,
}

impl Task {
    /// Create an empty task for `worker_id` over `window`
    pub fn new(worker_id: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            id: Uuid::new_v4(),
            worker_id: worker_id.into(),
            start: window.start,
            end: window.end,
            job_ids: Vec::new(),
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }

    /// Number of attached jobs
    pub fn workflow_count(&self) -> u32 {
        self.job_ids.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.job_ids.is_empty()
    }

    pub fn contains_job(&self, job_id: &str) -> bool {
        self.job_ids.iter().any(|id| id == job_id)
    }

    /// Attach a job; attaching twice is a no-op
    pub fn attach(&mut self, job_id: &str) {
        if !self.contains_job(job_id) {
            self.job_ids.push(job_id.to_string());
        }
    }

    /// Detach a job, returning whether it was attached
    pub fn detach(&mut self, job_id: &str) -> bool {
        let before = self.job_ids.len();
        self.job_ids.retain(|id| id != job_id);
        self.job_ids.len() != before
    }

    /// Job count ignoring `job_id`, used when that job is about to move
    pub fn load_excluding(&self, job_id: &str) -> u32 {
        self.job_ids.iter().filter(|id| *id != job_id).count() as u32
    }
}

// ============================================================================
// Job
// ============================================================================

/// Lifecycle state of a job as seen by the scheduling core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, not yet bound to a task
    Started,
    /// Bound to a task by the allocator
    Scheduled,
    /// Updated by a confirmed batch overwrite
    Overwritten,
    /// Moved to a new window by a reschedule request
    Rescheduled,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Scheduled => "SCHEDULED",
            Self::Overwritten => "OVERWRITTEN",
            Self::Rescheduled => "RESCHEDULED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "STARTED" => Some(Self::Started),
            "SCHEDULED" => Some(Self::Scheduled),
            "OVERWRITTEN" => Some(Self::Overwritten),
            "RESCHEDULED" => Some(Self::Rescheduled),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal jobs are owned by the process engine and never rescheduled
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow execution against one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Process (flow) instance id
    pub id: String,
    pub device_id: String,
    /// Skill a worker needs to perform this job
    pub skill: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub assigned_worker: Option<String>,
    /// Customer contact e-mail
    pub contact: Option<String>,
    pub reschedule_count: u32,
    pub task_id: Option<Uuid>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create an unscheduled job
    pub fn new(
        id: impl Into<String>,
        device_id: impl Into<String>,
        skill: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            device_id: device_id.into(),
            skill: skill.into(),
            scheduled_time: None,
            assigned_worker: None,
            contact: None,
            reschedule_count: 0,
            task_id: None,
            status: JobStatus::Started,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_assigned_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.assigned_worker = Some(worker_id.into());
        self
    }

    pub fn is_scheduled(&self) -> bool {
        self.task_id.is_some()
    }
}

// ============================================================================
// Projections
// ============================================================================

/// A worker together with its tasks inside a queried range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSchedule {
    pub worker: Worker,
    pub tasks: Vec<Task>,
}

impl WorkerSchedule {
    pub fn new(worker: Worker, tasks: Vec<Task>) -> Self {
        Self { worker, tasks }
    }

    /// Jobs inside `window`, not counting `ignore_job`
    pub fn load_in(&self, window: &TimeWindow, ignore_job: Option<&str>) -> u32 {
        self.tasks
            .iter()
            .filter(|t| t.window().overlaps(window))
            .map(|t| match ignore_job {
                Some(job_id) => t.load_excluding(job_id),
                None => t.workflow_count(),
            })
            .sum()
    }

    /// Total jobs in the listed tasks
    pub fn total_jobs(&self) -> u32 {
        self.tasks.iter().map(Task::workflow_count).sum()
    }
}

// ============================================================================
// Batch Reconciliation
// ============================================================================

/// One row of a bulk job submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProposal {
    pub device_id: String,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
    pub assigned_worker: String,
    #[serde(default)]
    pub contact: Option<String>,
}

/// Field that differs between an existing job and a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedField {
    ScheduledTime,
    AssignedWorker,
    Contact,
}

/// The reconcilable values of a device's job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceValues {
    pub scheduled_time: Option<DateTime<Utc>>,
    pub assigned_worker: Option<String>,
    pub contact: Option<String>,
}

impl DeviceValues {
    pub fn of_job(job: &Job) -> Self {
        Self {
            scheduled_time: job.scheduled_time,
            assigned_worker: job.assigned_worker.clone(),
            contact: job.contact.clone(),
        }
    }
}

/// A conflicting change awaiting confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverwriteProposal {
    pub device_id: String,
    pub old: DeviceValues,
    pub new: DeviceValues,
    pub changes: BTreeSet<ChangedField>,
}

impl OverwriteProposal {
    pub fn touches(&self, field: ChangedField) -> bool {
        self.changes.contains(&field)
    }
}

/// Conflicting proposals from one batch, held until confirmed or expired
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOverwriteSession {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub overwrites: Vec<OverwriteProposal>,
}

impl PendingOverwriteSession {
    pub fn new(created_at: DateTime<Utc>, overwrites: Vec<OverwriteProposal>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at,
            overwrites,
        }
    }

    /// Instant after which the session is expired
    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        self.created_at + ttl
    }

    /// Expired once `created_at + ttl` lies strictly before `now`
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at(ttl) < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_window_overlap_is_strict() {
        let a = TimeWindow::new(at(8, 0), at(12, 0));
        let b = TimeWindow::new(at(12, 0), at(16, 0));
        let c = TimeWindow::new(at(11, 0), at(13, 0));

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn test_utc_day_of() {
        let day = TimeWindow::utc_day_of(at(17, 45));
        assert_eq!(day.start, at(0, 0));
        assert_eq!(day.duration(), Duration::days(1));
    }

    #[test]
    fn test_shift_duration_and_overnight() {
        let day = Shift::parse("DAY", "08:00", "17:00").unwrap();
        assert!(!day.is_overnight());
        assert_eq!(day.duration_minutes, 9 * 60);

        let night = Shift::parse("NIGHT", "22:00", "06:00").unwrap();
        assert!(night.is_overnight());
        assert_eq!(night.duration_minutes, 8 * 60);
    }

    #[test]
    fn test_task_attach_detach_keeps_count() {
        let mut task = Task::new("w1", TimeWindow::new(at(8, 0), at(12, 0)));
        task.attach("job-1");
        task.attach("job-2");
        task.attach("job-1");
        assert_eq!(task.workflow_count(), 2);

        assert!(task.detach("job-1"));
        assert!(!task.detach("job-1"));
        assert_eq!(task.workflow_count(), 1);
        assert_eq!(task.load_excluding("job-2"), 0);
    }

    #[test]
    fn test_worker_leaves_stay_ordered() {
        let worker = Worker::new("w1")
            .with_leave(Leave::new("sick", at(14, 0), at(15, 0)))
            .with_leave(Leave::new("vacation", at(9, 0), at(10, 0)));

        assert_eq!(worker.leaves[0].kind, "vacation");
        assert!(worker.is_on_leave(&TimeWindow::new(at(9, 30), at(11, 0))));
        assert!(!worker.is_on_leave(&TimeWindow::new(at(10, 0), at(14, 0))));
    }

    #[test]
    fn test_job_status_round_trip_strings() {
        assert_eq!(JobStatus::parse("overwritten"), Some(JobStatus::Overwritten));
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Scheduled.is_terminal());
    }

    #[test]
    fn test_session_expiry_is_strict() {
        let created = at(10, 0);
        let session = PendingOverwriteSession::new(created, Vec::new());
        let ttl = Duration::minutes(3);

        assert!(!session.is_expired(ttl, at(10, 3)));
        assert!(session.is_expired(ttl, at(10, 3) + Duration::seconds(1)));
    }

    #[test]
    fn test_schedule_load_ignores_moving_job() {
        let mut task = Task::new("w1", TimeWindow::new(at(8, 0), at(12, 0)));
        task.attach("a");
        task.attach("b");
        let schedule = WorkerSchedule::new(Worker::new("w1"), vec![task]);
        let window = TimeWindow::new(at(9, 0), at(13, 0));

        assert_eq!(schedule.load_in(&window, None), 2);
        assert_eq!(schedule.load_in(&window, Some("a")), 1);
    }
}
