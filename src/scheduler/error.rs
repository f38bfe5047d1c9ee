//! Error types for the scheduler module

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::models::JobStatus;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// Requested time is not strictly in the future
    PastTime {
        requested: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// No eligible worker with spare capacity covers the window
    NoCapacity {
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        skill: String,
        candidates_examined: usize,
    },

    /// Job has already been rescheduled the maximum number of times
    RescheduleLimit {
        job_id: String,
        count: u32,
        max: u32,
    },

    /// Overwrite session id was never issued (or already confirmed)
    SessionNotFound {
        session_id: Uuid,
    },

    /// Overwrite session outlived its TTL
    SessionExpired {
        session_id: Uuid,
        expired_at: DateTime<Utc>,
    },

    /// Referenced job, worker or task does not exist
    EntityNotFound {
        entity: &'static str,
        id: String,
    },

    /// Job is in a terminal state and can no longer be moved
    JobClosed {
        job_id: String,
        status: JobStatus,
    },

    /// Batch rows failed validation
    InvalidBatch {
        errors: Vec<String>,
    },

    /// Configuration value out of range
    InvalidConfig {
        field: String,
        reason: String,
    },

    /// Persistence layer failure
    Storage {
        operation: String,
        reason: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PastTime { requested, now } => {
                write!(
                    f,
                    "Requested time {} is not after current time {}",
                    requested.to_rfc3339(),
                    now.to_rfc3339()
                )
            }
            Self::NoCapacity {
                window_start,
                window_end,
                skill,
                candidates_examined,
            } => {
                write!(
                    f,
                    "No worker with skill '{}' available for [{}, {}) ({} candidates examined)",
                    skill,
                    window_start.to_rfc3339(),
                    window_end.to_rfc3339(),
                    candidates_examined
                )
            }
            Self::RescheduleLimit { job_id, count, max } => {
                write!(
                    f,
                    "Job '{}' has been rescheduled {} times (max {})",
                    job_id, count, max
                )
            }
            Self::SessionNotFound { session_id } => {
                write!(f, "Overwrite session not found: {}", session_id)
            }
            Self::SessionExpired {
                session_id,
                expired_at,
            } => {
                write!(
                    f,
                    "Overwrite session {} expired at {}",
                    session_id,
                    expired_at.to_rfc3339()
                )
            }
            Self::EntityNotFound { entity, id } => {
                write!(f, "{} not found: {}", entity, id)
            }
            Self::JobClosed { job_id, status } => {
                write!(f, "Job '{}' is {} and cannot be rescheduled", job_id, status)
            }
            Self::InvalidBatch { errors } => {
                write!(f, "Invalid batch: {}", errors.join("; "))
            }
            Self::InvalidConfig { field, reason } => {
                write!(f, "Invalid config '{}': {}", field, reason)
            }
            Self::Storage { operation, reason } => {
                write!(f, "Storage error during '{}': {}", operation, reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create a past-time error
    pub fn past_time(requested: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::PastTime { requested, now }
    }

    /// Create a not-found error for a job
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            entity: "Job",
            id: id.into(),
        }
    }

    /// Create a not-found error for a worker
    pub fn worker_not_found(id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            entity: "Worker",
            id: id.into(),
        }
    }

    /// Create a config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a store failure with the operation that triggered it
    pub fn storage(operation: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::Storage {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    /// Short machine-readable reason, used as a metrics label
    pub fn reason(&self) -> &'static str {
        match self {
            Self::PastTime { .. } => "past_time",
            Self::NoCapacity { .. } => "no_capacity",
            Self::RescheduleLimit { .. } => "reschedule_limit",
            Self::SessionNotFound { .. } => "session_not_found",
            Self::SessionExpired { .. } => "session_expired",
            Self::EntityNotFound { .. } => "not_found",
            Self::JobClosed { .. } => "job_closed",
            Self::InvalidBatch { .. } => "invalid_batch",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::Storage { .. } => "storage",
        }
    }

    /// Check if retrying the same request later can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoCapacity { .. } | Self::Storage { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_past_time_error() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap();
        let err = SchedulerError::past_time(now, now);
        assert!(err.to_string().contains("not after"));
        assert_eq!(err.reason(), "past_time");
    }

    #[test]
    fn test_no_capacity_message() {
        let start = Utc.with_ymd_and_hms(2025, 1, 2, 8, 0, 0).unwrap();
        let err = SchedulerError::NoCapacity {
            window_start: start,
            window_end: start + chrono::Duration::hours(4),
            skill: "Upgrade".to_string(),
            candidates_examined: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("Upgrade"));
        assert!(msg.contains("3 candidates"));
    }

    #[test]
    fn test_is_recoverable() {
        let storage = SchedulerError::storage("save_job", "disk full");
        assert!(storage.is_recoverable());

        let limit = SchedulerError::RescheduleLimit {
            job_id: "j".to_string(),
            count: 3,
            max: 3,
        };
        assert!(!limit.is_recoverable());
    }

    #[test]
    fn test_job_not_found() {
        let err = SchedulerError::job_not_found("job-9");
        assert_eq!(err.to_string(), "Job not found: job-9");
    }
}
