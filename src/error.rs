//! Error classification for the shiftline crate
//!
//! Domain code returns [`SchedulerError`], notifiers return [`NotifyError`]
//! and store backends return `anyhow::Result`. Outer surfaces classify the
//! domain errors through [`ShiftlineErrorTrait`] to decide on retries and
//! reporting.
//!
//! # Architecture
//!
//! - [`ShiftlineErrorTrait`] - Common interface implemented by the domain errors
//! - [`ErrorCategory`] - Classification of errors for handling strategies

// Re-export domain-specific errors for convenience
pub use crate::notifications::NotifyError;
pub use crate::scheduler::error::SchedulerError;

/// Common trait for all shiftline error types
pub trait ShiftlineErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (webhook delivery, HTTP)
    Network,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Rejected scheduling requests (capacity, time, limits)
    Scheduler,
    /// Expired or unknown overwrite sessions
    Session,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Session => "session",
        }
    }
}

impl ShiftlineErrorTrait for SchedulerError {
    fn is_recoverable(&self) -> bool {
        SchedulerError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            SchedulerError::Storage { .. } => ErrorCategory::Storage,
            SchedulerError::InvalidConfig { .. } => ErrorCategory::Config,
            SchedulerError::SessionNotFound { .. } | SchedulerError::SessionExpired { .. } => {
                ErrorCategory::Session
            }
            _ => ErrorCategory::Scheduler,
        }
    }
}

impl ShiftlineErrorTrait for NotifyError {
    fn is_recoverable(&self) -> bool {
        NotifyError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            NotifyError::InvalidConfig(_) => ErrorCategory::Config,
            NotifyError::Http(_) | NotifyError::Rejected { .. } => ErrorCategory::Network,
        }
    }
}

/// Classify an error coming out of the CLI or another `anyhow` surface
///
/// Returns `None` when the chain holds no shiftline domain error.
pub fn classify(err: &anyhow::Error) -> Option<(ErrorCategory, bool)> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<SchedulerError>() {
            Some((e.category(), ShiftlineErrorTrait::is_recoverable(e)))
        } else {
            cause
                .downcast_ref::<NotifyError>()
                .map(|e| (e.category(), ShiftlineErrorTrait::is_recoverable(e)))
        }
    })
}
