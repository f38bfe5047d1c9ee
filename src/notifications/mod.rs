//! Process-engine notification
//!
//! When a confirmed overwrite changes a job's schedule, the workflow engine
//! that owns the job has to learn the new times. The scheduling core only
//! talks to the [`ProcessNotifier`] trait:
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │      SchedulingEngine::confirm_overwrites  │
//! └────────────────────────────────────────────┘
//!                     │
//!                     ▼
//!            ┌─────────────────┐
//!            │ ProcessNotifier │
//!            └─────────────────┘
//!               │           │
//!               ▼           ▼
//!        ┌─────────┐ ┌─────────┐
//!        │ Webhook │ │ Logging │
//!        └─────────┘ └─────────┘
//! ```

pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::NotifierConfig;

pub use webhook::{WebhookConfig, WebhookNotifier};

/// Result type for notifier operations
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors that can occur while notifying the process engine
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("Endpoint rejected update: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Invalid notifier configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NotifyError {
    /// Server-side and transport errors can be retried
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::InvalidConfig(_) => false,
        }
    }
}

/// Schedule values pushed to the process engine after an overwrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessUpdate {
    /// Process (flow) instance id
    pub job_id: String,
    pub device_id: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Start of the pre-upgrade step, a fixed offset before the scheduled time
    pub pre_upgrade_time: Option<DateTime<Utc>>,
    pub assigned_worker: Option<String>,
    pub contact: Option<String>,
}

/// Receiver of schedule updates
#[async_trait]
pub trait ProcessNotifier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Deliver one schedule update
    async fn schedule_updated(&self, update: &ProcessUpdate) -> NotifyResult<()>;
}

/// Notifier that only writes updates to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl ProcessNotifier for LoggingNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn schedule_updated(&self, update: &ProcessUpdate) -> NotifyResult<()> {
        tracing::info!(
            job_id = %update.job_id,
            device_id = %update.device_id,
            scheduled_time = ?update.scheduled_time,
            pre_upgrade_time = ?update.pre_upgrade_time,
            assigned_worker = ?update.assigned_worker,
            "Process schedule updated"
        );
        Ok(())
    }
}

/// Build the notifier described by `config`
///
/// A webhook URL selects the webhook notifier; without one updates are
/// logged only.
pub fn from_config(config: &NotifierConfig) -> NotifyResult<Arc<dyn ProcessNotifier>> {
    match &config.webhook_url {
        Some(url) => {
            let mut webhook = WebhookConfig::new(url)
                .with_timeout(config.timeout_secs)
                .with_max_retries(config.max_retries);
            if let Some(token) = &config.auth_token {
                webhook = webhook.with_auth_token(token);
            }
            Ok(Arc::new(WebhookNotifier::new(webhook)?))
        }
        None => Ok(Arc::new(LoggingNotifier)),
    }
}
