//! Webhook process notifier
//!
//! Posts each [`ProcessUpdate`] as JSON to the process engine.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{NotifyError, NotifyResult, ProcessNotifier, ProcessUpdate};

/// Webhook notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    pub auth_token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum retry attempts on failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1000
}

impl WebhookConfig {
    /// Create a new webhook configuration
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            retry_base_ms: default_retry_base_ms(),
        }
    }

    /// Set authentication token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the first retry delay
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base_ms = base.as_millis() as u64;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Webhook URL cannot be empty".to_string());
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err("Webhook URL must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Process notifier that POSTs updates to a webhook
///
/// # Payload Format
///
/// ```json
/// {
///   "event": "schedule_updated",
///   "job_id": "flow-1234",
///   "device_id": "DEV-0001",
///   "scheduled_time": "2025-06-02T08:00:00Z",
///   "pre_upgrade_time": "2025-05-26T08:00:00Z",
///   "assigned_worker": "ab1234",
///   "contact": "owner@example.com"
/// }
/// ```
pub struct WebhookNotifier {
    config: WebhookConfig,
    client: Client,
}

impl WebhookNotifier {
    /// Create a new webhook notifier
    pub fn new(config: WebhookConfig) -> NotifyResult<Self> {
        config.validate().map_err(NotifyError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Get the webhook URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn build_payload(update: &ProcessUpdate) -> serde_json::Value {
        serde_json::json!({
            "event": "schedule_updated",
            "job_id": update.job_id,
            "device_id": update.device_id,
            "scheduled_time": update.scheduled_time.map(|t| t.to_rfc3339()),
            "pre_upgrade_time": update.pre_upgrade_time.map(|t| t.to_rfc3339()),
            "assigned_worker": update.assigned_worker,
            "contact": update.contact,
        })
    }

    /// Send the request with retry logic
    async fn send_with_retry(&self, payload: &serde_json::Value) -> NotifyResult<()> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff from the configured base delay
                let delay = Duration::from_millis(self.config.retry_base_ms << (attempt - 1));
                tokio::time::sleep(delay).await;
                tracing::debug!(
                    "Retrying webhook request (attempt {}/{})",
                    attempt + 1,
                    self.config.max_retries + 1
                );
            }

            let mut request = self.client.post(&self.config.url);

            if let Some(token) = &self.config.auth_token {
                request = request.bearer_auth(token);
            }

            match request.json(payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        tracing::debug!(url = %self.config.url, %status, "Webhook delivered");
                        return Ok(());
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unable to read response body".to_string());
                    last_error = Some(NotifyError::Rejected {
                        status: status.as_u16(),
                        body,
                    });

                    // Don't retry on client errors (4xx)
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    last_error = Some(NotifyError::Http(e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| NotifyError::InvalidConfig("no attempts made".into())))
    }
}

#[async_trait]
impl ProcessNotifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn schedule_updated(&self, update: &ProcessUpdate) -> NotifyResult<()> {
        let payload = Self::build_payload(update);
        self.send_with_retry(&payload).await
    }
}
