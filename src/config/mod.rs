//! Configuration management for shiftline
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scheduling policy
    pub scheduling: SchedulingConfig,

    /// Pending overwrite session lifetime
    pub sessions: SessionConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Process-engine notification
    pub notifier: NotifierConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Upper bound for every day-valued setting (ten years)
pub const MAX_DAYS: i64 = 3650;

/// Upper bound for session TTL and sweep interval (one week)
pub const MAX_SESSION_SECS: u64 = 7 * 24 * 3600;

/// Upper bound for the notifier request timeout
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Scheduling policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Width of a bookable window in hours; must divide 24
    pub window_hours: u32,

    /// Maximum jobs per worker per window
    pub capacity_per_window: u32,

    /// Maximum number of reschedules per job
    pub max_reschedules: u32,

    /// Jobs closer than this many days cannot have their time changed by a batch
    pub reschedule_freeze_days: i64,

    /// Offset of the pre-upgrade step before the scheduled time
    pub pre_upgrade_offset_days: i64,

    /// Auto-schedule searches from now plus this many days
    pub auto_schedule_lead_days: i64,

    /// Length of the auto-schedule search range in days
    pub auto_schedule_horizon_days: i64,

    /// Skill given to jobs created by batch uploads
    pub default_skill: String,
}

/// Overwrite session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session time-to-live in seconds
    pub ttl_secs: u64,

    /// Expiry sweep interval in seconds
    pub sweep_interval_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Process notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Webhook endpoint; updates are only logged when unset
    pub webhook_url: Option<String>,

    /// Bearer token sent with each webhook call
    pub auth_token: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retry attempts after the first failure
    pub max_retries: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let scheduling = SchedulingConfig {
            window_hours: env_parse("SHIFTLINE_WINDOW_HOURS", defaults.scheduling.window_hours),
            capacity_per_window: env_parse(
                "SHIFTLINE_CAPACITY_PER_WINDOW",
                defaults.scheduling.capacity_per_window,
            ),
            max_reschedules: env_parse(
                "SHIFTLINE_MAX_RESCHEDULES",
                defaults.scheduling.max_reschedules,
            ),
            reschedule_freeze_days: env_parse(
                "SHIFTLINE_RESCHEDULE_FREEZE_DAYS",
                defaults.scheduling.reschedule_freeze_days,
            ),
            pre_upgrade_offset_days: env_parse(
                "SHIFTLINE_PRE_UPGRADE_OFFSET_DAYS",
                defaults.scheduling.pre_upgrade_offset_days,
            ),
            auto_schedule_lead_days: env_parse(
                "SHIFTLINE_AUTO_SCHEDULE_LEAD_DAYS",
                defaults.scheduling.auto_schedule_lead_days,
            ),
            auto_schedule_horizon_days: env_parse(
                "SHIFTLINE_AUTO_SCHEDULE_HORIZON_DAYS",
                defaults.scheduling.auto_schedule_horizon_days,
            ),
            default_skill: std::env::var("SHIFTLINE_DEFAULT_SKILL")
                .unwrap_or(defaults.scheduling.default_skill),
        };

        let sessions = SessionConfig {
            ttl_secs: env_parse("SHIFTLINE_SESSION_TTL", defaults.sessions.ttl_secs),
            sweep_interval_secs: env_parse(
                "SHIFTLINE_SWEEP_INTERVAL",
                defaults.sessions.sweep_interval_secs,
            ),
        };

        let sqlite_path = std::env::var("SHIFTLINE_SQLITE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database.sqlite_path);

        let notifier = NotifierConfig {
            webhook_url: std::env::var("SHIFTLINE_WEBHOOK_URL").ok(),
            auth_token: std::env::var("SHIFTLINE_WEBHOOK_TOKEN").ok(),
            timeout_secs: env_parse("SHIFTLINE_WEBHOOK_TIMEOUT", defaults.notifier.timeout_secs),
            max_retries: env_parse("SHIFTLINE_WEBHOOK_RETRIES", defaults.notifier.max_retries),
        };

        let log_level =
            std::env::var("SHIFTLINE_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("SHIFTLINE_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            scheduling,
            sessions,
            database: DatabaseConfig { sqlite_path },
            notifier,
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let hours = self.scheduling.window_hours;
        if hours == 0 || 24 % hours != 0 {
            anyhow::bail!("window_hours must be a positive divisor of 24, got {hours}");
        }

        if self.scheduling.capacity_per_window == 0 {
            anyhow::bail!("capacity_per_window must be greater than 0");
        }

        let days = [
            ("reschedule_freeze_days", self.scheduling.reschedule_freeze_days),
            ("pre_upgrade_offset_days", self.scheduling.pre_upgrade_offset_days),
            ("auto_schedule_lead_days", self.scheduling.auto_schedule_lead_days),
            ("auto_schedule_horizon_days", self.scheduling.auto_schedule_horizon_days),
        ];
        for (name, value) in days {
            if !(0..=MAX_DAYS).contains(&value) {
                anyhow::bail!("{name} must be between 0 and {MAX_DAYS}, got {value}");
            }
        }

        if self.scheduling.auto_schedule_horizon_days == 0 {
            anyhow::bail!("auto_schedule_horizon_days must be greater than 0");
        }

        if !(1..=MAX_SESSION_SECS).contains(&self.sessions.ttl_secs) {
            anyhow::bail!("session ttl_secs must be between 1 and {MAX_SESSION_SECS}");
        }

        if !(1..=MAX_SESSION_SECS).contains(&self.sessions.sweep_interval_secs) {
            anyhow::bail!("sweep_interval_secs must be between 1 and {MAX_SESSION_SECS}");
        }

        if !(1..=MAX_TIMEOUT_SECS).contains(&self.notifier.timeout_secs) {
            anyhow::bail!("notifier timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}");
        }

        Ok(())
    }

    /// Window width as a chrono duration
    #[must_use]
    pub fn window_width(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.scheduling.window_hours))
    }

    /// Session TTL as a chrono duration
    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.sessions.ttl_secs.min(MAX_SESSION_SECS) as i64)
    }

    /// Sweep interval as Duration
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sessions.sweep_interval_secs)
    }

    /// Webhook timeout as Duration
    #[must_use]
    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_secs(self.notifier.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduling: SchedulingConfig {
                window_hours: 4,
                capacity_per_window: 5,
                max_reschedules: 3,
                reschedule_freeze_days: 3,
                pre_upgrade_offset_days: 7,
                auto_schedule_lead_days: 30,
                auto_schedule_horizon_days: 60,
                default_skill: String::from("Upgrade"),
            },
            sessions: SessionConfig {
                ttl_secs: 180,
                sweep_interval_secs: 60,
            },
            database: DatabaseConfig {
                sqlite_path: PathBuf::from("data/shiftline.db"),
            },
            notifier: NotifierConfig {
                webhook_url: None,
                auth_token: None,
                timeout_secs: 10,
                max_retries: 3,
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}
