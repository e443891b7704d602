use anyhow::Context;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DefragError;

/// Runtime configuration, passed explicitly to the invoker and the batch scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub tool: ToolConfig,
    pub worklist: WorklistConfig,
    pub schedule: ScheduleConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Path to the snfsdefrag executable
    pub executable: PathBuf,
    /// Kill the utility after this many seconds (None = wait forever)
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorklistConfig {
    /// Newline-delimited queue of pending paths
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Sleep through business hours on weekdays
    pub enabled: bool,
    /// Business hours begin; no sleep is taken before this time
    pub start_of_day: NaiveTime,
    /// Business hours end; processing resumes here
    pub end_of_day: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Drop an item after this many failed passes (None = retry forever)
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset
    pub level: String,
}

impl ToolConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Default configuration for production
    pub fn production() -> Self {
        Config {
            tool: ToolConfig {
                executable: PathBuf::from("/usr/cvfs/bin/snfsdefrag"),
                timeout_secs: None,
            },
            worklist: WorklistConfig {
                path: PathBuf::from("/var/lib/snfs-defrag/worklist.txt"),
            },
            schedule: ScheduleConfig {
                enabled: true,
                start_of_day: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
                end_of_day: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            },
            retry: RetryConfig { max_attempts: None },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Testing configuration: no business-hours sleep, bounded retries and runtime
    pub fn testing() -> Self {
        let mut config = Self::production();
        config.tool.timeout_secs = Some(30);
        config.schedule.enabled = false;
        config.retry.max_attempts = Some(3);
        config.logging.level = "debug".to_string();
        config
    }

    /// Load from JSON string
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Save to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&contents)?;
        config.check()?;
        Ok(config)
    }

    /// `validate` folded into a single error
    pub fn check(&self) -> crate::error::Result<()> {
        self.validate()
            .map_err(|errors| DefragError::Config(errors.join("; ")))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.tool.executable.as_os_str().is_empty() {
            errors.push("tool.executable must not be empty".to_string());
        }

        if self.tool.timeout_secs == Some(0) {
            errors.push("tool.timeout_secs must be > 0".to_string());
        }

        if self.worklist.path.as_os_str().is_empty() {
            errors.push("worklist.path must not be empty".to_string());
        }

        if self.schedule.start_of_day >= self.schedule.end_of_day {
            errors.push("schedule.start_of_day must be before schedule.end_of_day".to_string());
        }

        if self.retry.max_attempts == Some(0) {
            errors.push("retry.max_attempts must be > 0".to_string());
        }

        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            errors.push(format!("logging.level '{}' is not a log level", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::production()
    }
}

/// Configuration builder for fluent API
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::production(),
        }
    }

    pub fn from_config(config: Config) -> Self {
        ConfigBuilder { config }
    }

    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tool.executable = path.into();
        self
    }

    pub fn timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.tool.timeout_secs = secs;
        self
    }

    pub fn worklist(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.worklist.path = path.into();
        self
    }

    pub fn business_hours(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.config.schedule.start_of_day = start;
        self.config.schedule.end_of_day = end;
        self
    }

    pub fn enable_schedule(mut self, enable: bool) -> Self {
        self.config.schedule.enabled = enable;
        self
    }

    pub fn max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> crate::error::Result<Config> {
        self.config.check()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
