//! Service configuration.
//!
//! [`AlarmConfig`] is loaded from a `.json` or `.toml` file; every field has
//! a default, so a file only needs the values it changes. A few settings can
//! be overridden from the environment:
//!
//! | Variable                   | Field               |
//! |----------------------------|---------------------|
//! | `TOCSIN_LOG_LEVEL`         | `logging.level`     |
//! | `TOCSIN_NOTIFY_EXECUTABLE` | `notify.executable` |
//! | `TOCSIN_DUMP_PATH`         | `judge.dump_path`   |

use crate::error::{AlarmError, Result};
use crate::strategy::StrategyConfig;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub dump_path: PathBuf,
    pub priority_buckets: u8,
    /// Priorities up to and including this value use the high lane.
    pub high_priority_max: u8,
    pub lock_stripes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub outdated_interval_secs: u64,
    pub outdated_threshold_secs: u64,
    pub gc_interval_secs: u64,
    pub gc_expiry_secs: u64,
    pub raw_prefix: String,
    pub alarm_prefix: String,
    pub nodata_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub high_key: String,
    pub low_key: String,
    pub poll_interval_ms: u64,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub executable: String,
    pub scan_interval_secs: u64,
    pub timeout_secs: u64,
    pub silence_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    pub judge: JudgeConfig,
    pub sweep: SweepConfig,
    pub queue: QueueConfig,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
    pub strategies: Vec<StrategyConfig>,
    /// Endpoints currently under maintenance.
    pub maintenance: Vec<String>,
    /// Durable keys owned by the no-data checker.
    pub nodata_keys: Vec<String>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            dump_path: PathBuf::from("./data/problems.json"),
            priority_buckets: 3,
            high_priority_max: 1,
            lock_stripes: 64,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            outdated_interval_secs: 60,
            outdated_threshold_secs: 3 * 60 * 60,
            gc_interval_secs: 60,
            gc_expiry_secs: 24 * 60 * 60,
            raw_prefix: "raw/".to_string(),
            alarm_prefix: "s_".to_string(),
            nodata_prefix: "nodata_".to_string(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            high_key: "queue/high".to_string(),
            low_key: "queue/low".to_string(),
            poll_interval_ms: 200,
            channel_capacity: 1024,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            executable: "./notify.sh".to_string(),
            scan_interval_secs: 1,
            timeout_secs: 30,
            silence_prefix: "silence/".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SweepConfig {
    pub fn outdated_interval(&self) -> Duration {
        Duration::from_secs(self.outdated_interval_secs)
    }

    pub fn outdated_threshold(&self) -> Duration {
        Duration::from_secs(self.outdated_threshold_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn gc_expiry(&self) -> Duration {
        Duration::from_secs(self.gc_expiry_secs)
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl NotifyConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AlarmConfig {
    /// Loads a configuration file, choosing the format by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        let config = match ext.as_str() {
            "toml" => toml::from_str::<AlarmConfig>(&content)
                .map_err(|e| AlarmError::Config(format!("{}: {}", path.display(), e)))?,
            "json" => serde_json::from_str::<AlarmConfig>(&content)?,
            _ => {
                return Err(AlarmError::Config(format!(
                    "Unsupported config extension: {}",
                    ext
                )));
            }
        };
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads a file and applies the environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Applies overrides read through `lookup`.
    ///
    /// # Returns
    /// The dotted names of the fields that were overridden.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = Vec::new();
        if let Some(level) = lookup("TOCSIN_LOG_LEVEL") {
            self.logging.level = level;
            applied.push("logging.level".to_string());
        }
        if let Some(executable) = lookup("TOCSIN_NOTIFY_EXECUTABLE") {
            self.notify.executable = executable;
            applied.push("notify.executable".to_string());
        }
        if let Some(dump_path) = lookup("TOCSIN_DUMP_PATH") {
            self.judge.dump_path = PathBuf::from(dump_path);
            applied.push("judge.dump_path".to_string());
        }
        applied
    }

    /// Checks the whole configuration, reporting every problem found.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.judge.priority_buckets == 0 {
            errors.push("Priority buckets must be at least 1".to_string());
        }
        if self.judge.lock_stripes == 0 {
            errors.push("Lock stripes must be at least 1".to_string());
        }
        if self.judge.dump_path.as_os_str().is_empty() {
            errors.push("Dump path cannot be empty".to_string());
        }

        if self.sweep.outdated_interval_secs == 0 {
            errors.push("Outdated sweep interval must be greater than zero".to_string());
        }
        if self.sweep.outdated_threshold_secs == 0 {
            errors.push("Outdated threshold must be greater than zero".to_string());
        }
        if self.sweep.gc_interval_secs == 0 {
            errors.push("GC interval must be greater than zero".to_string());
        }
        if self.sweep.gc_interval_secs > 86_400 {
            errors.push("GC interval cannot exceed one day".to_string());
        }
        if self.sweep.alarm_prefix.is_empty() || self.sweep.nodata_prefix.is_empty() {
            errors.push("Alarm and no-data prefixes cannot be empty".to_string());
        }

        if self.queue.high_key.is_empty() || self.queue.low_key.is_empty() {
            errors.push("Queue keys cannot be empty".to_string());
        }
        if self.queue.high_key == self.queue.low_key {
            errors.push("High and low queue keys must differ".to_string());
        }
        if self.queue.poll_interval_ms == 0 {
            errors.push("Queue poll interval must be greater than zero".to_string());
        }
        if self.queue.channel_capacity == 0 {
            errors.push("Channel capacity must be greater than zero".to_string());
        }

        if self.notify.executable.is_empty() {
            errors.push("Notifier executable is required".to_string());
        }
        if self.notify.scan_interval_secs == 0 {
            errors.push("Notification scan interval must be greater than zero".to_string());
        }
        if self.notify.timeout_secs == 0 {
            errors.push("Notifier timeout must be greater than zero".to_string());
        }

        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            errors.push(format!("Unknown log level: {}", self.logging.level));
        }

        let mut seen = HashSet::new();
        for config in &self.strategies {
            let strategy = &config.strategy;
            if !seen.insert(strategy.id) {
                errors.push(format!("Duplicate strategy id {}", strategy.id));
            }
            if strategy.priority == 0 {
                errors.push(format!("Strategy {} has priority 0", strategy.id));
            }
            for window in &strategy.windows {
                if !window.is_valid() {
                    errors.push(format!(
                        "Strategy {} has an invalid time window {}-{}",
                        strategy.id, window.start, window.end
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
