//! TOML configuration for default timings and pool sizing
//!
//! Every section and field has a default, so a missing file or a partial file
//! still yields a usable configuration.
//!
//! ```toml
//! [pool]
//! max_idle = 64
//! prewarm = 8
//!
//! [countdown]
//! duration_ms = 30000
//! tick_interval_ms = 250
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::TimingError;

const CONFIG_DIR: &str = "timekeeper";
const CONFIG_FILE: &str = "timing.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub pool: PoolConfig,
    pub interval: IntervalConfig,
    pub countdown: CountdownConfig,
    pub timeout: TimeoutConfig,
    pub limiter: LimiterConfig,
}

/// Sizing of the shared [`TimerPool`](crate::pool::TimerPool)
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on retained idle timers; unbounded when absent
    pub max_idle: Option<usize>,
    /// Timers allocated up front
    pub prewarm: usize,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct IntervalConfig {
    pub period_ms: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self { period_ms: 1000 }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CountdownConfig {
    pub duration_ms: u64,
    /// How often `remaining` and `progress` are recomputed
    pub tick_interval_ms: u64,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            duration_ms: 60_000,
            tick_interval_ms: 100,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub delay_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { delay_ms: 1000 }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LimiterConfig {
    pub debounce_ms: u64,
    /// Zero disables throttling
    pub throttle_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            throttle_ms: 200,
        }
    }
}

impl LimiterConfig {
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

impl TimingConfig {
    /// `<config dir>/timekeeper/timing.toml`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, TimingError> {
        toml::from_str(content).map_err(|source| TimingError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, TimingError> {
        debug!("Loading timing configuration from {}", path.display());
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| TimingError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })?;
        Self::parse(&content, path)
    }

    /// Loads from [`TimingConfig::default_path`], falling back to defaults
    ///
    /// A missing or broken file is logged and never stops startup.
    pub async fn load_or_default() -> Self {
        let path = Self::default_path();
        match tokio::fs::try_exists(&path).await {
            Ok(true) => match Self::load(&path).await {
                Ok(config) => {
                    info!("Loaded timing configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("{}, using defaults", e);
                    Self::default()
                }
            },
            Ok(false) => {
                warn!(
                    "Timing configuration {} does not exist, using defaults",
                    path.display()
                );
                Self::default()
            }
            Err(e) => {
                warn!("Could not check {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = TimingConfig::parse("", Path::new("timing.toml")).expect("valid toml");
        assert_eq!(config, TimingConfig::default());
        assert_eq!(config.pool.max_idle, None);
        assert_eq!(config.countdown.tick_interval_ms, 100);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let content = r#"
            [pool]
            max_idle = 16

            [countdown]
            duration_ms = 5000
        "#;
        let config = TimingConfig::parse(content, Path::new("timing.toml")).expect("valid toml");
        assert_eq!(config.pool.max_idle, Some(16));
        assert_eq!(config.pool.prewarm, 0);
        assert_eq!(config.countdown.duration_ms, 5000);
        assert_eq!(config.countdown.tick_interval_ms, 100);
        assert_eq!(config.limiter.throttle_delay(), Duration::from_millis(200));
    }

    #[test]
    fn invalid_toml_is_reported_with_path() {
        let err = TimingConfig::parse("[pool\nmax_idle = ", Path::new("broken.toml"))
            .expect_err("invalid toml");
        assert!(matches!(err, TimingError::ConfigParse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let path = std::env::temp_dir().join("timekeeper-does-not-exist/timing.toml");
        let err = TimingConfig::load(&path).await.expect_err("file is missing");
        assert!(matches!(err, TimingError::ConfigRead { .. }));
    }

    #[tokio::test]
    async fn load_reads_written_file() {
        let dir = std::env::temp_dir().join(format!("timekeeper-config-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.expect("create dir");
        let path = dir.join(CONFIG_FILE);
        let written = TimingConfig {
            timeout: TimeoutConfig { delay_ms: 42 },
            ..TimingConfig::default()
        };
        let content = toml::to_string_pretty(&written).expect("serialize");
        tokio::fs::write(&path, content).await.expect("write");

        let loaded = TimingConfig::load(&path).await.expect("load");
        assert_eq!(loaded, written);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
