//! Configuration file support for Dosewise.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/dosewise/config.toml`.

use crate::reconcile::{DAY_AXIS_FLOOR, MONTH_AXIS_FLOOR};
use crate::{Bucketing, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub chart: ChartConfig,

    #[serde(default)]
    pub reminders: ReminderConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Chart axis configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_day_axis_floor")]
    pub day_axis_floor: usize,

    #[serde(default = "default_month_axis_floor")]
    pub month_axis_floor: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            day_axis_floor: default_day_axis_floor(),
            month_axis_floor: default_month_axis_floor(),
        }
    }
}

impl ChartConfig {
    /// Axis floor for the given bucketing
    pub fn axis_floor(&self, bucketing: Bucketing) -> usize {
        match bucketing {
            Bucketing::ByDay => self.day_axis_floor,
            Bucketing::ByMonth => self.month_axis_floor,
        }
    }
}

/// Reminder materialization configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Days ahead (including today) to create reminders for
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: u32,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            lookahead_days: default_lookahead_days(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("dosewise")
}

fn default_day_axis_floor() -> usize {
    DAY_AXIS_FLOOR
}

fn default_month_axis_floor() -> usize {
    MONTH_AXIS_FLOOR
}

fn default_lookahead_days() -> u32 {
    2
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values that would make the tool misbehave
    pub fn validate(&self) -> Result<()> {
        if self.reminders.lookahead_days == 0 {
            return Err(Error::Config(
                "reminders.lookahead_days must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("dosewise").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
