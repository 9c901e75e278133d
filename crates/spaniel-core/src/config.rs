//! Tunables shared by every spaniel component.
//!
//! A [`Config`] lives inside the [`Engine`](crate::engine::Engine) and is read
//! by the search engine, the action dispatcher and the procedural facade.
//! Settings can be persisted as JSON in `~/.spaniel/config.json`; fields absent
//! from the file take their documented defaults.
//!
//! # Example
//!
//! ```no_run
//! use spaniel_core::config::Config;
//!
//! // Load (returns defaults if file doesn't exist)
//! let mut config = Config::load();
//! config.search_cutoff_count = 5;
//! config.ensure_sensitivity = false;
//! config.save().expect("failed to save config");
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanielError};

const CONFIG_FILENAME: &str = "config.json";

/// Returns the spaniel home directory (`~/.spaniel/`), creating it if needed.
///
/// Falls back to the scratch directory when no home directory is known.
pub fn spaniel_dir() -> PathBuf {
    let dir = dirs::home_dir()
        .map(|home| home.join(".spaniel"))
        .unwrap_or_else(default_scratch_dir);
    std::fs::create_dir_all(&dir).ok();
    dir
}

fn default_scratch_dir() -> PathBuf {
    let user = std::env::var("USER").unwrap_or_else(|_| "nobody".to_string());
    std::env::temp_dir().join(format!("spaniel-{}", user))
}

fn default_data_dir() -> PathBuf {
    default_scratch_dir().join("data")
}

fn default_log_dir() -> PathBuf {
    default_scratch_dir().join("logs")
}

/// Process-wide spaniel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fail actions on insensitive widgets instead of warning.
    pub ensure_sensitivity: bool,
    /// Seconds slept between search attempts.
    pub search_backoff_duration: f64,
    /// Attempt count after which each further attempt is logged.
    pub search_warning_threshold: u32,
    /// Maximum number of search attempts.
    pub search_cutoff_count: u32,
    /// Seconds slept after each mutating attribute write.
    pub default_delay: f64,
    /// Seconds slept after each action.
    pub action_delay: f64,
    /// Seconds between raw keystrokes.
    pub typing_delay: f64,
    /// Seconds between the two clicks of a raw double click.
    pub double_click_delay: f64,
    pub debug_searching: bool,
    pub debug_sleep: bool,
    pub debug_search_paths: bool,
    pub debug_translation: bool,
    /// Log nodes by their absolute search path instead of `[role | name]`.
    pub absolute_node_paths: bool,
    /// Maximum number of children materialized for one node.
    pub children_limit: usize,
    /// Procedural facade: fail on focus errors instead of logging them.
    pub fatal_errors: bool,
    /// Refuse to start when the bus reports accessibility as disabled.
    pub check_for_a11y: bool,
    /// Also write trace output to a file in `log_dir`.
    pub log_to_file: bool,
    log_dir: PathBuf,
    data_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ensure_sensitivity: true,
            search_backoff_duration: 0.5,
            search_warning_threshold: 3,
            search_cutoff_count: 20,
            default_delay: 0.5,
            action_delay: 1.0,
            typing_delay: 0.1,
            double_click_delay: 0.1,
            debug_searching: false,
            debug_sleep: false,
            debug_search_paths: false,
            debug_translation: false,
            absolute_node_paths: false,
            children_limit: 100,
            fatal_errors: false,
            check_for_a11y: true,
            log_to_file: true,
            log_dir: default_log_dir(),
            data_dir: default_data_dir(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

fn ensure_dir(dir: &Path) -> PathBuf {
    std::fs::create_dir_all(dir).ok();
    dir.to_path_buf()
}

impl Config {
    /// Load config from `~/.spaniel/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&spaniel_dir().join(CONFIG_FILENAME)).unwrap_or_default()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to `~/.spaniel/config.json`.
    pub fn save(&self) -> Result<()> {
        self.save_to(&spaniel_dir().join(CONFIG_FILENAME))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Restore every option to its documented default.
    pub fn reset(&mut self) {
        *self = Config::default();
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let delays = [
            ("search_backoff_duration", self.search_backoff_duration),
            ("default_delay", self.default_delay),
            ("action_delay", self.action_delay),
            ("typing_delay", self.typing_delay),
            ("double_click_delay", self.double_click_delay),
        ];
        for (name, value) in delays {
            if !value.is_finite() || value < 0.0 {
                return Err(SpanielError::InvalidArgument(format!(
                    "{} must be a non-negative number of seconds (got {})",
                    name, value
                )));
            }
        }
        if self.search_cutoff_count == 0 {
            return Err(SpanielError::InvalidArgument(
                "search_cutoff_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn search_backoff(&self) -> Duration {
        seconds(self.search_backoff_duration)
    }

    pub fn default_delay(&self) -> Duration {
        seconds(self.default_delay)
    }

    pub fn action_delay(&self) -> Duration {
        seconds(self.action_delay)
    }

    pub fn typing_delay(&self) -> Duration {
        seconds(self.typing_delay)
    }

    pub fn double_click_delay(&self) -> Duration {
        seconds(self.double_click_delay)
    }

    /// Log directory, created on first read.
    pub fn log_dir(&self) -> PathBuf {
        ensure_dir(&self.log_dir)
    }

    /// Data directory, created on first read.
    pub fn data_dir(&self) -> PathBuf {
        ensure_dir(&self.data_dir)
    }

    /// Scratch directory, created on first read.
    pub fn scratch_dir(&self) -> PathBuf {
        ensure_dir(&self.scratch_dir)
    }

    pub fn set_log_dir(&mut self, dir: impl Into<PathBuf>) {
        self.log_dir = dir.into();
    }

    pub fn set_data_dir(&mut self, dir: impl Into<PathBuf>) {
        self.data_dir = dir.into();
    }

    pub fn set_scratch_dir(&mut self, dir: impl Into<PathBuf>) {
        self.scratch_dir = dir.into();
    }
}
