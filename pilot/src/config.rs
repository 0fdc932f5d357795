//! Persistent automation settings.
//!
//! Stored as JSON in a platform-appropriate config directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use ie::SearchConfig;
use serde::{Deserialize, Serialize};

use crate::FailSafeState;

/// Pacing of synthetic input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Sleep after every public action. Handy when watching a script run.
    pub pause_between_actions_s: f64,
    /// Hold time between press and release of a tapped key.
    pub key_time_step_s: f64,
    /// Floor for click/tap/hotkey intervals. Some platforms drop events sent faster.
    pub min_interval_s: f64,
    /// Pointer travel time for moves and drags; 0 jumps.
    pub mouse_move_duration_s: f64,
    /// Intermediate pointer positions used when travel time is non-zero.
    pub mouse_move_steps: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            pause_between_actions_s: 0.0,
            key_time_step_s: 0.0,
            min_interval_s: if cfg!(target_os = "macos") { 0.02 } else { 0.0 },
            mouse_move_duration_s: 0.0,
            mouse_move_steps: 20,
        }
    }
}

impl Timing {
    pub fn pause(&self) -> Duration {
        secs(self.pause_between_actions_s)
    }

    pub fn key_time_step(&self) -> Duration {
        secs(self.key_time_step_s)
    }

    pub fn move_duration(&self) -> Duration {
        secs(self.mouse_move_duration_s)
    }

    /// `interval`, raised to the platform floor.
    pub fn interval(&self, interval: Duration) -> Duration {
        interval.max(secs(self.min_interval_s))
    }
}

/// Negative and non-finite values read as zero.
fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or_default()
}

/// On-disk configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults for every image search and image-targeted action.
    pub search: SearchConfig,

    /// `None` arms the guard with the display corners and the platform hotkey.
    pub failsafe: Option<FailSafeState>,

    pub timing: Timing,
}

impl Config {
    /// Path to the config file.
    pub fn path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("config_dir() unavailable")?;
        Ok(base.join("pilot.json"))
    }

    /// Load configuration from disk, falling back to defaults on missing file.
    pub fn load_or_default() -> Self {
        match Self::try_load() {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load config; using defaults");
                Self::default()
            }
        }
    }

    /// Try to load configuration from disk.
    pub fn try_load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        let cfg: Self = serde_json::from_str(&json).with_context(|| format!("parse {:?}", path))?;
        cfg.search.validate().with_context(|| format!("validate {:?}", path))?;
        Ok(cfg)
    }

    /// Save configuration to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, json).with_context(|| format!("write {:?}", path))?;
        Ok(())
    }
}
