//! TOML configuration for fbaccel.
//!
//! Defaults are compiled in; a config file may override any subset of them.
//! The file is looked up via `FBACCEL_CONFIG`, then the system location.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::accel::{DEFAULT_COPY_THRESHOLD, DEFAULT_FILL_THRESHOLD};
use crate::fbdev::DEFAULT_DEVICE;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "FBACCEL_CONFIG";
/// System-wide config file location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/fbaccel/fbaccel.toml";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FbAccelConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FbAccelConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded fbaccel configuration");
        Ok(config)
    }

    /// Try `$FBACCEL_CONFIG`, then `/etc/fbaccel/fbaccel.toml`, then defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "FBACCEL_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

/// Which framebuffer node to drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub path: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DEVICE),
        }
    }
}

/// Pixel-count cutoffs below which the device is not used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Copies smaller than this go to the fallback provider.
    pub copy: u64,
    /// Fills smaller than this are rejected.
    pub fill: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            copy: DEFAULT_COPY_THRESHOLD,
            fill: DEFAULT_FILL_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
