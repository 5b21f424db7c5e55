//! Configuration module for LedVis-RS
//!
//! All settings live in one TOML file with a section per subsystem:
//!
//! ```toml
//! [mapping]
//! led_count = 180
//! radius = 200.0
//!
//! [queue]
//! capacity = 3
//! drop_policy = "oldest"
//!
//! [renderer]
//! max_fps = 60
//!
//! [subscription]
//! url = "http://192.168.4.1"
//! reconnect_delay = 1000   # milliseconds
//! ```
//!
//! Every field has a default, so a partial (or missing) file is fine.
//!
//! # App Data Location
//!
//! - **Linux**: `~/.local/share/dev.ledvis.ledvis-rs/`
//! - **macOS**: `~/Library/Application Support/dev.ledvis.ledvis-rs/`
//! - **Windows**: `%APPDATA%\dev.ledvis.ledvis-rs\`
//!
//! The `LEDVIS_CONFIG` environment variable points at a different file.

use crate::error::{LedVisError, Result};
use crate::mapping::PositionConfig;
use crate::queue::QueueConfig;
use crate::render::RendererConfig;
use crate::stream::SubscriptionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.ledvis.ledvis-rs";

/// Config filename inside the app data directory
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "LEDVIS_CONFIG";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        LedVisError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            LedVisError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Where the config is read from: `$LEDVIS_CONFIG`, else the app data directory
pub fn config_path() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => app_data_dir().map(|p| p.join(CONFIG_FILE)),
    }
}

// ==================== Duration (de)serialization ====================

/// Serialize a [`std::time::Duration`] as whole milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ==================== App Config ====================

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// LED layout
    pub mapping: PositionConfig,
    /// Frame buffering between the stream and the renderer
    pub queue: QueueConfig,
    pub renderer: RendererConfig,
    pub subscription: SubscriptionConfig,
}

impl AppConfig {
    /// Parse a config from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| LedVisError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Render the config as pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| LedVisError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LedVisError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from [`config_path`], using defaults when the file is missing or invalid
    pub fn load_or_default() -> Self {
        let Some(path) = config_path() else {
            tracing::warn!("No config location available, using defaults");
            return Self::default();
        };
        if !path.exists() {
            tracing::info!("No config at {:?}, using defaults", path);
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config to `path`, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LedVisError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| {
            LedVisError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Save to [`config_path`]
    pub fn save_default_location(&self) -> Result<()> {
        let path = config_path().ok_or_else(|| {
            LedVisError::Config("Could not determine config path".to_string())
        })?;
        self.save(path)
    }

    /// Reject settings no component can work with
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(LedVisError::Config(msg));

        if self.queue.capacity == 0 {
            return fail("queue.capacity must be at least 1".into());
        }
        if self.renderer.max_fps == 0 {
            return fail("renderer.max_fps must be at least 1".into());
        }
        if !self.mapping.radius.is_finite() || self.mapping.radius <= 0.0 {
            return fail(format!("mapping.radius must be positive, got {}", self.mapping.radius));
        }
        if !self.renderer.led_radius.is_finite() || self.renderer.led_radius <= 0.0 {
            return fail(format!(
                "renderer.led_radius must be positive, got {}",
                self.renderer.led_radius
            ));
        }
        if let Some(ratio) = self.renderer.pixel_ratio {
            if !ratio.is_finite() || ratio <= 0.0 {
                return fail(format!("renderer.pixel_ratio must be positive, got {}", ratio));
            }
        }
        if !(0.0..=1.0).contains(&self.subscription.jitter) {
            return fail(format!(
                "subscription.jitter must be within 0..=1, got {}",
                self.subscription.jitter
            ));
        }
        if self.subscription.connect_timeout.is_zero() {
            return fail("subscription.connect_timeout must be non-zero".into());
        }
        if self.subscription.led_count != self.mapping.led_count {
            return fail(format!(
                "subscription.led_count ({}) differs from mapping.led_count ({})",
                self.subscription.led_count, self.mapping.led_count
            ));
        }
        Ok(())
    }
}

// ==================== Tests ====================
