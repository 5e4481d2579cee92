use crate::validate_enum;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub playback: PlaybackSettings,

    #[serde(default)]
    pub render: RenderSettings,

    #[serde(default)]
    pub advanced: AdvancedSettings,
}

/// Frame pacing and decoding
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackSettings {
    /// Used when a caller does not pass an explicit fps
    #[serde(default = "default_fps")]
    pub default_fps: u32,

    /// "internal" (decode thread generates refresh ticks) or "external" (host forwards vsync)
    #[serde(default = "default_pacing")]
    pub pacing: String,

    #[serde(default = "default_refresh_hz")]
    pub display_refresh_hz: u32,

    #[serde(default = "default_decode_timeout_ms")]
    pub decode_timeout_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            default_fps: default_fps(),
            pacing: default_pacing(),
            display_refresh_hz: default_refresh_hz(),
            decode_timeout_ms: default_decode_timeout_ms(),
        }
    }
}

fn default_fps() -> u32 {
    30
}
fn default_pacing() -> String {
    "internal".to_string()
}
fn default_refresh_hz() -> u32 {
    60
}
fn default_decode_timeout_ms() -> u64 {
    5000
}

/// Compositor settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderSettings {
    /// Block the render thread until the GPU finishes each composite
    #[serde(default = "default_true")]
    pub wait_for_gpu: bool,

    #[serde(default = "default_surface_format")]
    pub surface_format: String,

    #[serde(default = "default_power_preference")]
    pub power_preference: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            wait_for_gpu: true,
            surface_format: default_surface_format(),
            power_preference: default_power_preference(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_surface_format() -> String {
    "bgra8unorm".to_string()
}
fn default_power_preference() -> String {
    "high-performance".to_string()
}

/// Advanced settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdvancedSettings {
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    #[serde(default)]
    pub debug_fps: bool,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval(),
            debug_fps: false,
        }
    }
}

fn default_stats_interval() -> u64 {
    5
}

/// Where refresh ticks for the frame clock come from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacingMode {
    /// The decode thread produces ticks at `refresh_hz`
    Internal { refresh_hz: u32 },
    /// The host forwards its display timestamps
    External,
}

impl PlayerConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let path = Path::new(&expanded);

        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: PlayerConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("alphaplay");

        Ok(config_dir.join("config.toml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Self::validate_fps(self.playback.default_fps)?;

        if self.playback.display_refresh_hz == 0 {
            anyhow::bail!("Invalid display refresh rate: 0");
        }

        validate_enum!(self.playback.pacing.as_str(), "internal", "external")?;
        validate_enum!(
            self.render.surface_format.as_str(),
            "bgra8unorm",
            "rgba8unorm"
        )?;
        validate_enum!(
            self.render.power_preference.as_str(),
            "high-performance",
            "low-power"
        )?;

        Ok(())
    }

    /// Check a frame rate requested by a caller
    pub fn validate_fps(fps: u32) -> Result<()> {
        if fps == 0 || fps > 240 {
            anyhow::bail!("Invalid fps: {} (must be 1-240)", fps);
        }
        Ok(())
    }

    pub fn pacing_mode(&self) -> PacingMode {
        match self.playback.pacing.as_str() {
            "external" => PacingMode::External,
            _ => PacingMode::Internal {
                refresh_hz: self.playback.display_refresh_hz,
            },
        }
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.playback.decode_timeout_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.advanced.stats_interval_secs)
    }
}
