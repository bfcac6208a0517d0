//! Config module.
//! Manages I/O for jae.json (scanner endpoint, capture tuning, board defaults).
//! Uses serde for JSON serialization; every field has a default so partial files work.
//! A missing file means defaults; CLI flags override afterwards.

use crate::camera::{CameraConstraints, Region};
use crate::frame::FrameMode;
use crate::sharpness::DEFAULT_THRESHOLD;
use crate::title::{DateLocale, TitleStyle};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "jae.json";

/// How the scanner decides when to capture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Capture button only
    #[default]
    Manual,
    /// Sharpness gate on every frame tick, button still works
    Auto,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Manual => write!(f, "manual (button)"),
            CaptureMode::Auto => write!(f, "auto (sharpness gate)"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub server_url: String,
    pub upload_path: String,
    pub timeout_secs: u64,
    pub jpeg_quality: u8,
    pub sharpness_threshold: f64,
    pub capture_mode: CaptureMode,
    pub frame_mode: FrameMode,
    pub constraints: CameraConstraints,
    pub screen_region: Option<Region>,
    pub viewport: Viewport,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            server_url: "http://localhost:5001".to_string(),
            upload_path: "/scan".to_string(),
            timeout_secs: 30,
            jpeg_quality: 95,
            sharpness_threshold: DEFAULT_THRESHOLD,
            capture_mode: CaptureMode::Manual,
            frame_mode: FrameMode::Native,
            constraints: CameraConstraints::default(),
            screen_region: None,
            viewport: Viewport {
                width: 1280,
                height: 720,
            },
        }
    }
}

impl ScannerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// `None` falls back to `LANG`.
    pub locale: Option<DateLocale>,
    pub title_style: TitleStyle,
    pub team1_default: String,
    pub team2_default: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            locale: None,
            title_style: TitleStyle::WithTeams,
            team1_default: crate::board::DEFAULT_TEAM1_HEADING.to_string(),
            team2_default: crate::board::DEFAULT_TEAM2_HEADING.to_string(),
        }
    }
}

impl BoardConfig {
    pub fn locale(&self) -> DateLocale {
        self.locale.unwrap_or_else(DateLocale::from_env)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub board: BoardConfig,
}

/// Loads `path`, or `jae.json` when none is given. Only an explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let (path, required) = match path {
        Some(p) => (p, true),
        None => (Path::new(DEFAULT_CONFIG_PATH), false),
    };

    if !path.exists() {
        if required {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        debug!("no {} found, using defaults", path.display());
        return Ok(AppConfig::default());
    }

    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config = serde_json::from_str(&json)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, json).with_context(|| format!("Failed to write config: {}", path.display()))
}
