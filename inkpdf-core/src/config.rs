use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotation::{DEFAULT_COLOR, DEFAULT_OPACITY, DEFAULT_SIZE};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::hit_test::SelectPrecedence;

pub const CONFIG_FILE_NAME: &str = "config.toml";

const DEFAULT_MIN_ZOOM: f32 = 0.1;
const DEFAULT_MAX_ZOOM: f32 = 5.0;

/// Per-tool defaults applied to newly created annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub text_color: String,
    pub text_size: f32,
    pub draw_color: String,
    pub draw_size: f32,
    pub highlight_color: String,
    pub highlight_opacity: f32,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            text_color: DEFAULT_COLOR.to_owned(),
            text_size: DEFAULT_SIZE,
            draw_color: DEFAULT_COLOR.to_owned(),
            draw_size: DEFAULT_SIZE,
            highlight_color: "#ffff00".to_owned(),
            highlight_opacity: DEFAULT_OPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub history_capacity: usize,
    /// Select-tool releases closer than this to the press point count as clicks.
    pub click_threshold: f32,
    pub select_precedence: SelectPrecedence,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub tools: ToolSettings,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            click_threshold: 5.0,
            select_precedence: SelectPrecedence::default(),
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            tools: ToolSettings::default(),
        }
    }
}

impl EditorConfig {
    pub fn default_path(dirs: &ProjectDirs) -> PathBuf {
        dirs.config_dir().join(CONFIG_FILE_NAME)
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to decode config file {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("invalid config file {:?}", path))?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.has_valid_zoom_bounds(),
            "zoom bounds must be finite, positive and ordered (min_zoom = {}, max_zoom = {})",
            self.min_zoom,
            self.max_zoom
        );
        Ok(())
    }

    fn has_valid_zoom_bounds(&self) -> bool {
        self.min_zoom.is_finite()
            && self.max_zoom.is_finite()
            && self.min_zoom > 0.0
            && self.min_zoom <= self.max_zoom
    }

    /// Clamps `zoom` to the configured bounds, or to the defaults when those are unusable.
    pub fn clamp_zoom(&self, zoom: f32) -> f32 {
        if !zoom.is_finite() {
            return 1.0;
        }
        if self.has_valid_zoom_bounds() {
            zoom.clamp(self.min_zoom, self.max_zoom)
        } else {
            zoom.clamp(DEFAULT_MIN_ZOOM, DEFAULT_MAX_ZOOM)
        }
    }
}
