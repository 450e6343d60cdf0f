//! Session configuration for alignment and export

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::correspondence::{Mode, DEFAULT_MANUAL_SCALE};
use crate::error::ValidationError;
use crate::filter::{ColorRule, FilterRules};
use crate::geometry::Point;

/// A single keep/remove color filter entry as written in the session file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColorFilterSetting {
    /// `#RRGGBB` hex code.
    pub color: String,
    /// 0-100 tolerance slider value.
    #[serde(default = "default_tolerance")]
    pub tolerance: u8,
}

fn default_tolerance() -> u8 {
    50
}

impl ColorFilterSetting {
    pub fn to_rule(&self) -> Result<ColorRule, ValidationError> {
        ColorRule::from_hex(&self.color, self.tolerance)
    }
}

/// Input image paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Field photograph (JPEG).
    pub photo: PathBuf,
    /// Cropped cadastral overlay (line drawing).
    pub overlay: PathBuf,
}

/// Saved correspondence state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default)]
    pub mode: Mode,

    /// Manual mode: destination rectangle scale (0.1-1.2).
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Manual mode: the four dragged destination corners in display space,
    /// canonical order (top-left, top-right, bottom-right, bottom-left).
    /// Absent means the auto-computed rectangle is still in effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_dest: Option<[Point; 4]>,

    /// Guided mode: accepted source clicks in overlay-natural space.
    #[serde(default)]
    pub source: Vec<Point>,

    /// Guided mode: accepted destination clicks in display space.
    #[serde(default)]
    pub dest: Vec<Point>,
}

fn default_scale() -> f64 {
    DEFAULT_MANUAL_SCALE
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            scale: default_scale(),
            manual_dest: None,
            source: Vec::new(),
            dest: Vec::new(),
        }
    }
}

/// Overlay rendering preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_show_overlay")]
    pub show_overlay: bool,

    /// Overlay opacity, 0.0-1.0.
    #[serde(default = "default_opacity")]
    pub opacity: f64,

    /// Ordered keep rules; matching pixels snap to the rule color.
    #[serde(default)]
    pub keep: Vec<ColorFilterSetting>,

    /// Ordered remove rules; matching pixels become transparent.
    #[serde(default)]
    pub remove: Vec<ColorFilterSetting>,

    /// Line-thickness dilation radius in export pixels; 0 disables.
    #[serde(default)]
    pub line_thickness: u8,
}

fn default_show_overlay() -> bool {
    true
}

fn default_opacity() -> f64 {
    0.65
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            show_overlay: true,
            opacity: 0.65,
            keep: Vec::new(),
            remove: Vec::new(),
            line_thickness: 0,
        }
    }
}

/// Geometry of the alignment surface the saved display-space points refer
/// to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_surface_width")]
    pub surface_width: f64,
    #[serde(default = "default_surface_height")]
    pub surface_height: f64,
    /// Square preview thumbnail edge length for the overlay image.
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: f64,
}

fn default_surface_width() -> f64 {
    1280.0
}

fn default_surface_height() -> f64 {
    800.0
}

fn default_thumbnail_size() -> f64 {
    220.0
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            surface_width: default_surface_width(),
            surface_height: default_surface_height(),
            thumbnail_size: default_thumbnail_size(),
        }
    }
}

/// Export destination settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExportConfig {
    /// Output directory; defaults to the session file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,

    /// Filename stem; defaults to the photo's stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stem: Option<String>,
}

/// The full session file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub images: ImagesConfig,

    #[serde(default)]
    pub alignment: AlignmentConfig,

    #[serde(default)]
    pub overlay: OverlayConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Load a session from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session from {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse session from {:?}", path))?;
        tracing::info!("Loaded session from {:?}", path);
        Ok(config)
    }

    /// Save the session to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize session")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create session directory {:?}", parent))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write session to {:?}", path))?;

        tracing::info!("Saved session to {:?}", path);
        Ok(())
    }

    /// Resolve the configured color filter entries into engine rules,
    /// preserving list order.
    pub fn filter_rules(&self) -> Result<FilterRules> {
        let convert = |settings: &[ColorFilterSetting]| -> Result<Vec<ColorRule>> {
            settings
                .iter()
                .map(|s| {
                    s.to_rule()
                        .with_context(|| format!("Invalid color filter {:?}", s.color))
                })
                .collect()
        };
        Ok(FilterRules {
            keep: convert(&self.overlay.keep)?,
            remove: convert(&self.overlay.remove)?,
        })
    }
}
