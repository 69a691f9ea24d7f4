//! Engine configuration
//!
//! Plain structs with documented defaults. Every field can be overridden from a
//! JSON document; absent fields keep their default.

use crate::annotation::Color;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fallback page layout used before rendered pages can be measured
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Space around the stacked pages (pixels)
    pub padding: f64,
    /// Vertical space between consecutive pages (pixels)
    pub gap: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            padding: 16.0,
            gap: 16.0,
        }
    }
}

/// Pen settings applied to new ink strokes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InkSettings {
    pub color: Color,
    /// Stroke width in page pixels at the zoom the stroke is drawn at
    pub width: f64,
}

impl Default for InkSettings {
    fn default() -> Self {
        Self {
            color: Color::RED,
            width: 2.0,
        }
    }
}

/// Marker settings applied to new highlights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightSettings {
    pub color: Color,
    /// 0.0 = invisible, 1.0 = opaque
    pub opacity: f64,
}

impl Default for HighlightSettings {
    fn default() -> Self {
        Self {
            color: Color::YELLOW,
            opacity: 0.35,
        }
    }
}

/// Text box creation and layout parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextBoxConfig {
    pub min_width: f64,
    pub min_height: f64,
    /// Inner padding between the box edge and its text
    pub padding: f64,
    /// Font size for new boxes in page pixels
    pub default_font_size: f64,
    pub line_height_multiplier: f64,
    pub color: Color,
}

impl Default for TextBoxConfig {
    fn default() -> Self {
        Self {
            min_width: 40.0,
            min_height: 24.0,
            padding: 4.0,
            default_font_size: 14.0,
            line_height_multiplier: 1.2,
            color: Color::BLACK,
        }
    }
}

/// Tolerances for turning raw selection rectangles into line segments
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Vertical centers are rounded to multiples of this to form line keys
    pub line_key_px: f64,
    /// Largest horizontal gap bridged when merging neighbours
    pub gap_tolerance_px: f64,
    /// Minimum intersection height over the smaller height
    pub min_vertical_overlap: f64,
    /// Safety bound on merged segments kept per page
    pub max_segments_per_page: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            line_key_px: 4.0,
            gap_tolerance_px: 3.0,
            min_vertical_overlap: 0.5,
            max_segments_per_page: 200,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub layout: LayoutConfig,
    pub ink: InkSettings,
    pub highlight: HighlightSettings,
    pub text_box: TextBoxConfig,
    pub merge: MergeConfig,

    /// Pointer moves shorter than this do not add an ink point (pixels)
    pub min_point_distance: f64,

    /// Extra hit distance on each side of a stroke, beyond its visible width
    pub hit_slop: f64,

    /// Upper bound for normalized positions written to the store
    pub norm_clamp_max: f64,

    /// Maximum undo entries kept; the oldest is dropped first
    pub undo_depth: usize,

    /// Page-fraction offset applied per successive paste
    pub paste_nudge: f64,

    /// A marquee smaller than this on both axes counts as a click
    pub click_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            ink: InkSettings::default(),
            highlight: HighlightSettings::default(),
            text_box: TextBoxConfig::default(),
            merge: MergeConfig::default(),
            min_point_distance: 2.0,
            hit_slop: 6.0,
            norm_clamp_max: 0.98,
            undo_depth: 100,
            paste_nudge: 0.02,
            click_threshold: 3.0,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration, filling absent fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn with_layout(mut self, padding: f64, gap: f64) -> Self {
        self.layout = LayoutConfig { padding, gap };
        self
    }

    pub fn with_undo_depth(mut self, depth: usize) -> Self {
        self.undo_depth = depth.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{ "undo_depth": 5, "layout": { "gap": 40 } }"#).unwrap();
        assert_eq!(config.undo_depth, 5);
        assert_eq!(config.layout.gap, 40.0);
        assert_eq!(config.layout.padding, LayoutConfig::default().padding);
        assert_eq!(config.norm_clamp_max, 0.98);
    }

    #[test]
    fn test_color_from_hex_in_config() {
        let config = EngineConfig::from_json_str(r##"{ "ink": { "color": "#00ff00" } }"##).unwrap();
        assert_eq!(config.ink.color, Color::GREEN);
        assert_eq!(config.ink.width, InkSettings::default().width);
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load("/nonexistent/markup.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "paste_nudge": 0.05 }"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.paste_nudge, 0.05);
    }

    #[test]
    fn test_undo_depth_never_zero() {
        assert_eq!(EngineConfig::default().with_undo_depth(0).undo_depth, 1);
    }
}
