//! Annotation data model
//!
//! Geometry is always held in normalized page fractions so that a record is
//! independent of the zoom it was drawn at. The page number selects which page
//! metrics convert it back to pixels.

use crate::geometry::{NormPoint, NormRect};
use crate::rich_text::TextRun;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable annotation identifier
///
/// New ids are UUID v4 strings; ids read from storage are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(String);

impl AnnotationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for AnnotationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AnnotationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// RGBA color, persisted as a CSS hex string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    /// `#rrggbb`, or `#rrggbbaa` when not opaque
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Accepts `#rgb`, `#rrggbb` and `#rrggbbaa`
    pub fn parse_hex(value: &str) -> Option<Self> {
        let hex = value.trim().strip_prefix('#')?;
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let mut expanded = String::with_capacity(6);
                for c in hex.chars() {
                    expanded.push(c);
                    expanded.push(c);
                }
                Self::parse_hex(&format!("#{expanded}"))
            }
            6 => Some(Self::rgb(
                channel(hex.get(0..2)?)?,
                channel(hex.get(2..4)?)?,
                channel(hex.get(4..6)?)?,
            )),
            8 => Some(Self::new(
                channel(hex.get(0..2)?)?,
                channel(hex.get(2..4)?)?,
                channel(hex.get(4..6)?)?,
                channel(hex.get(6..8)?)?,
            )),
            _ => None,
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::parse_hex(&value).ok_or_else(|| format!("invalid color `{value}`"))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Public annotation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Ink,
    Highlight,
    #[serde(rename = "freetext")]
    FreeText,
}

/// Freehand stroke geometry
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeData {
    pub points: Vec<NormPoint>,
    pub color: Color,
    /// Stroke width as a fraction of page width
    pub width: f64,
    pub opacity: f64,
}

/// Text-selection highlight: one rectangle per merged line segment
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightRectsData {
    pub rects: Vec<NormRect>,
    /// Bounds of all rects, kept for consumers that read a single box
    pub union: NormRect,
    pub color: Color,
    pub opacity: f64,
}

impl HighlightRectsData {
    pub fn new(rects: Vec<NormRect>, color: Color, opacity: f64) -> Self {
        let union = rects
            .iter()
            .skip(1)
            .fold(rects.first().copied().unwrap_or_default(), |acc, r| acc.union(r));
        Self {
            rects,
            union,
            color,
            opacity,
        }
    }
}

/// Rich-text box; run font sizes are fractions of page height
#[derive(Debug, Clone, PartialEq)]
pub struct TextBoxData {
    pub rect: NormRect,
    pub runs: Vec<TextRun>,
}

impl TextBoxData {
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// Payload variants, one per drawable shape
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationData {
    Ink(StrokeData),
    HighlightStroke(StrokeData),
    HighlightRects(HighlightRectsData),
    TextBox(TextBoxData),
}

impl AnnotationData {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            AnnotationData::Ink(_) => AnnotationKind::Ink,
            AnnotationData::HighlightStroke(_) | AnnotationData::HighlightRects(_) => {
                AnnotationKind::Highlight
            }
            AnnotationData::TextBox(_) => AnnotationKind::FreeText,
        }
    }

    /// Shift all geometry by a page-fraction delta, clamping positions to `[0, max]`
    pub fn translate(&mut self, dx: f64, dy: f64, max: f64) {
        let shift = |p: &NormPoint| NormPoint::new(p.x + dx, p.y + dy).clamped(max);
        let shift_rect =
            |r: &NormRect| NormRect::new(r.x + dx, r.y + dy, r.width, r.height).clamped(max);
        match self {
            AnnotationData::Ink(stroke) | AnnotationData::HighlightStroke(stroke) => {
                stroke.points = stroke.points.iter().map(shift).collect();
            }
            AnnotationData::HighlightRects(data) => {
                data.rects = data.rects.iter().map(shift_rect).collect();
                *data = HighlightRectsData::new(data.rects.clone(), data.color, data.opacity);
            }
            AnnotationData::TextBox(text) => {
                text.rect = shift_rect(&text.rect);
            }
        }
    }

    /// Clamp every stored value into its valid fraction range
    pub fn clamp(&mut self, max: f64) {
        self.translate(0.0, 0.0, max);
        if let AnnotationData::Ink(stroke) | AnnotationData::HighlightStroke(stroke) = self {
            stroke.width = crate::geometry::clamp_norm(stroke.width, 1.0);
            stroke.opacity = stroke.opacity.clamp(0.0, 1.0);
        }
    }
}

/// One persisted annotation
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    /// 1-based page number
    pub page: u32,
    pub data: AnnotationData,
    /// Unix timestamp in seconds
    pub created_at: i64,
    /// Unix timestamp in seconds
    pub updated_at: i64,
    pub author_id: Option<String>,
}

impl Annotation {
    /// Create a new annotation with a generated id
    pub fn new(page: u32, data: AnnotationData) -> Self {
        let now = unix_now();
        Self {
            id: AnnotationId::new(),
            page,
            data,
            created_at: now,
            updated_at: now,
            author_id: None,
        }
    }

    pub fn kind(&self) -> AnnotationKind {
        self.data.kind()
    }

    /// Update the modified timestamp to now
    pub fn touch(&mut self) {
        self.updated_at = unix_now();
    }
}

/// Current Unix time in seconds
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke() -> StrokeData {
        StrokeData {
            points: vec![NormPoint::new(0.1, 0.1), NormPoint::new(0.5, 0.5)],
            color: Color::RED,
            width: 0.01,
            opacity: 1.0,
        }
    }

    #[test]
    fn test_color_hex_round_trip() {
        let color = Color::rgb(255, 128, 0);
        assert_eq!(color.to_hex(), "#ff8000");
        assert_eq!(Color::parse_hex("#ff8000"), Some(color));
        assert_eq!(Color::parse_hex("#f80"), Some(Color::rgb(255, 136, 0)));
        assert_eq!(
            Color::parse_hex("#ffff0080"),
            Some(Color::new(255, 255, 0, 128))
        );
        assert_eq!(Color::parse_hex("red"), None);
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(AnnotationData::Ink(stroke()).kind(), AnnotationKind::Ink);
        assert_eq!(
            AnnotationData::HighlightStroke(stroke()).kind(),
            AnnotationKind::Highlight
        );
    }

    #[test]
    fn test_translate_clamps_to_reachable_area() {
        let mut data = AnnotationData::Ink(stroke());
        data.translate(0.6, -0.2, 0.98);
        let AnnotationData::Ink(moved) = data else {
            panic!("kind changed");
        };
        assert!((moved.points[0].x - 0.7).abs() < 1e-9);
        assert_eq!(moved.points[0].y, 0.0);
        assert_eq!(moved.points[1].x, 0.98);
    }

    #[test]
    fn test_highlight_union_tracks_rects() {
        let data = HighlightRectsData::new(
            vec![
                NormRect::new(0.1, 0.1, 0.2, 0.02),
                NormRect::new(0.05, 0.15, 0.3, 0.02),
            ],
            Color::YELLOW,
            0.35,
        );
        assert!((data.union.x - 0.05).abs() < 1e-9);
        assert!((data.union.y - 0.1).abs() < 1e-9);
        assert!((data.union.width - 0.3).abs() < 1e-9);
        assert!((data.union.height - 0.07).abs() < 1e-9);
    }

    #[test]
    fn test_new_ids_are_unique() {
        let a = Annotation::new(1, AnnotationData::Ink(stroke()));
        let b = Annotation::new(1, AnnotationData::Ink(stroke()));
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
    }
}
