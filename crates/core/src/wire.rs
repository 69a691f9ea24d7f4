//! Persisted annotation format
//!
//! Records cross the persistence boundary as [`StoredAnnotation`]: a typed
//! header plus an opaque JSON `data` payload. Two payload generations exist:
//!
//! - version 2 (written): tagged by `kind`, carries `"v": 2`, all geometry in
//!   page fractions
//! - version 1 (read only): raw pixel geometry measured against the page size
//!   at drawing time
//!
//! Version 1 payloads are migrated exactly once, when a document is loaded.

use crate::annotation::{
    Annotation, AnnotationData, AnnotationId, AnnotationKind, Color, HighlightRectsData,
    StrokeData, TextBoxData,
};
use crate::error::{GatewayError, GatewayResult};
use crate::geometry::{NormPoint, NormRect, Point, Rect, Size};
use crate::rich_text::{normalize_runs, TextRun, TextStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current envelope and payload version
pub const FORMAT_VERSION: u32 = 2;

fn default_page() -> u32 {
    1
}

/// One annotation as exchanged with a persistence gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnnotation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    #[serde(default = "default_page")]
    pub page: u32,
    pub data: serde_json::Value,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

/// Top-level persisted document for one (document, user) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default = "default_envelope_version")]
    pub version: u32,
    #[serde(default)]
    pub annotations: Vec<StoredAnnotation>,
}

fn default_envelope_version() -> u32 {
    1
}

impl Envelope {
    pub fn from_pages(pages: &BTreeMap<u32, Vec<StoredAnnotation>>) -> Self {
        Self {
            version: FORMAT_VERSION,
            annotations: pages.values().flatten().cloned().collect(),
        }
    }

    /// Group records by page, rejecting envelopes newer than this build understands
    pub fn into_pages(self) -> GatewayResult<BTreeMap<u32, Vec<StoredAnnotation>>> {
        if self.version > FORMAT_VERSION {
            return Err(GatewayError::UnsupportedVersion(self.version));
        }
        let mut pages: BTreeMap<u32, Vec<StoredAnnotation>> = BTreeMap::new();
        for record in self.annotations {
            pages.entry(record.page).or_default().push(record);
        }
        Ok(pages)
    }

    pub fn parse(json: &str) -> GatewayResult<BTreeMap<u32, Vec<StoredAnnotation>>> {
        let envelope: Envelope = serde_json::from_str(json)?;
        envelope.into_pages()
    }

    pub fn to_json(pages: &BTreeMap<u32, Vec<StoredAnnotation>>) -> GatewayResult<String> {
        Ok(serde_json::to_string_pretty(&Self::from_pages(pages))?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum Shape {
    #[serde(rename_all = "camelCase")]
    Ink {
        points_norm: Vec<NormPoint>,
        color: Color,
        width_norm: f64,
        opacity: f64,
    },
    #[serde(rename_all = "camelCase")]
    HighlightStroke {
        points_norm: Vec<NormPoint>,
        color: Color,
        width_norm: f64,
        opacity: f64,
    },
    #[serde(rename_all = "camelCase")]
    HighlightRect {
        rects_norm: Vec<NormRect>,
        /// Union of `rects_norm`, for readers that expect one box
        rect_norm: NormRect,
        color: Color,
        opacity: f64,
    },
    #[serde(rename_all = "camelCase")]
    Textbox {
        x_norm: f64,
        y_norm: f64,
        width_norm: f64,
        height_norm: f64,
        runs: Vec<TextRun>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PayloadV2 {
    v: u32,
    #[serde(flatten)]
    shape: Shape,
}

/// Pixel-absolute payload written by the first format generation
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LegacyPayload {
    points: Vec<Point>,
    x: Option<f64>,
    y: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
    color: Option<String>,
    stroke_width: Option<f64>,
    opacity: Option<f64>,
    text: Option<String>,
    font_size: Option<f64>,
    /// Page size the pixels were measured against, when the writer recorded it
    page_width: Option<f64>,
    page_height: Option<f64>,
}

impl LegacyPayload {
    fn rect(&self) -> Option<Rect> {
        Some(Rect::new(self.x?, self.y?, self.width?, self.height?))
    }

    fn page_size(&self) -> Option<Size> {
        let size = Size::new(self.page_width?, self.page_height?);
        size.is_usable().then_some(size)
    }

    fn color_or(&self, fallback: Color) -> Color {
        self.color
            .as_deref()
            .and_then(Color::parse_hex)
            .unwrap_or(fallback)
    }
}

/// Defaults filled into legacy records that omit a field
#[derive(Debug, Clone, Copy)]
pub struct LegacyDefaults {
    pub ink_color: Color,
    pub ink_width_px: f64,
    pub highlight_color: Color,
    pub highlight_opacity: f64,
    pub text_color: Color,
    pub font_size_px: f64,
}

/// Why a stored record could not become an [`Annotation`]
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("no page size available to migrate legacy record on page {0}")]
    MissingPageSize(u32),
    #[error("record has no geometry")]
    EmptyGeometry,
    #[error("payload version {0} is not supported")]
    UnsupportedVersion(u64),
}

/// Convert an in-memory annotation to its stored form, clamping geometry on write
pub fn to_stored(
    annotation: &Annotation,
    clamp_max: f64,
) -> Result<StoredAnnotation, serde_json::Error> {
    let mut data = annotation.data.clone();
    data.clamp(clamp_max);

    let shape = match data {
        AnnotationData::Ink(s) => Shape::Ink {
            points_norm: s.points,
            color: s.color,
            width_norm: s.width,
            opacity: s.opacity,
        },
        AnnotationData::HighlightStroke(s) => Shape::HighlightStroke {
            points_norm: s.points,
            color: s.color,
            width_norm: s.width,
            opacity: s.opacity,
        },
        AnnotationData::HighlightRects(h) => Shape::HighlightRect {
            rects_norm: h.rects,
            rect_norm: h.union,
            color: h.color,
            opacity: h.opacity.clamp(0.0, 1.0),
        },
        AnnotationData::TextBox(t) => Shape::Textbox {
            x_norm: t.rect.x,
            y_norm: t.rect.y,
            width_norm: t.rect.width,
            height_norm: t.rect.height,
            runs: t.runs,
        },
    };

    Ok(StoredAnnotation {
        id: annotation.id.to_string(),
        kind: annotation.kind(),
        page: annotation.page,
        data: serde_json::to_value(PayloadV2 {
            v: FORMAT_VERSION,
            shape,
        })?,
        created_at: annotation.created_at,
        updated_at: Some(annotation.updated_at),
        author_id: annotation.author_id.clone(),
    })
}

/// Decode a stored record, migrating legacy pixel payloads
///
/// `page_size` supplies the current viewport of a page for legacy records
/// that did not record the size they were drawn against.
pub fn from_stored(
    stored: &StoredAnnotation,
    page_size: &dyn Fn(u32) -> Option<Size>,
    defaults: &LegacyDefaults,
) -> Result<Annotation, DecodeError> {
    let page = stored.page.max(1);
    let version = stored.data.get("v").and_then(|v| v.as_u64()).unwrap_or(1);

    let data = match version {
        2 => {
            let payload: PayloadV2 = serde_json::from_value(stored.data.clone())?;
            from_shape(payload.shape)?
        }
        1 => {
            let legacy: LegacyPayload = serde_json::from_value(stored.data.clone())?;
            let size = legacy
                .page_size()
                .or_else(|| page_size(page).filter(Size::is_usable))
                .ok_or(DecodeError::MissingPageSize(page))?;
            migrate_legacy(stored.kind, &legacy, size, defaults)?
        }
        other => return Err(DecodeError::UnsupportedVersion(other)),
    };

    if data.kind() != stored.kind {
        log::debug!(
            "record {} filed as {:?} but payload is {:?}; payload wins",
            stored.id,
            stored.kind,
            data.kind()
        );
    }

    Ok(Annotation {
        id: AnnotationId::from(stored.id.as_str()),
        page,
        data,
        created_at: stored.created_at,
        updated_at: stored.updated_at.unwrap_or(stored.created_at),
        author_id: stored.author_id.clone(),
    })
}

fn from_shape(shape: Shape) -> Result<AnnotationData, DecodeError> {
    let data = match shape {
        Shape::Ink {
            points_norm,
            color,
            width_norm,
            opacity,
        } => AnnotationData::Ink(StrokeData {
            points: points_norm,
            color,
            width: width_norm,
            opacity,
        }),
        Shape::HighlightStroke {
            points_norm,
            color,
            width_norm,
            opacity,
        } => AnnotationData::HighlightStroke(StrokeData {
            points: points_norm,
            color,
            width: width_norm,
            opacity,
        }),
        Shape::HighlightRect {
            rects_norm,
            rect_norm,
            color,
            opacity,
        } => {
            // Older writers stored only the union box
            let rects = if rects_norm.is_empty() {
                vec![rect_norm]
            } else {
                rects_norm
            };
            AnnotationData::HighlightRects(HighlightRectsData::new(rects, color, opacity))
        }
        Shape::Textbox {
            x_norm,
            y_norm,
            width_norm,
            height_norm,
            runs,
        } => AnnotationData::TextBox(TextBoxData {
            rect: NormRect::new(x_norm, y_norm, width_norm, height_norm),
            runs: normalize_runs(runs),
        }),
    };

    let empty = match &data {
        AnnotationData::Ink(s) | AnnotationData::HighlightStroke(s) => s.points.is_empty(),
        AnnotationData::HighlightRects(h) => h.rects.is_empty(),
        AnnotationData::TextBox(_) => false,
    };
    if empty {
        return Err(DecodeError::EmptyGeometry);
    }
    Ok(data)
}

fn migrate_legacy(
    kind: AnnotationKind,
    legacy: &LegacyPayload,
    page: Size,
    defaults: &LegacyDefaults,
) -> Result<AnnotationData, DecodeError> {
    let norm_points = || -> Vec<NormPoint> {
        legacy
            .points
            .iter()
            .map(|p| NormPoint::from_pixels(*p, page))
            .collect()
    };

    match kind {
        AnnotationKind::Ink => {
            if legacy.points.is_empty() {
                return Err(DecodeError::EmptyGeometry);
            }
            Ok(AnnotationData::Ink(StrokeData {
                points: norm_points(),
                color: legacy.color_or(defaults.ink_color),
                width: legacy.stroke_width.unwrap_or(defaults.ink_width_px) / page.width,
                opacity: legacy.opacity.unwrap_or(1.0),
            }))
        }
        AnnotationKind::Highlight => {
            let color = legacy.color_or(defaults.highlight_color);
            let opacity = legacy.opacity.unwrap_or(defaults.highlight_opacity);
            if !legacy.points.is_empty() {
                return Ok(AnnotationData::HighlightStroke(StrokeData {
                    points: norm_points(),
                    color,
                    width: legacy.stroke_width.unwrap_or(defaults.ink_width_px) / page.width,
                    opacity,
                }));
            }
            let rect = legacy.rect().ok_or(DecodeError::EmptyGeometry)?;
            Ok(AnnotationData::HighlightRects(HighlightRectsData::new(
                vec![NormRect::from_pixels(rect, page)],
                color,
                opacity,
            )))
        }
        AnnotationKind::FreeText => {
            let rect = legacy.rect().ok_or(DecodeError::EmptyGeometry)?;
            let font_px = legacy.font_size.unwrap_or(defaults.font_size_px);
            let style = TextStyle::new(legacy.color_or(defaults.text_color), font_px / page.height);
            let text = legacy.text.clone().unwrap_or_default();
            Ok(AnnotationData::TextBox(TextBoxData {
                rect: NormRect::from_pixels(rect, page),
                runs: normalize_runs(vec![TextRun::new(text, style)]),
            }))
        }
    }
}
