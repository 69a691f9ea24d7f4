//! Drawable scene derived from the annotation store
//!
//! The scene is an arena of drawable records in paint order, indexed by
//! annotation id, with a separate id → page index. It holds no state of its
//! own worth keeping: every layout change rebuilds it from normalized
//! geometry and the current page metrics.
//!
//! All geometry here is in document-space pixels; the render surface's camera
//! maps it into the visible window.

use crate::annotation::{Annotation, AnnotationData, AnnotationId, AnnotationKind, Color};
use crate::config::EngineConfig;
use crate::geometry::{Point, Rect};
use crate::layout::{PageLayout, PageMetrics};
use crate::rich_text::{scale_runs, TextStyle};
use crate::store::AnnotationStore;
use crate::text_layout::{layout_runs, TextMeasurer};
use std::collections::{BTreeSet, HashMap};

/// Visual primitive handed to the render surface
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Connected line segments with round joins
    Polyline {
        points: Vec<Point>,
        width: f64,
        color: Color,
        opacity: f64,
    },
    /// Rectangle, filled and/or stroked
    Rect {
        rect: Rect,
        fill: Option<Color>,
        stroke: Option<Color>,
        stroke_width: f64,
        opacity: f64,
        dashed: bool,
    },
    /// One styled text fragment; `origin` is the top-left of its line box
    Text {
        origin: Point,
        text: String,
        /// Pixel font size
        style: TextStyle,
    },
}

impl Primitive {
    fn translate(&mut self, dx: f64, dy: f64) {
        match self {
            Primitive::Polyline { points, .. } => {
                for p in points.iter_mut() {
                    *p = p.offset(dx, dy);
                }
            }
            Primitive::Rect { rect, .. } => *rect = rect.translate(dx, dy),
            Primitive::Text { origin, .. } => *origin = origin.offset(dx, dy),
        }
    }
}

/// Shape used for pointer hit tests
#[derive(Debug, Clone, PartialEq)]
pub enum HitShape {
    /// Any point within `reach` of the polyline hits
    Stroke { points: Vec<Point>, reach: f64 },
    Box(Rect),
}

impl HitShape {
    fn contains(&self, point: &Point) -> bool {
        match self {
            HitShape::Box(rect) => rect.contains(point),
            HitShape::Stroke { points, reach } => match points.as_slice() {
                [] => false,
                [only] => only.distance_to(point) <= *reach,
                _ => points
                    .windows(2)
                    .any(|seg| distance_to_segment(point, &seg[0], &seg[1]) <= *reach),
            },
        }
    }

    fn translate(&mut self, dx: f64, dy: f64) {
        match self {
            HitShape::Box(rect) => *rect = rect.translate(dx, dy),
            HitShape::Stroke { points, .. } => {
                for p in points.iter_mut() {
                    *p = p.offset(dx, dy);
                }
            }
        }
    }
}

fn distance_to_segment(p: &Point, a: &Point, b: &Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance_to(&Point::new(a.x + t * dx, a.y + t * dy))
}

/// Materialized annotation
#[derive(Debug, Clone, PartialEq)]
pub struct Drawable {
    pub id: AnnotationId,
    pub page: u32,
    pub kind: AnnotationKind,
    pub primitives: Vec<Primitive>,
    /// Visible bounds, used for marquee selection and the selection outline
    pub bounds: Rect,
    pub hit: HitShape,
}

impl Drawable {
    fn translate(&mut self, dx: f64, dy: f64) {
        for primitive in &mut self.primitives {
            primitive.translate(dx, dy);
        }
        self.bounds = self.bounds.translate(dx, dy);
        self.hit.translate(dx, dy);
    }
}

/// Build the drawable for one annotation at the given page metrics
///
/// Rectangle highlights return `None`: they are painted by the overlay.
pub fn build_drawable(
    annotation: &Annotation,
    metrics: &PageMetrics,
    config: &EngineConfig,
    measurer: &dyn TextMeasurer,
) -> Option<Drawable> {
    let size = metrics.size();
    let to_doc = |p: Point| metrics.to_document(p);

    match &annotation.data {
        AnnotationData::Ink(stroke) | AnnotationData::HighlightStroke(stroke) => {
            let points: Vec<Point> = stroke
                .points
                .iter()
                .map(|p| to_doc(p.to_pixels(size)))
                .collect();
            let width = stroke.width * size.width;
            let bounds = Rect::bounding(&points)?.inflate(width / 2.0);
            Some(Drawable {
                id: annotation.id.clone(),
                page: annotation.page,
                kind: annotation.kind(),
                primitives: vec![Primitive::Polyline {
                    points: points.clone(),
                    width,
                    color: stroke.color,
                    opacity: stroke.opacity,
                }],
                bounds,
                hit: HitShape::Stroke {
                    points,
                    reach: width / 2.0 + config.hit_slop,
                },
            })
        }
        AnnotationData::HighlightRects(_) => None,
        AnnotationData::TextBox(text) => {
            let rect = text.rect.to_pixels(size).translate(metrics.x, metrics.y);
            let padding = config.text_box.padding;
            let runs = scale_runs(&text.runs, size.height);
            let laid_out = layout_runs(
                &runs,
                (rect.width - padding * 2.0).max(0.0),
                config.text_box.line_height_multiplier,
                measurer,
            );

            let mut primitives = Vec::new();
            for line in &laid_out.lines {
                for fragment in &line.fragments {
                    primitives.push(Primitive::Text {
                        origin: Point::new(
                            rect.x + padding + fragment.x,
                            rect.y + padding + line.y,
                        ),
                        text: fragment.text.clone(),
                        style: fragment.style,
                    });
                }
            }
            Some(Drawable {
                id: annotation.id.clone(),
                page: annotation.page,
                kind: annotation.kind(),
                primitives,
                bounds: rect,
                hit: HitShape::Box(rect),
            })
        }
    }
}

#[derive(Debug, Default)]
pub struct Scene {
    arena: Vec<Drawable>,
    slots: HashMap<AnnotationId, usize>,
    pages: HashMap<AnnotationId, u32>,
    hidden: Option<AnnotationId>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild every drawable from the store at the current metrics
    ///
    /// Annotations on pages without metrics are skipped until layout knows them.
    pub fn sync(
        &mut self,
        store: &AnnotationStore,
        layout: &PageLayout,
        config: &EngineConfig,
        measurer: &dyn TextMeasurer,
    ) {
        self.arena.clear();
        self.slots.clear();
        self.pages.clear();

        for annotation in store.iter() {
            if self.hidden.as_ref() == Some(&annotation.id) {
                continue;
            }
            let Some(metrics) = layout.get(annotation.page) else {
                continue;
            };
            if let Some(drawable) = build_drawable(annotation, metrics, config, measurer) {
                self.slots.insert(drawable.id.clone(), self.arena.len());
                self.pages.insert(drawable.id.clone(), drawable.page);
                self.arena.push(drawable);
            }
        }
    }

    /// Exclude one annotation from future syncs (e.g. while its editor is open)
    pub fn set_hidden(&mut self, id: Option<AnnotationId>) {
        self.hidden = id;
    }

    pub fn get(&self, id: &AnnotationId) -> Option<&Drawable> {
        self.arena.get(*self.slots.get(id)?)
    }

    pub fn page_of(&self, id: &AnnotationId) -> Option<u32> {
        self.pages.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Drawable> {
        self.arena.iter()
    }

    /// Topmost drawable under a document point
    pub fn hit_test(&self, point: Point) -> Option<&Drawable> {
        self.arena.iter().rev().find(|d| d.hit.contains(&point))
    }

    /// Ids whose bounds intersect `rect`, in paint order
    pub fn intersecting(&self, rect: &Rect) -> Vec<AnnotationId> {
        self.arena
            .iter()
            .filter(|d| d.bounds.intersects(rect))
            .map(|d| d.id.clone())
            .collect()
    }

    /// Union of the bounds of the given drawables
    pub fn bounds_of<'a>(&self, ids: impl IntoIterator<Item = &'a AnnotationId>) -> Option<Rect> {
        ids.into_iter()
            .filter_map(|id| self.get(id))
            .map(|d| d.bounds)
            .reduce(|acc, r| acc.union(&r))
    }

    /// Move drawables by a pixel delta without touching the store
    pub fn translate(&mut self, ids: &BTreeSet<AnnotationId>, dx: f64, dy: f64) {
        for id in ids {
            if let Some(slot) = self.slots.get(id) {
                if let Some(drawable) = self.arena.get_mut(*slot) {
                    drawable.translate(dx, dy);
                }
            }
        }
    }

    /// Flattened primitives in paint order
    pub fn primitives(&self) -> Vec<Primitive> {
        self.arena
            .iter()
            .flat_map(|d| d.primitives.iter().cloned())
            .collect()
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.slots.clear();
        self.pages.clear();
        self.hidden = None;
    }
}
